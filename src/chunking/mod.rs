pub mod chunker;
pub mod languages;

pub use chunker::{chunk_file, chunk_file_with, Chunk};
