pub mod agent;
pub mod application;
pub mod chunking;
pub mod db;
pub mod github;
pub mod indexer;
pub mod ingestion;
pub mod llm;
pub mod queue;
pub mod repo;
pub mod retrieval;
pub mod webserver;
