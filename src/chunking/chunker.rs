// Splits file content into line-ranged chunks at semantic boundaries.
// Markdown is cut at ATX headings, code at function/class boundaries with a
// fixed-size tiling fallback. Emitted chunks always tile the file: no gaps,
// no overlap, 1-indexed inclusive line numbers.

use once_cell::sync::Lazy;
use regex::Regex;

use super::languages::boundary_regex;

/// Default lower bound for merging small code chunks.
pub const MIN_CHUNK_LINES: usize = 200;
/// Default upper bound; larger intervals get sub-split.
pub const MAX_CHUNK_LINES: usize = 400;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());

/// A contiguous slice of a file, carrying its own text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-indexed, inclusive.
    pub start_line: u32,
    /// 1-indexed, inclusive, `start_line <= end_line`.
    pub end_line: u32,
    pub text: String,
}

impl Chunk {
    fn from_lines(lines: &[&str], start: usize, end: usize) -> Self {
        Self {
            start_line: (start + 1) as u32,
            end_line: end as u32,
            text: lines[start..end].join("\n"),
        }
    }
}

/// Chunk `content` according to the extension of `path`, with the default
/// size bounds.
pub fn chunk_file(content: &str, path: &str) -> Vec<Chunk> {
    chunk_file_with(content, path, MIN_CHUNK_LINES, MAX_CHUNK_LINES)
}

/// Chunk `content` with explicit bounds. Markdown goes through the heading
/// splitter, everything else through the code chunker.
pub fn chunk_file_with(
    content: &str,
    path: &str,
    min_lines: usize,
    max_lines: usize,
) -> Vec<Chunk> {
    let ext = extension_of(path);
    if ext == ".md" || ext == ".mdx" {
        chunk_markdown(content)
    } else {
        chunk_code(content, &ext, min_lines, max_lines)
    }
}

/// Lowercased extension of the basename including the dot, or an empty
/// string when there is none. A leading dot alone (".bashrc") does not count
/// as an extension.
fn extension_of(path: &str) -> String {
    let basename = path.rsplit('/').next().unwrap_or(path);
    match basename.rfind('.') {
        Some(idx) if idx > 0 => basename[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Split markdown at ATX heading lines. Every heading starts a new chunk;
/// content before the first heading is its own chunk; whitespace-only chunks
/// are dropped.
pub fn chunk_markdown(content: &str) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let lines = content.split('\n').collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut current_start = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if i > 0 && HEADING.is_match(line) {
            push_non_blank(&mut chunks, &lines, current_start, i);
            current_start = i;
        }
    }
    push_non_blank(&mut chunks, &lines, current_start, lines.len());

    chunks
}

fn push_non_blank(chunks: &mut Vec<Chunk>, lines: &[&str], start: usize, end: usize) {
    let chunk = Chunk::from_lines(lines, start, end);
    if !chunk.text.trim().is_empty() {
        chunks.push(chunk);
    }
}

/// Split code at per-language boundaries, merging intervals below
/// `min_lines` and sub-splitting intervals above `max_lines`. Files that fit
/// within `max_lines` come back whole; unknown languages and boundary-free
/// files fall back to a fixed tiling.
pub fn chunk_code(content: &str, ext: &str, min_lines: usize, max_lines: usize) -> Vec<Chunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let lines = content.split('\n').collect::<Vec<_>>();
    let total = lines.len();

    if total <= max_lines {
        return vec![Chunk {
            start_line: 1,
            end_line: total as u32,
            text: content.to_owned(),
        }];
    }

    let boundaries = match boundary_regex(ext) {
        Some(re) => lines
            .iter()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(i, _)| i)
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };

    if boundaries.is_empty() {
        return tile(&lines, max_lines);
    }

    let intervals = split_at_boundaries(&boundaries, total);
    merge_and_split(&intervals, min_lines, max_lines)
        .into_iter()
        .map(|(start, end)| Chunk::from_lines(&lines, start, end))
        .collect()
}

/// Fixed-size tiling of `max_lines` per chunk; the final chunk holds the
/// remainder.
fn tile(lines: &[&str], max_lines: usize) -> Vec<Chunk> {
    let total = lines.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total {
        let end = (start + max_lines).min(total);
        chunks.push(Chunk::from_lines(lines, start, end));
        start = end;
    }
    chunks
}

/// Turn sorted 0-indexed boundary line numbers into half-open `[start, end)`
/// intervals covering the whole file. Content before the first boundary is
/// its own interval.
fn split_at_boundaries(boundaries: &[usize], total_lines: usize) -> Vec<(usize, usize)> {
    let mut intervals = Vec::with_capacity(boundaries.len() + 1);
    if boundaries[0] > 0 {
        intervals.push((0, boundaries[0]));
    }
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(total_lines);
        intervals.push((start, end));
    }
    intervals
}

/// Pass one merges runs of intervals until they reach `min_lines` (the final
/// interval may stay short). Pass two cuts anything above `max_lines` into
/// `max_lines`-sized pieces.
fn merge_and_split(
    intervals: &[(usize, usize)],
    min_lines: usize,
    max_lines: usize,
) -> Vec<(usize, usize)> {
    let mut merged = Vec::new();
    let mut i = 0usize;
    while i < intervals.len() {
        let (start, mut end) = intervals[i];
        while end - start < min_lines && i + 1 < intervals.len() {
            i += 1;
            end = intervals[i].1;
        }
        merged.push((start, end));
        i += 1;
    }

    let mut result = Vec::new();
    for (start, end) in merged {
        if end - start <= max_lines {
            result.push((start, end));
        } else {
            let mut sub = start;
            while sub < end {
                result.push((sub, (sub + max_lines).min(end)));
                sub += max_lines;
            }
        }
    }
    result
}
