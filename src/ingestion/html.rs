// Visible-text extraction for URL ingestion. Text nodes are collected in
// document order; anything under script/style/noscript is skipped, and
// whitespace-only nodes are dropped.

use select::document::Document;
use select::predicate::Text;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

pub fn extract_text(html: &str) -> String {
    let document = Document::from(html);
    let mut pieces = Vec::new();

    for node in document.find(Text) {
        let mut ancestor = node.parent();
        let mut skip = false;
        while let Some(parent) = ancestor {
            if matches!(parent.name(), Some(tag) if SKIPPED_TAGS.contains(&tag)) {
                skip = true;
                break;
            }
            ancestor = parent.parent();
        }
        if skip {
            continue;
        }
        if let Some(text) = node.as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_owned());
            }
        }
    }

    pieces.join("\n")
}
