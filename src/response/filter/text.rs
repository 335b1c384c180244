use crate::event::Status;

use regex::Regex;
use std::sync::OnceLock;

fn line_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("hardcoded"))
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").expect("hardcoded"))
}

fn tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("hardcoded"))
}

/// The plain text keyword filters are matched against: spoiler text, content, poll options
/// and media descriptions, separated by blank lines
pub fn searchable_text(status: &Status) -> String {
    html_to_text(&status.searchable_content())
}

pub fn html_to_text(html: &str) -> String {
    let text = line_break().replace_all(html, "\n");
    let text = paragraph_break().replace_all(&text, "\n\n");
    let text = tag().replace_all(&text, "");
    html_escape::decode_html_entities(&text).into_owned()
}
