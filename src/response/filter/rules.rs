use crate::event::Id;
use crate::request::FilterRow;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Warn,
    Hide,
}

impl From<i32> for FilterAction {
    fn from(action: i32) -> Self {
        match action {
            1 => FilterAction::Hide,
            _ => FilterAction::Warn,
        }
    }
}

/// The filter metadata sent to clients alongside each match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterMeta {
    pub id: Id,
    pub title: String,
    pub context: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub filter_action: FilterAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterResult {
    pub filter: FilterMeta,
    pub keyword_matches: Vec<String>,
    pub status_matches: Option<Vec<String>>,
}

/// One user-defined filter with all of its keywords compiled into a single pattern
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub filter: FilterMeta,
    pattern: Regex,
}

impl FilterRule {
    /// Group keyword rows by filter.  Filters whose keywords cannot be compiled are skipped.
    pub fn from_rows(rows: Vec<FilterRow>) -> Vec<Self> {
        let mut grouped: Vec<(FilterMeta, Vec<(String, bool)>)> = Vec::new();
        for row in rows {
            let keyword = (row.keyword, row.whole_word);
            match grouped.iter_mut().find(|(meta, _)| meta.id == row.filter_id) {
                Some((_, keywords)) => keywords.push(keyword),
                None => grouped.push((
                    FilterMeta {
                        id: row.filter_id,
                        title: row.title,
                        context: row.context,
                        expires_at: row.expires_at,
                        filter_action: FilterAction::from(row.action),
                    },
                    vec![keyword],
                )),
            }
        }

        grouped
            .into_iter()
            .filter_map(|(filter, keywords)| match compile(&keywords) {
                Some(Ok(pattern)) => Some(Self { filter, pattern }),
                Some(Err(e)) => {
                    log::warn!("Skipping filter {}: {}", filter.id, e);
                    None
                }
                None => None,
            })
            .collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.filter.expires_at.map_or(false, |expiry| expiry <= now)
    }

    /// Every distinct keyword occurrence in `text`, in the order they appear
    pub fn matches(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(text) {
            if !found.iter().any(|f| f == m.as_str()) {
                found.push(m.as_str().to_string());
            }
        }
        found
    }
}

/// Test `text` against every unexpired rule.  Results are ordered by filter id.
pub fn apply(rules: &[FilterRule], text: &str, now: DateTime<Utc>) -> Vec<FilterResult> {
    let mut results: Vec<FilterResult> = rules
        .iter()
        .filter(|rule| !rule.is_expired(now))
        .filter_map(|rule| {
            let keyword_matches = rule.matches(text);
            match keyword_matches.is_empty() {
                true => None,
                false => Some(FilterResult {
                    filter: rule.filter.clone(),
                    keyword_matches,
                    status_matches: None,
                }),
            }
        })
        .collect();
    results.sort_by_key(|result| result.filter.id);
    results
}

fn compile(keywords: &[(String, bool)]) -> Option<Result<Regex, regex::Error>> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let alternatives: Vec<String> = keywords
        .iter()
        .filter(|(keyword, _)| !keyword.is_empty())
        .map(|(keyword, whole_word)| {
            let escaped = regex::escape(keyword);
            match whole_word {
                false => escaped,
                true => {
                    let start = if keyword.starts_with(is_word) { r"\b" } else { "" };
                    let end = if keyword.ends_with(is_word) { r"\b" } else { "" };
                    [start, &escaped, end].concat()
                }
            }
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let pattern = format!("(?:{})", alternatives.join("|"));
    Some(RegexBuilder::new(&pattern).case_insensitive(true).build())
}
