use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A value and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

/// Counts occurrences, most common first.
///
/// Ties keep the order in which values first appeared. `limit` keeps only the
/// top entries.
pub fn rank_counts<I, S>(values: I, limit: Option<usize>) -> Vec<CountEntry>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
    for value in values {
        let next_index = seen.len();
        seen.entry(value.into()).or_insert((0, next_index)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = seen
        .into_iter()
        .map(|(key, (count, first))| (key, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(key, count, _)| CountEntry { key, count })
        .collect()
}

/// The first `max_chars` characters of `content`.
pub fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Preview for terminal output: first non-empty line, ellipsized past `max_chars`.
pub fn line_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        format!("{}...", preview(first_line, max_chars))
    }
}

// Helper method for parsing comma-separated CLI lists
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().trim_start_matches('#').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
