//! Note analysis.
//!
//! Builds per-note records from normalized content and aggregates them into a
//! report: volume, time range, monthly distribution and tag usage. Also hosts
//! the client-side search filters and the tag-list insights.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{normalize, parse_timestamp, rank_counts, CountEntry, FileDescriptor, Note, TagInfo};

/// Number of tags kept in [`AnalysisReport::top_tags`].
pub const TOP_TAGS: usize = 20;

/// Separators that mark a hierarchical tag name.
pub static TAG_SEPARATORS: [char; 8] = ['/', '\\', '-', '_', '.', '|', ':', '>'];

/// A note together with its normalized content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub slug: String,
    pub created_at: String,
    pub updated_at: String,
    pub creator_id: Option<i64>,
    pub source: Option<String>,
    pub pin: bool,
    pub linked_count: u64,
    pub original_html: String,
    pub plain_text: String,
    pub markdown: String,
    pub word_count: usize,
    pub tags: Vec<String>,
    pub files: Vec<FileDescriptor>,
    pub has_files: bool,
    /// Link to the note in the web app
    pub url: String,
}

impl NoteRecord {
    /// Normalizes `note`; `web_url` is the link prefix the slug is appended to.
    pub fn from_note(note: &Note, web_url: &str) -> Self {
        let normalized = normalize(&note.content);
        Self {
            slug: note.slug.clone(),
            created_at: note.created_at.clone(),
            updated_at: note.updated_at.clone(),
            creator_id: note.creator_id,
            source: note.source.clone(),
            pin: note.pin,
            linked_count: note.linked_count,
            original_html: note.content.clone(),
            plain_text: normalized.plain_text,
            markdown: normalized.markdown,
            word_count: normalized.word_count,
            tags: normalized.tags,
            files: note.files.clone(),
            has_files: !note.files.is_empty(),
            url: format!("{}{}", web_url, note.slug),
        }
    }
}

/// Earliest and latest `created_at` among analyzed notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: String,
    pub latest: String,
}

/// Aggregate statistics plus every analyzed note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub total_notes: usize,
    /// Sum of `word_count` (characters) across notes
    pub total_words: usize,
    /// Rounded to two decimals
    pub avg_words_per_note: f64,
    pub date_range: Option<DateRange>,
    /// `YYYY-MM` buckets of `created_at`, most common first
    pub monthly_distribution: Vec<CountEntry>,
    pub top_tags: Vec<CountEntry>,
    pub notes: Vec<NoteRecord>,
}

/// Normalizes and aggregates `notes`.
pub fn analyze_notes(notes: &[Note], web_url: &str) -> AnalysisReport {
    let records: Vec<NoteRecord> = notes
        .iter()
        .map(|note| NoteRecord::from_note(note, web_url))
        .collect();
    summarize(records)
}

/// Aggregates already normalized records.
pub fn summarize(records: Vec<NoteRecord>) -> AnalysisReport {
    let total_notes = records.len();
    let total_words: usize = records.iter().map(|r| r.word_count).sum();
    let avg_words_per_note = if total_notes > 0 {
        (total_words as f64 / total_notes as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let dates: Vec<&str> = records
        .iter()
        .map(|r| r.created_at.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    let date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(earliest), Some(latest)) => Some(DateRange {
            earliest: earliest.to_string(),
            latest: latest.to_string(),
        }),
        _ => None,
    };

    let monthly_distribution = rank_counts(
        dates.iter().map(|d| d.chars().take(7).collect::<String>()),
        None,
    );
    let top_tags = rank_counts(
        records.iter().flat_map(|r| r.tags.iter().cloned()),
        Some(TOP_TAGS),
    );

    info!(
        "Analyzed {} notes ({} characters)",
        total_notes, total_words
    );

    AnalysisReport {
        total_notes,
        total_words,
        avg_words_per_note,
        date_range,
        monthly_distribution,
        top_tags,
        notes: records,
    }
}

/// Client-side filters applied on top of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Every one of these tags must be present
    pub include_tags: Vec<String>,
    /// None of these tags may be present
    pub exclude_tags: Vec<String>,
    /// `Some(true)` keeps notes with files, `Some(false)` notes without
    pub has_files: Option<bool>,
    pub date_from: Option<DateTime<FixedOffset>>,
    pub date_to: Option<DateTime<FixedOffset>>,
}

impl SearchFilter {
    /// Whether `record` passes. With a date bound set, records whose
    /// `created_at` does not parse are rejected.
    pub fn matches(&self, record: &NoteRecord, offset: FixedOffset) -> bool {
        if !self
            .include_tags
            .iter()
            .all(|tag| record.tags.contains(tag))
        {
            return false;
        }

        if self.exclude_tags.iter().any(|tag| record.tags.contains(tag)) {
            return false;
        }

        if let Some(has_files) = self.has_files {
            if has_files != record.has_files {
                return false;
            }
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let created = match parse_timestamp(&record.created_at, offset) {
                Ok(created) => created,
                Err(_) => return false,
            };
            if self.date_from.is_some_and(|from| created < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| created > to) {
                return false;
            }
        }

        true
    }

    /// Keeps the records that match.
    pub fn apply(&self, records: Vec<NoteRecord>, offset: FixedOffset) -> Vec<NoteRecord> {
        let before = records.len();
        let kept: Vec<NoteRecord> = records
            .into_iter()
            .filter(|r| self.matches(r, offset))
            .collect();
        debug!("Filter kept {} of {} records", kept.len(), before);
        kept
    }
}

/// A tag name that splits into levels on a separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagHierarchy {
    pub tag: String,
    pub separator: char,
    pub levels: Vec<String>,
    pub depth: usize,
}

/// Every (tag, separator) pair where the separator occurs in the tag name.
pub fn tag_hierarchy(tags: &[TagInfo]) -> Vec<TagHierarchy> {
    tags.iter()
        .flat_map(|tag| {
            TAG_SEPARATORS
                .iter()
                .filter(move |sep| tag.name.contains(**sep))
                .map(move |&separator| {
                    let levels: Vec<String> =
                        tag.name.split(separator).map(str::to_string).collect();
                    TagHierarchy {
                        tag: tag.name.clone(),
                        separator,
                        depth: levels.len(),
                        levels,
                    }
                })
        })
        .collect()
}

/// Tags used on notes that the tag list does not know about, sorted.
pub fn missing_tags(notes: &[Note], known: &[TagInfo]) -> Vec<String> {
    let known: HashSet<&str> = known.iter().map(|t| t.name.as_str()).collect();
    let mut missing: Vec<String> = notes
        .iter()
        .flat_map(|note| note.tags.iter())
        .filter(|tag| !known.contains(tag.as_str()))
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    missing.sort();
    missing
}
