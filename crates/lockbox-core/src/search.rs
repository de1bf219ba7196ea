//! Owner-scoped in-memory search index
//!
//! Holds decrypted titles/subtitles/keywords while the vault is unlocked.
//! Never persisted. Torn down entirely - not flagged - on lock or owner
//! switch. Matching is tiered (prefix, substring, subsequence) with
//! weighted fields.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::RecordKind;

/// One searchable entry, derived from a decrypted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexRecord {
    pub owner_id: Uuid,
    pub kind: RecordKind,
    pub ref_id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub keywords: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Field weights: title beats subtitle beats keywords
const TITLE_WEIGHT: u32 = 3;
const SUBTITLE_WEIGHT: u32 = 2;
const KEYWORD_WEIGHT: u32 = 1;

/// Match tiers within one field
const PREFIX_SCORE: u32 = 3;
const SUBSTRING_SCORE: u32 = 2;
const SUBSEQUENCE_SCORE: u32 = 1;

/// In-memory search index scoped to one owner
#[derive(Debug, Default)]
pub struct SearchIndex {
    owner: Option<Uuid>,
    entries: Vec<SearchIndexRecord>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the cached scope. The previous owner's entries are discarded
    /// synchronously, before any result can be served from the new set.
    pub fn set_owner(&mut self, owner_id: Uuid, entries: Vec<SearchIndexRecord>) {
        self.entries.clear();
        self.owner = Some(owner_id);
        self.entries = entries
            .into_iter()
            .filter(|e| e.owner_id == owner_id)
            .collect();
        debug!(owner = %owner_id, entries = self.entries.len(), "search index rebuilt");
    }

    /// Replace the current owner's entries (debounced rebuild target)
    pub fn apply(&mut self, owner_id: Uuid, entries: Vec<SearchIndexRecord>) {
        if self.owner == Some(owner_id) {
            self.set_owner(owner_id, entries);
        }
    }

    /// Tear the index down entirely. Wired to every lock transition.
    pub fn purge(&mut self) {
        self.owner = None;
        self.entries.clear();
        debug!("search index purged");
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fuzzy search over title/subtitle/keywords.
    ///
    /// An empty query returns the `limit` most-recently-updated entries
    /// instead of nothing.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchIndexRecord> {
        let query = query.trim().to_lowercase();

        if query.is_empty() {
            let mut recent: Vec<&SearchIndexRecord> = self.entries.iter().collect();
            recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            return recent.into_iter().take(limit).cloned().collect();
        }

        let mut scored: Vec<(u32, &SearchIndexRecord)> = self
            .entries
            .iter()
            .filter_map(|entry| score_entry(entry, &query).map(|score| (score, entry)))
            .collect();

        scored.sort_by(|(score_a, entry_a), (score_b, entry_b)| {
            score_b
                .cmp(score_a)
                .then_with(|| entry_b.updated_at.cmp(&entry_a.updated_at))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

fn score_entry(entry: &SearchIndexRecord, query: &str) -> Option<u32> {
    let mut total = 0;

    if let Some(score) = field_score(&entry.title, query) {
        total += score * TITLE_WEIGHT;
    }
    if let Some(subtitle) = &entry.subtitle {
        if let Some(score) = field_score(subtitle, query) {
            total += score * SUBTITLE_WEIGHT;
        }
    }
    let keyword_best = entry
        .keywords
        .iter()
        .filter_map(|k| field_score(k, query))
        .max();
    if let Some(score) = keyword_best {
        total += score * KEYWORD_WEIGHT;
    }

    (total > 0).then_some(total)
}

/// Tiered field match: prefix > substring > in-order subsequence
fn field_score(field: &str, query: &str) -> Option<u32> {
    let field = field.to_lowercase();
    if field.starts_with(query) {
        Some(PREFIX_SCORE)
    } else if field.contains(query) {
        Some(SUBSTRING_SCORE)
    } else if is_subsequence(&field, query) {
        Some(SUBSEQUENCE_SCORE)
    } else {
        None
    }
}

fn is_subsequence(haystack: &str, needle: &str) -> bool {
    let mut chars = haystack.chars();
    needle
        .chars()
        .all(|needed| chars.by_ref().any(|c| c == needed))
}
