use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest word (in characters) accepted as an item key.
pub const MAX_KEY_CHARS: usize = 100;

/// One immutable generation result.
///
/// Entries are only ever appended to an [`Item`]; a retry produces a new entry
/// instead of replacing an old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub explanation: String,
    pub synonyms: Vec<String>,
}

impl GenerationEntry {
    pub fn new(explanation: impl Into<String>, synonyms: Vec<String>) -> Self {
        Self {
            explanation: explanation.into(),
            synonyms,
        }
    }
}

/// A word and the generation results accumulated for it.
///
/// An item with zero entries is *pending*: it was created but no dispatcher
/// pass has produced content for it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    #[serde(default)]
    pub entries: Vec<GenerationEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    /// A fresh pending item created now.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.entries.is_empty()
    }

    /// The word this item explains. Keys are the words themselves.
    pub fn word(&self) -> &str {
        &self.key
    }

    /// Appends `entry` and bumps `updated_at`.
    pub fn append(&mut self, entry: GenerationEntry) {
        self.entries.push(entry);
        self.updated_at = Some(Utc::now());
    }
}

/// A queued request to generate (or regenerate) content for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub key: String,
    /// Retry tasks generate even when the item already has entries.
    pub retry: bool,
}

impl Task {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            retry: false,
        }
    }

    pub fn retry(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            retry: true,
        }
    }
}

/// Trims `raw` and validates it as an item key.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] when the trimmed word is empty or longer than
/// [`MAX_KEY_CHARS`].
pub fn normalize_key(raw: &str) -> Result<String> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(Error::InvalidKey {
            reason: "word must not be empty".to_string(),
        });
    }
    let chars = key.chars().count();
    if chars > MAX_KEY_CHARS {
        return Err(Error::InvalidKey {
            reason: format!("word is {chars} characters, maximum is {MAX_KEY_CHARS}"),
        });
    }
    Ok(key.to_string())
}
