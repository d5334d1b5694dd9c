use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_URL: &str = "url";
pub const FIELD_ORIGINAL_URL: &str = "original_url";

/// One item flowing through a task: a title, a url, and whatever fields
/// plugins attach along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry {
    fields: BTreeMap<String, Value>,
}

impl Entry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let mut entry = Self::default();
        entry.set_title(title);
        entry.set_url(url);
        entry
    }

    /// An entry without a url. Still valid; see [`Entry::is_valid`].
    pub fn with_title(title: impl Into<String>) -> Self {
        let mut entry = Self::default();
        entry.set_title(title);
        entry
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(FIELD_TITLE)
    }

    pub fn url(&self) -> Option<&str> {
        self.get_str(FIELD_URL)
    }

    /// The url as it was first assigned, before any resolver rewrote it.
    pub fn original_url(&self) -> Option<&str> {
        self.get_str(FIELD_ORIGINAL_URL)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.fields
            .insert(FIELD_TITLE.to_string(), Value::String(title.into()));
    }

    /// Assign the url. The first assignment is snapshotted into
    /// `original_url` so it survives later rewrites; subsequent assignments
    /// leave the snapshot untouched.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.fields.contains_key(FIELD_ORIGINAL_URL) {
            self.fields
                .insert(FIELD_ORIGINAL_URL.to_string(), Value::String(url.clone()));
        }
        self.fields.insert(FIELD_URL.to_string(), Value::String(url));
    }

    /// Set an arbitrary field. Assignments to `url` go through
    /// [`Entry::set_url`] so the snapshot invariant holds no matter how a
    /// plugin writes the field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if key == FIELD_URL {
            if let Value::String(url) = value {
                self.set_url(url);
                return;
            }
        }
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// An entry is valid when it carries a non-empty title. A missing url
    /// does NOT invalidate an entry: url-less entries are accepted on
    /// purpose (some inputs only learn the url during resolution).
    pub fn is_valid(&self) -> bool {
        self.title().map(|t| !t.is_empty()).unwrap_or(false)
    }

    /// Stable `"title | url"` rendering for logs, tolerant of odd entries.
    pub fn describe(&self) -> String {
        format!(
            "{} | {}",
            self.title().unwrap_or("<untitled>"),
            self.url().unwrap_or("-"),
        )
    }
}
