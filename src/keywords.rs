//! Keyword dictionary
//!
//! Maps trigger words to the response text that gets synthesized when a
//! transcript mentions them. Iteration order is the match priority.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A trigger word and the response spoken back for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    /// Word searched for in transcripts, also the artifact filename stem
    pub trigger: String,
    /// Text handed to speech synthesis
    pub response: String,
}

impl KeywordEntry {
    /// Create a new entry
    pub fn new(trigger: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            response: response.into(),
        }
    }
}

/// Built-in triggers, in match priority order
const DEFAULT_ENTRIES: &[(&str, &str)] = &[
    ("world", "hello world"),
    (
        "usa",
        "USA refers to the United States of America, a large country in North America known for its diverse culture, economic power, and global influence.",
    ),
    (
        "america",
        "The history of the United States of America is rich and complex, spanning thousands of years of indigenous cultures and over 400 years since European exploration and colonization. ",
    ),
    (
        "wikipedia",
        "Wikipedia is a free, multilingual, web-based encyclopedia created and maintained by a community of volunteer editors. It is one of the most popular reference websites, offering millions of articles in various languages.",
    ),
    (
        "google",
        "Google Search: The world's most popular search engine",
    ),
];

/// Immutable, ordered set of keyword entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDictionary {
    entries: Vec<KeywordEntry>,
}

impl KeywordDictionary {
    /// Build a dictionary from entries, keeping their order
    ///
    /// # Errors
    ///
    /// Returns error if the list is empty, a trigger is blank, or a trigger
    /// appears twice (case-insensitively). Triggers are stored trimmed.
    pub fn new(mut entries: Vec<KeywordEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config("keyword dictionary is empty".to_string()));
        }

        let mut seen: Vec<String> = Vec::with_capacity(entries.len());
        for entry in &mut entries {
            entry.trigger = entry.trigger.trim().to_string();
            let normalized = entry.trigger.to_lowercase();
            if normalized.is_empty() {
                return Err(Error::Config("keyword trigger cannot be blank".to_string()));
            }
            if normalized.contains('/') {
                return Err(Error::Config(format!(
                    "keyword trigger '{}' cannot contain '/'",
                    entry.trigger
                )));
            }
            if seen.contains(&normalized) {
                return Err(Error::Config(format!(
                    "duplicate keyword trigger '{}'",
                    entry.trigger
                )));
            }
            seen.push(normalized);
        }

        tracing::debug!(triggers = ?seen, "keyword dictionary loaded");
        Ok(Self { entries })
    }

    /// Entries in match priority order
    #[must_use]
    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    /// Look up an entry by exact trigger (case-insensitive)
    #[must_use]
    pub fn get(&self, trigger: &str) -> Option<&KeywordEntry> {
        self.entries
            .iter()
            .find(|e| e.trigger.eq_ignore_ascii_case(trigger))
    }

    /// First entry mentioned in the transcript
    #[must_use]
    pub fn find_match(&self, transcript: &str) -> Option<&KeywordEntry> {
        find_match(&self.entries, transcript)
    }
}

impl Default for KeywordDictionary {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES
                .iter()
                .map(|(trigger, response)| KeywordEntry::new(*trigger, *response))
                .collect(),
        }
    }
}

/// Return the first entry whose trigger is contained in the transcript
///
/// Comparison is case-insensitive on both sides. Entries are scanned in
/// slice order so the earliest entry wins when several triggers appear.
#[must_use]
pub fn find_match<'a>(entries: &'a [KeywordEntry], transcript: &str) -> Option<&'a KeywordEntry> {
    let normalized = transcript.to_lowercase();

    entries
        .iter()
        .find(|entry| normalized.contains(&entry.trigger.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let dict = KeywordDictionary::default();
        let triggers: Vec<&str> = dict.entries().iter().map(|e| e.trigger.as_str()).collect();
        assert_eq!(triggers, ["world", "usa", "america", "wikipedia", "google"]);
    }

    #[test]
    fn test_triggers_are_trimmed() {
        let dict = KeywordDictionary::new(vec![KeywordEntry::new(" usa ", "United States")]).unwrap();

        assert_eq!(dict.entries()[0].trigger, "usa");
        assert_eq!(dict.find_match("the usa today").unwrap().trigger, "usa");
        assert_eq!(crate::artifact_key(&dict.entries()[0].trigger), "usa.mp3");
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let dict = KeywordDictionary::default();
        let hit = dict.find_match("tell me about USA please").unwrap();
        assert_eq!(hit.trigger, "usa");
    }

    #[test]
    fn test_no_match() {
        let dict = KeywordDictionary::default();
        assert!(dict.find_match("good morning").is_none());
        assert!(dict.find_match("").is_none());
    }

    #[test]
    fn test_first_entry_wins() {
        let dict = KeywordDictionary::default();

        // "google" appears first in the text, "world" first in the dictionary
        let hit = dict.find_match("google is the biggest search engine in the world").unwrap();
        assert_eq!(hit.trigger, "world");

        // "america" contains no other trigger, "usa" precedes it
        let hit = dict.find_match("America, also called the USA").unwrap();
        assert_eq!(hit.trigger, "usa");
    }

    #[test]
    fn test_substring_containment() {
        let dict = KeywordDictionary::default();
        let hit = dict.find_match("south american rivers").unwrap();
        assert_eq!(hit.trigger, "america");
    }

    #[test]
    fn test_mixed_case_trigger() {
        let entries = vec![KeywordEntry::new("Rust", "a systems language")];
        assert_eq!(find_match(&entries, "i like rust").unwrap().trigger, "Rust");
    }

    #[test]
    fn test_rejects_duplicates() {
        let entries = vec![KeywordEntry::new("a", "x"), KeywordEntry::new("A", "y")];
        assert!(KeywordDictionary::new(entries).is_err());
    }

    #[test]
    fn test_rejects_blank_and_empty() {
        assert!(KeywordDictionary::new(vec![]).is_err());
        assert!(KeywordDictionary::new(vec![KeywordEntry::new("  ", "x")]).is_err());
        assert!(KeywordDictionary::new(vec![KeywordEntry::new("a/b", "x")]).is_err());
    }

    #[test]
    fn test_get() {
        let dict = KeywordDictionary::default();
        assert_eq!(dict.get("Google").unwrap().trigger, "google");
        assert!(dict.get("bing").is_none());
    }
}
