//! BullMQ key layout.
//!
//! A queue named "orders" under the default prefix keeps its metadata hash
//! at "bull:orders:meta", its state collections at "bull:orders:wait",
//! "bull:orders:completed" and so on, each job hash at "bull:orders:<id>"
//! and its event stream at "bull:orders:events". Queue names may themselves
//! contain ':' so names are only ever recovered with an anchored pattern.

use regex::Regex;

use bullscope_models::JobState;

use crate::error::{QueueError, QueueResult};

/// Suffix of the per-queue metadata hash.
pub const META_SUFFIX: &str = "meta";

/// Field present in the metadata hash while a queue is paused.
pub const PAUSED_FIELD: &str = "paused";

/// How a state collection is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Redis list, newest job at the head
    List,
    /// Redis sorted set scored by time or priority
    SortedSet,
}

/// Storage key suffix and kind for a job state.
pub fn state_key(state: JobState) -> (&'static str, KeyKind) {
    match state {
        JobState::Waiting => ("wait", KeyKind::List),
        JobState::Active => ("active", KeyKind::List),
        JobState::Paused => ("paused", KeyKind::List),
        JobState::Completed => ("completed", KeyKind::SortedSet),
        JobState::Failed => ("failed", KeyKind::SortedSet),
        JobState::Delayed => ("delayed", KeyKind::SortedSet),
        JobState::Prioritized => ("prioritized", KeyKind::SortedSet),
    }
}

/// Key naming rules for one prefix.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    prefix: String,
    meta_key: Regex,
}

impl KeyScheme {
    pub fn new(prefix: &str) -> QueueResult<Self> {
        let pattern = format!("^{}:(.+):{}$", regex::escape(prefix), META_SUFFIX);
        let meta_key = Regex::new(&pattern)
            .map_err(|e| QueueError::invalid_config(format!("bad key prefix {:?}: {}", prefix, e)))?;
        Ok(Self {
            prefix: prefix.to_string(),
            meta_key,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// SCAN MATCH pattern selecting every queue metadata hash.
    pub fn meta_scan_pattern(&self) -> String {
        format!("{}:*:{}", glob_escape(&self.prefix), META_SUFFIX)
    }

    /// Extract the queue name embedded in a metadata key.
    ///
    /// Returns `None` for keys outside this scheme and for names that are
    /// empty or whitespace-only.
    pub fn queue_name_from_meta_key(&self, key: &str) -> Option<String> {
        let name = self.meta_key.captures(key)?.get(1)?.as_str();
        if name.trim().is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Keys for a single queue.
    pub fn queue(&self, name: &str) -> QueueKeys {
        QueueKeys {
            base: format!("{}:{}", self.prefix, name),
        }
    }
}

/// Keys belonging to one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    base: String,
}

impl QueueKeys {
    pub fn meta(&self) -> String {
        format!("{}:{}", self.base, META_SUFFIX)
    }

    /// Collection holding jobs in `state`.
    pub fn state(&self, state: JobState) -> String {
        format!("{}:{}", self.base, state_key(state).0)
    }

    /// Hash holding a single job.
    pub fn job(&self, id: &str) -> String {
        format!("{}:{}", self.base, id)
    }

    pub fn logs(&self, id: &str) -> String {
        format!("{}:{}:logs", self.base, id)
    }

    pub fn events(&self) -> String {
        format!("{}:events", self.base)
    }
}

/// Escape glob metacharacters understood by SCAN MATCH.
fn glob_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_keeps_separators() {
        let keys = KeyScheme::new("bull").unwrap();
        assert_eq!(
            keys.queue_name_from_meta_key("bull:orders:with:colon:meta").as_deref(),
            Some("orders:with:colon")
        );
        assert_eq!(keys.queue_name_from_meta_key("bull:orders:meta").as_deref(), Some("orders"));
    }

    #[test]
    fn test_queue_name_rejects_blank_and_foreign_keys() {
        let keys = KeyScheme::new("bull").unwrap();
        assert_eq!(keys.queue_name_from_meta_key("bull:  :meta"), None);
        assert_eq!(keys.queue_name_from_meta_key("bull::meta"), None);
        assert_eq!(keys.queue_name_from_meta_key("other:orders:meta"), None);
        assert_eq!(keys.queue_name_from_meta_key("bull:orders:meta:x"), None);
    }

    #[test]
    fn test_prefix_is_matched_literally() {
        let keys = KeyScheme::new("app.v2").unwrap();
        assert_eq!(keys.queue_name_from_meta_key("appXv2:orders:meta"), None);
        assert_eq!(keys.queue_name_from_meta_key("app.v2:orders:meta").as_deref(), Some("orders"));
    }

    #[test]
    fn test_scan_pattern_escapes_glob() {
        assert_eq!(KeyScheme::new("bull").unwrap().meta_scan_pattern(), "bull:*:meta");
        assert_eq!(KeyScheme::new("a*b").unwrap().meta_scan_pattern(), "a\\*b:*:meta");
    }

    #[test]
    fn test_queue_keys() {
        let keys = KeyScheme::new("bull").unwrap().queue("mail");
        assert_eq!(keys.meta(), "bull:mail:meta");
        assert_eq!(keys.state(JobState::Waiting), "bull:mail:wait");
        assert_eq!(keys.state(JobState::Prioritized), "bull:mail:prioritized");
        assert_eq!(keys.job("17"), "bull:mail:17");
        assert_eq!(keys.logs("17"), "bull:mail:17:logs");
        assert_eq!(keys.events(), "bull:mail:events");
    }
}
