//! Storage of full command output for paginated retrieval.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lru::LruCache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{Result, TerminalError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Full output of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOutput {
    pub id: String,
    pub command: String,
    pub output: String,
    pub exit_code: Option<i32>,
    pub prompt_shell: Option<String>,
    pub aborted: bool,
    pub timestamp: DateTime<Utc>,
    pub session_id: usize,
}

/// Describes the command a page belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub command: String,
    pub exit_code: Option<i32>,
    pub prompt_shell: Option<String>,
    pub aborted: bool,
    pub timestamp: DateTime<Utc>,
    pub session_id: usize,
}

/// A window of stored output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPage {
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub part: usize,
    pub total_parts: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub metadata: OutputMetadata,
}

/// Bounded store of recent outputs; the least recently used entry is evicted first.
#[derive(Debug)]
pub struct OutputStore {
    entries: Mutex<LruCache<String, StoredOutput>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StoredOutput {
    /// New record with a fresh id and the current time.
    pub fn new(
        session_id: usize,
        command: impl Into<String>,
        output: impl Into<String>,
        exit_code: Option<i32>,
        prompt_shell: Option<String>,
        aborted: bool,
    ) -> Self {
        Self {
            id: format!("out_{}", uuid::Uuid::new_v4().simple()),
            command: command.into(),
            output: output.into(),
            exit_code,
            prompt_shell,
            aborted,
            timestamp: Utc::now(),
            session_id,
        }
    }

    /// Output split into lines. Empty output has none.
    pub fn lines(&self) -> Vec<&str> {
        if self.output.is_empty() {
            Vec::new()
        } else {
            self.output.split('\n').collect()
        }
    }

    fn metadata(&self) -> OutputMetadata {
        OutputMetadata {
            command: self.command.clone(),
            exit_code: self.exit_code,
            prompt_shell: self.prompt_shell.clone(),
            aborted: self.aborted,
            timestamp: self.timestamp,
            session_id: self.session_id,
        }
    }
}

impl OutputStore {
    /// Store holding at most `capacity` outputs.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Keep a record, returning its id.
    pub fn store(&self, record: StoredOutput) -> String {
        let id = record.id.clone();
        if let Some((evicted, _)) = self.lock().push(id.clone(), record) {
            if evicted != id {
                tracing::debug!(output_id = %evicted, "evicted stored output");
            }
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<StoredOutput> {
        self.lock().get(id).cloned()
    }

    /// Lines `start_line..start_line + max_lines` (1-based) of a stored output.
    ///
    /// Empty output has no lines; its only page is the empty first page.
    pub fn page(&self, id: &str, start_line: usize, max_lines: usize) -> Result<OutputPage> {
        let record = self
            .get(id)
            .ok_or_else(|| TerminalError::OutputNotFound(id.to_string()))?;

        let all = record.lines();
        let total = all.len();
        let max_lines = max_lines.max(1);

        if total == 0 && start_line == 1 {
            return Ok(OutputPage {
                lines: Vec::new(),
                total_lines: 0,
                part: 1,
                total_parts: 1,
                start_line: 1,
                end_line: 0,
                metadata: record.metadata(),
            });
        }

        if start_line < 1 || start_line > total {
            return Err(TerminalError::InvalidLineRange(format!(
                "startLine {} is outside 1..={}",
                start_line, total
            )));
        }

        let end_line = (start_line + max_lines - 1).min(total);
        Ok(OutputPage {
            lines: all[start_line - 1..end_line]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            total_lines: total,
            part: (start_line - 1) / max_lines + 1,
            total_parts: total.div_ceil(max_lines),
            start_line,
            end_line,
            metadata: record.metadata(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, StoredOutput>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(output: &str) -> StoredOutput {
        StoredOutput::new(0, "cmd", output, Some(0), Some("$".into()), false)
    }

    #[test]
    fn test_id_format() {
        let r = record("x");
        assert!(r.id.starts_with("out_"));
        assert_ne!(r.id, record("x").id);
    }

    #[test]
    fn test_pages_reconstruct_output() {
        let text: String = (1..=23)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let store = OutputStore::new(10);
        let id = store.store(record(&text));

        let mut lines = Vec::new();
        let mut start = 1;
        let mut parts = Vec::new();
        loop {
            let page = store.page(&id, start, 10).unwrap();
            parts.push((page.part, page.total_parts));
            lines.extend(page.lines);
            if page.end_line == page.total_lines {
                break;
            }
            start = page.end_line + 1;
        }
        assert_eq!(lines.join("\n"), text);
        assert_eq!(parts, [(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_page_bounds() {
        let store = OutputStore::new(10);
        let id = store.store(record("a\nb\nc"));

        let page = store.page(&id, 3, 100).unwrap();
        assert_eq!(page.lines, ["c"]);
        assert_eq!((page.start_line, page.end_line), (3, 3));

        assert!(matches!(
            store.page(&id, 0, 10),
            Err(TerminalError::InvalidLineRange(_))
        ));
        assert!(matches!(
            store.page(&id, 4, 10),
            Err(TerminalError::InvalidLineRange(_))
        ));
    }

    #[test]
    fn test_trailing_newline_kept() {
        let store = OutputStore::new(10);
        let id = store.store(record("a\n"));
        let page = store.page(&id, 1, 10).unwrap();
        assert_eq!(page.total_lines, 2);
        assert_eq!(page.lines.join("\n"), "a\n");
    }

    #[test]
    fn test_empty_output_has_no_lines() {
        let store = OutputStore::new(10);
        let id = store.store(record(""));
        assert!(store.get(&id).unwrap().lines().is_empty());

        let page = store.page(&id, 1, 10).unwrap();
        assert!(page.lines.is_empty());
        assert_eq!(page.total_lines, 0);
        assert_eq!((page.part, page.total_parts), (1, 1));
        assert!(matches!(
            store.page(&id, 2, 10),
            Err(TerminalError::InvalidLineRange(_))
        ));
    }

    #[test]
    fn test_unknown_id() {
        let store = OutputStore::new(1);
        let err = store.page("out_missing", 1, 10).unwrap_err();
        assert_eq!(err.code(), "OUTPUT_NOT_FOUND");
    }

    #[test]
    fn test_lru_eviction() {
        let store = OutputStore::new(2);
        let a = store.store(record("a"));
        let b = store.store(record("b"));
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(store.get(&a).is_some());
        let c = store.store(record("c"));

        assert_eq!(store.len(), 2);
        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
        assert!(store.get(&c).is_some());
    }

    #[test]
    fn test_metadata() {
        let store = OutputStore::new(2);
        let id = store.store(StoredOutput::new(4, "false", "", Some(1), None, true));
        let page = store.page(&id, 1, 5).unwrap();
        assert_eq!(page.metadata.command, "false");
        assert_eq!(page.metadata.exit_code, Some(1));
        assert!(page.metadata.aborted);
        assert_eq!(page.metadata.session_id, 4);
    }
}
