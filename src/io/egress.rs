//! JSONL egress - appends records to side-effect files
//!
//! One JSON object per line. Write failures are logged and reported to the
//! caller, never propagated: a full disk must not stop the control loop.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Append one serialized record to `path`, creating parent directories
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    let line = serde_json::to_string(record)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    debug!(file = %path.display(), bytes = %line.len(), "egress_written");
    Ok(())
}

/// Last `limit` parseable records of a JSONL file, oldest first
///
/// Missing files yield nothing; unparsable lines are skipped.
pub fn read_jsonl_tail<T: DeserializeOwned>(path: &Path, limit: usize) -> Vec<T> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    let mut tail: VecDeque<T> = VecDeque::with_capacity(limit.min(1024));
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => {
                if tail.len() == limit {
                    tail.pop_front();
                }
                if limit > 0 {
                    tail.push_back(record);
                }
            }
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(file = %path.display(), skipped = %skipped, "jsonl_lines_skipped");
    }
    tail.into()
}

/// Egress writer bound to one JSONL file
#[derive(Debug, Clone)]
pub struct Egress {
    file_path: PathBuf,
}

impl Egress {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        debug!(file_path = %file_path.display(), "egress_initialized");
        Self { file_path }
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        &self.file_path
    }

    /// Write a record to the egress file
    /// Returns true if successful, false otherwise
    pub fn write<T: Serialize>(&self, record: &T) -> bool {
        match append_jsonl(&self.file_path, record) {
            Ok(()) => true,
            Err(e) => {
                error!(file = %self.file_path.display(), error = %e, "egress_write_failed");
                false
            }
        }
    }

    pub fn read_tail<T: DeserializeOwned>(&self, limit: usize) -> Vec<T> {
        read_jsonl_tail(&self.file_path, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_egress_new() {
        let egress = Egress::new("test.jsonl");
        assert_eq!(egress.path(), Path::new("test.jsonl"));
    }

    #[test]
    fn test_write_record() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("alerts.jsonl");
        let egress = Egress::new(&file_path);

        assert!(egress.write(&json!({"zone": "Checkout", "confidence": 0.9})));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["zone"], "Checkout");
    }

    #[test]
    fn test_repeated_writes_append() {
        let dir = tempdir().unwrap();
        let egress = Egress::new(dir.path().join("events.jsonl"));

        let records: Vec<Value> = (0..5).map(|i| json!({"i": i})).collect();
        assert!(records.iter().all(|r| egress.write(r)));

        let content = fs::read_to_string(egress.path()).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("rci.jsonl");
        let egress = Egress::new(&nested_path);

        assert!(egress.write(&json!({"ok": true})));
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("outcomes.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(&file_path);
        egress.write(&json!({"new": 1}));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("new"));
    }

    #[test]
    fn test_read_tail_skips_garbage() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("eval.jsonl");
        fs::write(&file_path, "{\"i\":1}\nnot json\n\n{\"i\":2}\n{\"i\":3}\n").unwrap();

        let tail: Vec<Value> = read_jsonl_tail(&file_path, 2);
        assert_eq!(tail, vec![json!({"i": 2}), json!({"i": 3})]);

        let all: Vec<Value> = read_jsonl_tail(&file_path, 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_read_tail_missing_file() {
        let dir = tempdir().unwrap();
        let tail: Vec<Value> = read_jsonl_tail(&dir.path().join("absent.jsonl"), 5);
        assert!(tail.is_empty());
    }
}
