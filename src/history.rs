use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ordered, append-only log of accepted input lines.
///
/// Entries are never reordered or removed. The file format is plain text,
/// one entry per line; blank lines are skipped on load. For append-delta
/// writes the log tracks a per-file high-water mark: the index just past the
/// last entry already flushed to that file.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    marks: HashMap<PathBuf, usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the entries of `path` to the in-memory log.
    ///
    /// The file's high-water mark is set past the loaded entries, so a later
    /// [`History::append_new`] to the same file only emits what the session
    /// added afterwards.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("history: {}: can't read", path.display()))?;
        for line in text.lines() {
            if !line.trim().is_empty() {
                self.entries.push(line.to_string());
            }
        }
        self.marks.insert(path.to_path_buf(), self.entries.len());
        Ok(())
    }

    /// Overwrite `path` with the full log, entry order preserved.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)
            .with_context(|| format!("history: {}: can't write", path.display()))?;
        for entry in &self.entries {
            writeln!(file, "{entry}")?;
        }
        self.marks.insert(path.to_path_buf(), self.entries.len());
        Ok(())
    }

    /// Append the entries added since the last load/save/append involving
    /// `path`, then advance that file's high-water mark.
    pub fn append_new(&mut self, path: &Path) -> Result<()> {
        let mark = self.marks.get(path).copied().unwrap_or(0);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("history: {}: can't append", path.display()))?;
        for entry in &self.entries[mark..] {
            writeln!(file, "{entry}")?;
        }
        self.marks.insert(path.to_path_buf(), self.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("hist_test_{}_{}_{}", tag, std::process::id(), nanos))
    }

    #[test]
    fn push_preserves_order_and_duplicates() {
        let mut history = History::new();
        history.push("ls");
        history.push("ls");
        history.push("pwd");
        assert_eq!(history.entries(), &["ls", "ls", "pwd"]);
    }

    #[test]
    fn load_skips_blank_lines() {
        let path = temp_file("load");
        fs::write(&path, "one\n\ntwo\n   \nthree\n").unwrap();

        let mut history = History::new();
        history.load(&path).unwrap();
        assert_eq!(history.entries(), &["one", "two", "three"]);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn save_roundtrips() {
        let path = temp_file("save");
        let mut history = History::new();
        history.push("a");
        history.push("b");
        history.save(&path).unwrap();

        let mut reloaded = History::new();
        reloaded.load(&path).unwrap();
        assert_eq!(reloaded.entries(), &["a", "b"]);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn append_new_only_writes_session_entries_once() {
        let path = temp_file("append");
        fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let mut history = History::new();
        history.load(&path).unwrap();
        history.push("four");
        history.push("five");

        history.append_new(&path).unwrap();
        history.append_new(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "one\ntwo\nthree\nfour\nfive\n");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn append_new_to_fresh_file_writes_everything() {
        let path = temp_file("fresh");
        let mut history = History::new();
        history.push("a");
        history.push("b");
        history.append_new(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a\nb\n");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let mut history = History::new();
        assert!(history.load(Path::new("/nonexistent/minishell-history")).is_err());
        assert!(history.is_empty());
    }
}
