use crate::history::History;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mutable per-session state shared by every command dispatch.
///
/// The working directory is tracked here instead of via the process-wide
/// one: `cd` only ever mutates this struct, and every path a command touches
/// is resolved against it through [`Environment::resolve`].
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub history: History,
    pub should_exit: bool,
    pub exit_code: i32,
}

impl Environment {
    /// Capture the hosting process environment and working directory.
    pub fn new() -> Self {
        Environment {
            vars: std::env::vars().collect(),
            current_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            history: History::new(),
            should_exit: false,
            exit_code: 0,
        }
    }

    pub fn get_var(&self, name: &str) -> Option<&String> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Interpret `path` relative to the session working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_variable() {
        let mut env = Environment::new();
        env.set_var("GREETING", "hello");
        assert_eq!(env.get_var("GREETING"), Some(&"hello".to_string()));
        assert_eq!(env.get_var("NO_SUCH_VARIABLE_SET"), None);
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let env = Environment::new();
        assert_eq!(env.resolve(Path::new("/etc/hosts")), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn resolve_joins_relative_paths_to_current_dir() {
        let mut env = Environment::new();
        env.current_dir = PathBuf::from("/tmp/work");
        assert_eq!(env.resolve(Path::new("notes.txt")), PathBuf::from("/tmp/work/notes.txt"));
        assert_eq!(env.resolve(Path::new("../up")), PathBuf::from("/tmp/work/../up"));
    }
}
