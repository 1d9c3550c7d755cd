//! Prefix-tree index of completable command names.
//!
//! The index is rebuilt at the start of every line read: the set of
//! executables on the search path may change between commands.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    terminal: bool,
}

/// Character-keyed prefix tree over known command names.
///
/// Children are kept in a sorted map so candidate enumeration comes out in
/// lexicographic order.
#[derive(Debug, Default)]
pub struct CompletionTrie {
    root: TrieNode,
}

impl CompletionTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) {
        let mut node = &mut self.root;
        for ch in name.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.terminal = true;
    }

    fn walk(&self, prefix: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }

    /// The longest suffix extending `prefix` along an unambiguous path.
    ///
    /// Returns `None` when no known name starts with `prefix`. Descends while
    /// the current node has exactly one child and does not itself end a name;
    /// an immediate branch yields `Some("")` — the ambiguous case, resolved
    /// by [`CompletionTrie::matches`].
    pub fn longest_unique_extension(&self, prefix: &str) -> Option<String> {
        let mut node = self.walk(prefix)?;
        let mut suffix = String::new();
        while !node.terminal && node.children.len() == 1 {
            match node.children.iter().next() {
                Some((ch, child)) => {
                    suffix.push(*ch);
                    node = child;
                }
                None => break,
            }
        }
        Some(suffix)
    }

    /// All known names beginning with `prefix`, sorted.
    pub fn matches(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.walk(prefix) {
            let mut acc = prefix.to_string();
            collect(node, &mut acc, &mut out);
        }
        out
    }
}

fn collect(node: &TrieNode, acc: &mut String, out: &mut Vec<String>) {
    if node.terminal {
        out.push(acc.clone());
    }
    for (ch, child) in &node.children {
        acc.push(*ch);
        collect(child, acc, out);
        acc.pop();
    }
}

/// Index every executable name found on the search path.
///
/// An executable is a regular file with any execute bit set; unreadable
/// directories are skipped. Duplicate names across directories collapse in
/// the trie, matching first-match resolution.
pub fn index_search_path(search_paths: &OsStr) -> CompletionTrie {
    let mut trie = CompletionTrie::new();
    for dir in std::env::split_paths(search_paths) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            // fs::metadata follows symlinks; PATH directories are full of them.
            let Ok(metadata) = fs::metadata(entry.path()) else {
                continue;
            };
            if !is_executable(&metadata) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                trie.insert(name);
            }
        }
    }
    trie
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &fs::Metadata) -> bool {
    metadata.is_file()
}
