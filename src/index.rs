//! Per-user searchable message history: an append-only line store plus an
//! inverted word index. Serialized as JSON to `<name>.idx` when the owner
//! logs out and reloaded at the next login.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageIndex {
    name: String,
    msgs: Vec<String>,
    index: HashMap<String, Vec<usize>>,
    total_words: usize,
}

impl MessageIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            msgs: Vec::new(),
            index: HashMap::new(),
            total_words: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn msg(&self, n: usize) -> Option<&str> {
        self.msgs.get(n).map(String::as_str)
    }

    /// Appends a line and indexes each whitespace-delimited token against the
    /// new line number. Occurrence lists stay in insertion order, so they are
    /// monotonically increasing by construction.
    pub fn add_msg_and_index(&mut self, line: &str) {
        let at = self.msgs.len();
        self.msgs.push(line.to_string());
        for word in line.split_whitespace() {
            self.total_words += 1;
            self.index.entry(word.to_string()).or_default().push(at);
        }
    }

    /// Exact-token lookup: the stored lines containing `term`, in insertion
    /// order, paired with their line numbers. No stemming, no substrings.
    pub fn search(&self, term: &str) -> Vec<(usize, &str)> {
        match self.index.get(term) {
            Some(lines) => lines.iter().map(|&i| (i, self.msgs[i].as_str())).collect(),
            None => Vec::new(),
        }
    }

    fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.idx", name))
    }

    /// Loads the index persisted for `name`, or a fresh one if there is no
    /// file yet. A corrupt file is logged and replaced rather than refused:
    /// history persistence is best effort.
    pub fn load(dir: &Path, name: &str) -> io::Result<Self> {
        let path = Self::file_path(dir, name);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(index) => Ok(index),
                Err(e) => {
                    warn!("discarding corrupt index {}: {}", path.display(), e);
                    Ok(Self::new(name))
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new(name)),
            Err(e) => Err(e),
        }
    }

    /// Overwrites the persisted copy of this index.
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        let raw = serde_json::to_string(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(Self::file_path(dir, &self.name), raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_tokens_come_back_in_insertion_order() {
        let mut idx = MessageIndex::new("alice");
        idx.add_msg_and_index("hello bob");
        idx.add_msg_and_index("goodbye bob");
        idx.add_msg_and_index("hello again");

        let hits: Vec<&str> = idx.search("hello").into_iter().map(|(_, m)| m).collect();
        assert_eq!(hits, vec!["hello bob", "hello again"]);
        let hits: Vec<usize> = idx.search("bob").into_iter().map(|(i, _)| i).collect();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn every_token_of_an_added_line_is_findable() {
        let mut idx = MessageIndex::new("alice");
        let line = "[09:00 AM] alice: the quick brown fox";
        idx.add_msg_and_index(line);
        for token in line.split_whitespace() {
            let hits = idx.search(token);
            assert!(hits.iter().any(|&(_, m)| m == line), "token {:?} missing", token);
        }
    }

    #[test]
    fn duplicate_words_on_one_line_record_each_occurrence() {
        let mut idx = MessageIndex::new("a");
        idx.add_msg_and_index("spam spam spam");
        assert_eq!(idx.search("spam").len(), 3);
        assert_eq!(idx.total_words(), 3);
    }

    #[test]
    fn unknown_term_is_empty_not_an_error() {
        let idx = MessageIndex::new("a");
        assert!(idx.search("anything").is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = MessageIndex::new("alice");
        idx.add_msg_and_index("one two");
        idx.add_msg_and_index("two three");
        idx.save(dir.path()).unwrap();

        let reloaded = MessageIndex::load(dir.path(), "alice").unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.search("two").len(), 2);
        assert_eq!(reloaded.total_words(), 4);
    }

    #[test]
    fn missing_file_means_a_fresh_index() {
        let dir = tempfile::tempdir().unwrap();
        let idx = MessageIndex::load(dir.path(), "nobody").unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn corrupt_file_is_replaced_by_a_fresh_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alice.idx"), "not json at all").unwrap();
        let idx = MessageIndex::load(dir.path(), "alice").unwrap();
        assert!(idx.is_empty());
    }
}
