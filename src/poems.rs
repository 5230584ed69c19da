//! Read-only poem retrieval over a static corpus. Each physical line of the
//! corpus is indexed through [`MessageIndex`]; sections are delimited by
//! Roman-numeral marker lines (`"I."`, `"II."`, ...), located via a
//! precomputed number-to-numeral mapping loaded at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::info;

use crate::index::MessageIndex;

#[derive(Debug)]
pub struct PoemIndex {
    index: MessageIndex,
    int2roman: BTreeMap<u32, String>,
}

impl PoemIndex {
    /// Builds the index from the corpus text file and the JSON numeral
    /// mapping (`{"1": "I", "2": "II", ...}`). Either file missing or
    /// unparseable is an error; the server treats that as fatal at startup.
    pub fn from_files(corpus: &Path, numerals: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mapping = fs::read_to_string(numerals)
            .map_err(|e| format!("cannot read numeral mapping {}: {}", numerals.display(), e))?;
        let int2roman: BTreeMap<u32, String> = serde_json::from_str(&mapping)
            .map_err(|e| format!("bad numeral mapping {}: {}", numerals.display(), e))?;
        let text = fs::read_to_string(corpus)
            .map_err(|e| format!("cannot read corpus {}: {}", corpus.display(), e))?;

        let built = Self::from_parts(corpus.to_string_lossy().as_ref(), text.lines(), int2roman);
        info!(
            "poem corpus loaded: {} lines, {} sections",
            built.index.len(),
            built.int2roman.len()
        );
        Ok(built)
    }

    /// In-memory constructor, shared by `from_files` and the tests.
    pub fn from_parts<'a, I>(name: &str, lines: I, int2roman: BTreeMap<u32, String>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut index = MessageIndex::new(name);
        for line in lines {
            index.add_msg_and_index(line.trim_end());
        }
        Self { index, int2roman }
    }

    pub fn poem_count(&self) -> usize {
        self.int2roman.len()
    }

    /// Returns poem `n`'s lines, left-trimmed, or `None` if `n` has no
    /// numeral mapping or its marker line is absent from the corpus. Lines
    /// run from just past the marker (skipping blank lines) to the next
    /// poem's marker line, or corpus end for the last poem.
    pub fn get_poem(&self, n: u32) -> Option<Vec<String>> {
        let marker = format!("{}.", self.int2roman.get(&n)?);
        let next_marker = self.int2roman.get(&(n + 1)).map(|r| format!("{}.", r));

        let (mut at, _) = self.index.search(&marker).into_iter().next()?;
        at += 1;
        let end = self.index.len();
        while at < end && self.index.msg(at).is_some_and(|m| m.trim().is_empty()) {
            at += 1;
        }

        let mut poem = Vec::new();
        while at < end {
            let line = match self.index.msg(at) {
                Some(line) => line,
                None => break,
            };
            if next_marker.as_deref() == Some(line) {
                break;
            }
            if !line.trim().is_empty() {
                poem.push(line.trim_start().to_string());
            }
            at += 1;
        }
        Some(poem)
    }
}
