//! Candidate list handling and random shader selection.
//!
//! The candidate list is a plain text file with one shader id per line. A line
//! starting with `#` keeps the entry around but disables it. Lines that do not
//! hold a usable id are logged and skipped.
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::prelude::*;
use shadertoy::ContentId;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to read candidate list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create candidate list {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: ContentId,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList {
    entries: Vec<Candidate>,
}

impl CandidateList {
    /// Reads the list at `path`, creating an empty file when none exists.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|source| SchedulerError::Create {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
                fs::write(path, "").map_err(|source| SchedulerError::Create {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "created empty candidate list");
                Ok(Self::default())
            }
            Err(source) => Err(SchedulerError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (enabled, raw) = match trimmed.strip_prefix('#') {
                Some(rest) => (false, rest.trim()),
                None => (true, trimmed),
            };
            if raw.is_empty() {
                continue;
            }
            match ContentId::parse(raw) {
                Ok(id) => entries.push(Candidate { id, enabled }),
                Err(err) if enabled => {
                    warn!(line = number + 1, error = %err, "skipping candidate list entry");
                }
                // Disabled lines double as free-form comments.
                Err(_) => {}
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.enabled).count()
    }

    /// Distinct enabled ids in list order.
    pub fn distinct_enabled(&self) -> Vec<ContentId> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| entry.enabled && seen.insert(&entry.id))
            .map(|entry| entry.id.clone())
            .collect()
    }
}

pub struct Selector {
    candidates: Arc<CandidateList>,
    rng: StdRng,
}

impl Selector {
    pub fn new(candidates: Arc<CandidateList>) -> Self {
        Self {
            candidates,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(candidates: Arc<CandidateList>, seed: u64) -> Self {
        Self {
            candidates,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn candidates(&self) -> &CandidateList {
        &self.candidates
    }

    /// Picks a random start index and scans forward, wrapping once, for the
    /// first enabled entry. Duplicated ids are proportionally more likely.
    pub fn pick(&mut self) -> Option<ContentId> {
        let entries = self.candidates.entries();
        if entries.is_empty() {
            return None;
        }
        let start = self.rng.gen_range(0..entries.len());
        entries
            .iter()
            .cycle()
            .skip(start)
            .take(entries.len())
            .find(|entry| entry.enabled)
            .map(|entry| entry.id.clone())
    }

    /// Every distinct enabled id exactly once, beginning at a random entry
    /// and continuing in list order with wrap-around.
    pub fn attempts(&mut self) -> Attempts {
        let entries = self.candidates.entries();
        if entries.is_empty() {
            return Attempts {
                order: Vec::new().into_iter(),
            };
        }
        let start = self.rng.gen_range(0..entries.len());
        let mut seen = HashSet::new();
        let order: Vec<ContentId> = entries
            .iter()
            .cycle()
            .skip(start)
            .take(entries.len())
            .filter(|entry| entry.enabled && seen.insert(&entry.id))
            .map(|entry| entry.id.clone())
            .collect();
        Attempts {
            order: order.into_iter(),
        }
    }
}

/// Bounded retry order produced by [`Selector::attempts`].
#[derive(Debug)]
pub struct Attempts {
    order: std::vec::IntoIter<ContentId>,
}

impl Iterator for Attempts {
    type Item = ContentId;

    fn next(&mut self) -> Option<Self::Item> {
        self.order.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl ExactSizeIterator for Attempts {}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(text: &str, seed: u64) -> Selector {
        Selector::with_seed(Arc::new(CandidateList::parse(text)), seed)
    }

    #[test]
    fn parses_enabled_and_disabled_entries() {
        let list = CandidateList::parse("abc\n\n  #def  \n# \nghi\n#this is a note\n");
        let ids: Vec<_> = list
            .entries()
            .iter()
            .map(|entry| (entry.id.as_str(), entry.enabled))
            .collect();
        assert_eq!(ids, vec![("abc", true), ("def", false), ("ghi", true)]);
        assert_eq!(list.enabled_count(), 2);
    }

    #[test]
    fn skips_invalid_lines() {
        let list = CandidateList::parse("ok1\nbad id!\nwaytoolongidentifier123\nok2\n");
        let ids: Vec<_> = list.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ok1", "ok2"]);
    }

    #[test]
    fn empty_list_picks_nothing() {
        let mut selector = selector("", 1);
        assert_eq!(selector.pick(), None);
        assert_eq!(selector.attempts().count(), 0);
    }

    #[test]
    fn all_disabled_picks_nothing() {
        let mut selector = selector("#a\n#b\n#c\n", 9);
        for _ in 0..16 {
            assert_eq!(selector.pick(), None);
        }
        assert_eq!(selector.attempts().len(), 0);
    }

    #[test]
    fn pick_only_returns_enabled_entries() {
        let mut selector = selector("#a\nb\n#c\n#d\n", 3);
        for _ in 0..32 {
            assert_eq!(selector.pick().unwrap().as_str(), "b");
        }
    }

    #[test]
    fn pick_covers_every_enabled_entry() {
        let mut selector = selector("a\nb\nc\n", 5);
        let seen: HashSet<_> = (0..200)
            .filter_map(|_| selector.pick())
            .map(|id| id.to_string())
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn attempts_yield_each_distinct_id_once() {
        let mut selector = selector("a\nb\na\n#c\nd\nb\n", 11);
        let attempts: Vec<String> = selector.attempts().map(|id| id.to_string()).collect();
        assert_eq!(attempts.len(), 3);
        let distinct: HashSet<_> = attempts.iter().collect();
        assert_eq!(distinct.len(), 3);
        assert!(!attempts.iter().any(|id| id == "c"));
    }

    #[test]
    fn attempts_follow_list_order_from_random_start() {
        let mut selector = selector("a\nb\nc\nd\n", 21);
        let attempts: Vec<String> = selector.attempts().map(|id| id.to_string()).collect();
        let start = ["a", "b", "c", "d"]
            .iter()
            .position(|id| *id == attempts[0])
            .unwrap();
        let expected: Vec<String> = (0..4)
            .map(|offset| ["a", "b", "c", "d"][(start + offset) % 4].to_string())
            .collect();
        assert_eq!(attempts, expected);
    }

    #[test]
    fn seeded_selectors_agree() {
        let list = Arc::new(CandidateList::parse("a\nb\nc\nd\ne\n"));
        let mut first = Selector::with_seed(list.clone(), 42);
        let mut second = Selector::with_seed(list, 42);
        for _ in 0..8 {
            assert_eq!(first.pick(), second.pick());
        }
    }

    #[test]
    fn load_creates_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("shaders.txt");
        let list = CandidateList::load(&path).unwrap();
        assert!(list.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn load_reads_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("shaders.txt");
        fs::write(&path, "XsXXDn\n#4dfGzS\n").unwrap();
        let list = CandidateList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.distinct_enabled().len(), 1);
    }
}
