//! Red list: names that are drawn in the alert color when recognized.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedListError {
    #[error("failed to read red list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedList {
    names: HashSet<String>,
}

impl RedList {
    /// Load a red list, one name per line.
    ///
    /// A missing file yields an empty list. Lines are trimmed; blank lines
    /// are skipped.
    pub fn load(path: &Path) -> Result<Self, RedListError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let list = Self::parse(&text);
                tracing::debug!(path = %path.display(), names = list.len(), "loaded red list");
                Ok(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no red list file; using empty list");
                Ok(Self::default())
            }
            Err(source) => Err(RedListError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for RedList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = RedList::load(&dir.path().join("red_list.txt")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_load_trims_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red_list.txt");
        std::fs::write(&path, "  Alice \r\n\nBob\n   \n").unwrap();

        let list = RedList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("Alice"));
        assert!(list.contains("Bob"));
        assert!(!list.contains(""));
    }

    #[test]
    fn test_unknown_is_not_special() {
        let list = RedList::parse("Unknown\n");
        assert!(list.contains("Unknown"));
        assert!(!RedList::parse("Alice").contains("Unknown"));
    }

    #[test]
    fn test_case_sensitive() {
        let list: RedList = ["Alice"].into_iter().collect();
        assert!(!list.contains("alice"));
    }
}
