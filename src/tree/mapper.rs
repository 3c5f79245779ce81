//! Key-to-tree mapping
//!
//! Turns a prefix-scoped listing of flat keys into the immediate children
//! of one directory. A key whose remainder (after the prefix) still
//! contains the delimiter implies a directory named by its first segment;
//! otherwise the remainder names a file.

use std::collections::BTreeMap;

use tracing::debug;

use crate::store::DELIMITER;
use crate::tree::{Entry, EntryKind};

/// Immediate children derived from one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Classified children, sorted by name
    pub entries: Vec<Entry>,
    /// Names that are both a flat key and a directory prefix, sorted
    pub conflicts: Vec<String>,
}

/// Per-name accumulator; a name may be seen as both kinds across keys
#[derive(Debug, Clone, Copy, Default)]
struct Seen {
    file: bool,
    dir: bool,
}

/// Partition `keys` into the immediate children of `prefix`.
///
/// `prefix` is empty for the root, otherwise it ends with the delimiter.
/// Keys sharing a first segment collapse into a single directory entry.
/// A name that is a file in one key and a directory in another is not
/// guessed at: it lands in `conflicts` and is left out of `entries`.
pub fn partition<S: AsRef<str>>(prefix: &str, keys: &[S]) -> Partition {
    let mut seen: BTreeMap<&str, Seen> = BTreeMap::new();

    for key in keys {
        let key = key.as_ref();
        let Some(remainder) = key.strip_prefix(prefix) else {
            debug!("skipping key {:?} outside prefix {:?}", key, prefix);
            continue;
        };

        // Directory marker for the listed directory itself
        if remainder.is_empty() {
            continue;
        }

        let (name, kind) = match remainder.split_once(DELIMITER) {
            Some((first, _)) => (first, EntryKind::Directory),
            None => (remainder, EntryKind::File),
        };

        if name.is_empty() {
            debug!("skipping key {:?} with empty segment under {:?}", key, prefix);
            continue;
        }

        // Reserved by the filesystem; never resolvable as a child
        if name == "." || name == ".." {
            debug!("skipping key {:?} with dot segment under {:?}", key, prefix);
            continue;
        }

        let slot = seen.entry(name).or_default();
        match kind {
            EntryKind::File => slot.file = true,
            EntryKind::Directory => slot.dir = true,
        }
    }

    let mut partition = Partition::default();
    for (name, s) in seen {
        match (s.file, s.dir) {
            (true, true) => partition.conflicts.push(name.to_string()),
            (_, true) => partition.entries.push(Entry::directory(name)),
            _ => partition.entries.push(Entry::file(name)),
        }
    }
    partition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(p: &Partition, kind: EntryKind) -> Vec<&str> {
        p.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.name.as_str())
            .collect()
    }

    #[test]
    fn test_single_file_at_root() {
        let p = partition("", &["a.txt"]);
        assert_eq!(p.entries, vec![Entry::file("a.txt")]);
        assert!(p.conflicts.is_empty());
    }

    #[test]
    fn test_nested_key_implies_directory() {
        let p = partition("", &["dir1/b.txt"]);
        assert_eq!(p.entries, vec![Entry::directory("dir1")]);
    }

    #[test]
    fn test_empty_listing() {
        let keys: [&str; 0] = [];
        assert_eq!(partition("", &keys), Partition::default());
    }

    #[test]
    fn test_siblings_collapse_to_one_directory() {
        let p = partition(
            "",
            &["child2/grandchild1.txt", "child2/grandchild2.txt", "child2/deep/x", "top.txt"],
        );
        assert_eq!(names(&p, EntryKind::Directory), vec!["child2"]);
        assert_eq!(names(&p, EntryKind::File), vec!["top.txt"]);
        assert_eq!(p.entries.len(), 2);
    }

    #[test]
    fn test_prefix_is_stripped() {
        let p = partition("dir1/", &["dir1/b.txt", "dir1/sub/c.txt"]);
        assert_eq!(p.entries, vec![Entry::file("b.txt"), Entry::directory("sub")]);
    }

    #[test]
    fn test_marker_keys() {
        // The listed directory's own marker is skipped, a child marker is a directory
        let p = partition("dir1/", &["dir1/", "dir1/empty/"]);
        assert_eq!(p.entries, vec![Entry::directory("empty")]);
    }

    #[test]
    fn test_collision_is_reported() {
        let p = partition("", &["x", "x/y.txt", "z"]);
        assert_eq!(p.conflicts, vec!["x".to_string()]);
        assert_eq!(p.entries, vec![Entry::file("z")]);
    }

    #[test]
    fn test_empty_segment_and_foreign_keys_skipped() {
        let p = partition("d/", &["d//odd", "other/key", "d/ok"]);
        assert_eq!(p.entries, vec![Entry::file("ok")]);
    }

    #[test]
    fn test_dot_segments_skipped() {
        let p = partition("", &[".", "..", "./a", "../b/c", ".hidden", "..x"]);
        assert_eq!(p.entries, vec![Entry::file(".hidden"), Entry::file("..x")]);
        assert!(p.conflicts.is_empty());
    }

    #[test]
    fn test_every_continuation_is_represented() {
        let keys = ["a/1", "a/2", "b", "c/d/e", "f.txt", "g/"];
        let p = partition("", &keys);
        let mut got: Vec<&str> = p.entries.iter().map(|e| e.name.as_str()).collect();
        got.sort_unstable();
        let mut expected: Vec<&str> = keys
            .iter()
            .map(|k| k.split(DELIMITER).next().unwrap_or_default())
            .collect();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(got, expected);
    }
}
