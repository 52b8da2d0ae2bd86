//! Directory tree enumeration with exclusion pruning.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::filter::PathFilter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options for [`walk`].
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Leave symbolic links and junctions out of the result entirely.
    pub skip_links: bool,
    /// Print a notice for each excluded or skipped entry.
    pub print_excluded: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self { skip_links: false, print_excluded: true }
    }
}

/// One entry found under the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Enumerates every file and directory below `root` (the root itself excluded).
///
/// Each child is checked against `filter` before the walker descends into
/// it, so nothing below an excluded directory is ever visited. Links are
/// never followed. Directories that cannot be read are logged and skipped.
/// The order of the result is unspecified.
pub fn walk(
    root: &Path,
    filter: Option<&PathFilter>,
    options: WalkOptions,
    cancel: &CancelToken,
) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| keep_entry(root, entry, filter, options));

    for item in walker {
        cancel.check()?;
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let at = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                tracing::warn!(path = %at, "skipping unreadable entry: {}", err);
                continue;
            }
        };

        let file_type = entry.file_type();
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
        entries.push(TreeEntry {
            path: entry.path().to_path_buf(),
            relative,
            is_dir: file_type.is_dir(),
            is_symlink: file_type.is_symlink(),
        });
    }

    tracing::debug!(root = %root.display(), count = entries.len(), "walk finished");
    Ok(entries)
}

fn keep_entry(root: &Path, entry: &walkdir::DirEntry, filter: Option<&PathFilter>, options: WalkOptions) -> bool {
    let path = entry.path();

    if entry.path_is_symlink() && options.skip_links {
        if options.print_excluded {
            println!("Skipping symbolic link \"{}\"", absolute(path).display());
        }
        return false;
    }

    let Some(filter) = filter else {
        return true;
    };

    // `Path::is_dir` follows links, so a link to a directory is matched as one.
    let relative = path.strip_prefix(root).unwrap_or(path);
    let candidate = PathFilter::candidate(relative, path.is_dir());
    if filter.matches(&candidate) {
        if options.print_excluded {
            println!("Skipping excluded path \"{}\"", absolute(path).display());
        }
        return false;
    }
    true
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::collections::BTreeSet;

    fn rel_set(entries: &[TreeEntry]) -> BTreeSet<String> {
        entries
            .iter()
            .map(|e| PathFilter::candidate(&e.relative, e.is_dir))
            .collect()
    }

    fn quiet() -> WalkOptions {
        WalkOptions { skip_links: false, print_excluded: false }
    }

    #[test]
    fn walks_everything_without_filter() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), b"c").unwrap();
        fs::write(dir.path().join("top.txt"), b"t").unwrap();

        let entries = walk(dir.path(), None, quiet(), &CancelToken::new()).unwrap();
        let expected: BTreeSet<String> = ["a/", "a/b/", "a/b/c.txt", "top.txt"].iter().map(|s| s.to_string()).collect();
        assert_eq!(rel_set(&entries), expected);
    }

    #[test]
    fn excluded_directory_is_never_entered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cache/deep")).unwrap();
        fs::write(dir.path().join("cache/keep.txt"), b"k").unwrap();
        fs::write(dir.path().join("cache/deep/x"), b"x").unwrap();
        fs::write(dir.path().join("main.rs"), b"m").unwrap();

        let patterns = vec!["cache/".to_string(), "!cache/keep.txt".to_string()];
        let filter = PathFilter::compile(dir.path(), &[], &patterns, false).unwrap().unwrap();
        let entries = walk(dir.path(), Some(&filter), quiet(), &CancelToken::new()).unwrap();

        let found = rel_set(&entries);
        assert!(found.contains("main.rs"));
        assert!(found.iter().all(|p| !p.starts_with("cache")), "{found:?}");
    }

    #[cfg(unix)]
    #[test]
    fn links_are_leaves_or_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/inner.txt"), b"i").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let entries = walk(dir.path(), None, quiet(), &CancelToken::new()).unwrap();
        let link = entries.iter().find(|e| e.relative == Path::new("link")).expect("link listed");
        assert!(link.is_symlink);
        assert!(!entries.iter().any(|e| e.relative.parent() == Some(Path::new("link"))));
        assert!(!entries.iter().any(|e| e.relative == Path::new("link").join("inner.txt")));

        let skipping = WalkOptions { skip_links: true, print_excluded: false };
        let entries = walk(dir.path(), None, skipping, &CancelToken::new()).unwrap();
        assert!(!entries.iter().any(|e| e.is_symlink));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn cancelled_walk_stops() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"a").unwrap();
        let token = CancelToken::new();
        token.cancel();
        assert!(walk(dir.path(), None, quiet(), &token).is_err());
    }
}
