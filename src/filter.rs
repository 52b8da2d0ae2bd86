//! Exclusion filtering with gitignore semantics.
//!
//! Patterns come from `--exclude` arguments and from ignore files. They are
//! compiled once into a single [`Gitignore`] matcher, so the usual rules
//! apply: the last matching pattern wins, `!pattern` re-includes, a pattern
//! without a `/` matches at any depth and a trailing `/` restricts a pattern
//! to directories.

use crate::error::{AttrError, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};

/// A compiled exclusion rule set.
#[derive(Debug)]
pub struct PathFilter {
    matcher: Gitignore,
    ignore_case: bool,
}

impl PathFilter {
    /// Compiles ignore files and inline patterns, in that order.
    ///
    /// Returns `Ok(None)` when there is nothing to compile, so callers skip
    /// matching entirely in the common case. An ignore file that cannot be
    /// read is an error.
    pub fn compile(
        root: &Path,
        pattern_files: &[PathBuf],
        patterns: &[String],
        ignore_case: bool,
    ) -> Result<Option<PathFilter>> {
        let mut lines: Vec<(Option<PathBuf>, String)> = Vec::new();

        for file in pattern_files {
            let bytes = std::fs::read(file).map_err(|e| AttrError::PatternFile { path: file.clone(), source: e })?;
            let content = String::from_utf8_lossy(&bytes);
            lines.extend(content.lines().map(|l| (Some(file.clone()), l.to_string())));
        }
        lines.extend(patterns.iter().map(|p| (None, p.clone())));

        if lines.is_empty() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new(root);
        builder.case_insensitive(ignore_case)?;
        for (source, line) in &lines {
            builder.add_line(source.clone(), line)?;
        }
        let matcher = builder.build()?;
        tracing::debug!(rules = matcher.num_ignores() + matcher.num_whitelists(), ignore_case, "compiled exclusion rules");

        Ok(Some(PathFilter { matcher, ignore_case }))
    }

    /// Builds the candidate string for a root-relative path: `/` separators,
    /// no `./` prefix, and a trailing `/` for directories.
    pub fn candidate(relative: &Path, is_dir: bool) -> String {
        let mut out = String::new();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(&part.to_string_lossy());
            }
        }
        if is_dir && !out.is_empty() {
            out.push('/');
        }
        out
    }

    /// True if the candidate itself is excluded. Directories must carry a trailing `/`.
    pub fn matches(&self, candidate: &str) -> bool {
        let (path, is_dir) = split_candidate(candidate);
        if path.is_empty() {
            return false;
        }
        self.matcher.matched(Path::new(path), is_dir).is_ignore()
    }

    /// True if the candidate or any of its parent directories is excluded.
    ///
    /// A negation below an excluded directory does not bring entries back,
    /// matching what the tree walk does when it refuses to enter the directory.
    pub fn matches_with_parents(&self, candidate: &str) -> bool {
        let (path, is_dir) = split_candidate(candidate);
        if path.is_empty() {
            return false;
        }
        let path = Path::new(path);
        let mut parents: Vec<&Path> = path
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        parents.reverse();
        // Top-down, the same order the walker prunes in.
        if parents.iter().any(|dir| self.matcher.matched(dir, true).is_ignore()) {
            return true;
        }
        self.matcher.matched(path, is_dir).is_ignore()
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }
}

fn split_candidate(candidate: &str) -> (&str, bool) {
    match candidate.strip_suffix('/') {
        Some(stripped) => (stripped, true),
        None => (candidate, false),
    }
}
