//! File name search over the roots of a local index

use crate::index::IndexEngine;
use crate::results::SearchResult;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// Walk every indexed root and report the regular files whose base name
/// matches `re`. Files sharing a base name within one root are reported
/// once, the last one walked wins.
pub fn search<I: IndexEngine>(backend: &str, index: &I, re: &Regex) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for root in index.roots() {
        let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let base = entry.file_name().to_string_lossy().into_owned();
            if !re.is_match(&base) {
                continue;
            }
            if let Some(shadowed) = files.insert(base, entry.into_path()) {
                debug!("{} shadowed by a later file of the same name", shadowed.display());
            }
        }

        debug!("{}: {} matching file names under {}", backend, files.len(), root);
        for path in files.into_values() {
            let relative = path
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| path.to_string_lossy().into_owned());

            results.push(
                SearchResult::filename(backend, relative)
                    .with_repo(format!("file://{}", root), "", root)
                    .with_file_url(format!("file://{}", path.display())),
            );
        }
    }

    results
}
