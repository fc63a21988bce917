//! Trigram index stored as a JSON artifact

use super::{FileId, IndexEngine};
use crate::error::{Result, SearchError};
use regex::Regex;
use regex_syntax::hir::literal::Extractor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const FORMAT_VERSION: u32 = 1;

/// Files larger than this are not indexed
const MAX_FILE_SIZE: u64 = 1 << 20;

/// Mapping from 3-byte substrings to the files containing them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrigramIndex {
    version: u32,
    roots: Vec<String>,
    files: Vec<String>,
    postings: BTreeMap<u32, Vec<FileId>>,
}

fn pack(t: &[u8]) -> u32 {
    (u32::from(t[0]) << 16) | (u32::from(t[1]) << 8) | u32::from(t[2])
}

impl TrigramIndex {
    /// Index every text file under `roots`
    pub fn build<P: AsRef<Path>>(roots: &[P]) -> Result<Self> {
        let mut index = Self {
            version: FORMAT_VERSION,
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for root in roots {
            let root = root.as_ref();
            let root = std::fs::canonicalize(root).map_err(|e| SearchError::filesystem(root, e))?;
            let root_name = root.to_string_lossy().into_owned();
            if index.roots.contains(&root_name) {
                continue;
            }
            info!("Indexing {}", root_name);
            index.roots.push(root_name);

            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.path().to_string_lossy().into_owned();
                if seen.insert(name.clone()) {
                    index.add_file(entry.path(), name);
                }
            }
        }

        info!(
            "Indexed {} files, {} trigrams",
            index.files.len(),
            index.postings.len()
        );
        Ok(index)
    }

    fn add_file(&mut self, path: &Path, name: String) {
        match path.metadata() {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                debug!("Skipping large file {}", name);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                return;
            }
        }

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                return;
            }
        };
        if content.contains(&0) || std::str::from_utf8(&content).is_err() {
            debug!("Skipping binary file {}", name);
            return;
        }

        let id = self.files.len() as FileId;
        self.files.push(name);

        let mut trigrams = HashSet::new();
        for window in content.windows(3) {
            let t = pack(window);
            if trigrams.insert(t) {
                self.postings.entry(t).or_default().push(id);
            }
        }
    }

    /// Write the index artifact
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SearchError::filesystem(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| SearchError::filesystem(path, e.into()))?;
        writer.flush().map_err(|e| SearchError::filesystem(path, e))
    }

    /// Open an index artifact
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SearchError::filesystem(path, e))?;
        let index: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            SearchError::Parse(format!("invalid index file {}: {}", path.display(), e))
        })?;
        if index.version != FORMAT_VERSION {
            return Err(SearchError::Parse(format!(
                "index file {} has unsupported version {}",
                path.display(),
                index.version
            )));
        }
        Ok(index)
    }

    /// Number of indexed files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn all_files(&self) -> Vec<FileId> {
        (0..self.files.len() as FileId).collect()
    }

    /// Files containing every trigram of `literal`, `None` when the literal
    /// is too short to prune anything
    fn files_with(&self, literal: &[u8]) -> Option<Vec<FileId>> {
        if literal.len() < 3 {
            return None;
        }

        let mut result: Option<Vec<FileId>> = None;
        for window in literal.windows(3) {
            let Some(posting) = self.postings.get(&pack(window)) else {
                return Some(Vec::new());
            };
            result = Some(match result {
                None => posting.clone(),
                Some(current) => current
                    .into_iter()
                    .filter(|id| posting.binary_search(id).is_ok())
                    .collect(),
            });
        }
        result
    }
}

impl IndexEngine for TrigramIndex {
    fn roots(&self) -> &[String] {
        &self.roots
    }

    fn name(&self, id: FileId) -> Option<&str> {
        self.files.get(id as usize).map(|s| s.as_str())
    }

    fn posting_query(&self, re: &Regex) -> Result<Vec<FileId>> {
        // Every match starts with one of the extracted prefix literals, so a
        // candidate file must contain at least one of them.
        let hir = match regex_syntax::Parser::new().parse(re.as_str()) {
            Ok(hir) => hir,
            Err(e) => {
                debug!("Cannot analyse pattern {:?}: {}", re.as_str(), e);
                return Ok(self.all_files());
            }
        };
        let seq = Extractor::new().extract(&hir);
        let Some(literals) = seq.literals() else {
            return Ok(self.all_files());
        };

        let mut candidates = BTreeSet::new();
        for literal in literals {
            match self.files_with(literal.as_bytes()) {
                Some(ids) => candidates.extend(ids),
                None => return Ok(self.all_files()),
            }
        }
        Ok(candidates.into_iter().collect())
    }
}
