//! Local trigram index backend
//!
//! Content searches ask the index for candidate files and run the line
//! matcher over each of them. Filename searches are delegated to
//! [`super::filenames`].

use super::filenames;
use super::traits::*;
use crate::config::BackendParams;
use crate::error::{Result, SearchError};
use crate::index::{Grep, IndexEngine, LineFormat, TrigramIndex};
use crate::results::{split_lines, ResultContext, SearchResult};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local index backend
pub struct Csearch {
    name: String,
    index_file: PathBuf,
}

impl Csearch {
    /// Build from backend parameters: `index_file` (required)
    pub fn from_params(name: &str, params: &BackendParams) -> Result<Self> {
        let index_file = params.require_str("index_file")?;
        Ok(Self {
            name: name.to_string(),
            index_file: PathBuf::from(index_file),
        })
    }

    /// Run a content search against an already opened index
    pub fn search_index<I: IndexEngine>(
        &self,
        index: &I,
        re: &Regex,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let grep = Grep::new(re.clone(), LineFormat::NumberOnly);
        let candidates = index.posting_query(re)?;
        debug!("{}: {} candidate files", self.name, candidates.len());

        let mut results = Vec::new();
        for id in candidates {
            let name = index.name(id).ok_or_else(|| {
                SearchError::Parse(format!("index has no file with id {}", id))
            })?;

            let mut out = Vec::new();
            if grep.file(name, &mut out)? == 0 {
                continue;
            }

            let root = resolve_root(index.roots(), name).ok_or_else(|| {
                SearchError::Parse(format!("no indexed path found for {:?}", name))
            })?;
            let relative = relative_path(root, name);
            let repo_url = format!("file://{}", root);
            let file_url = format!("file://{}", name);

            // read once per file, only when context is wanted
            let file_lines = if options.wants_context() {
                Some(read_lines(name)?)
            } else {
                None
            };

            let output = String::from_utf8_lossy(&out);
            for raw in output.split('\n').filter(|l| !l.is_empty()) {
                let m = parse_match_line(raw, grep.format(), Some(name))?;
                let (start, end) = re
                    .find(m.text)
                    .map_or((0, 0), |found| (found.start(), found.end()));

                let mut result =
                    SearchResult::line_match(&self.name, &relative, m.lineno, m.text, start, end)
                        .with_repo(&repo_url, "", root)
                        .with_file_url(&file_url);
                if let Some(lines) = &file_lines {
                    result = result.with_context(ResultContext::around(
                        lines,
                        m.lineno - 1,
                        options.lines_before,
                        options.lines_after,
                    ));
                }
                results.push(result);
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl Backend for Csearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Csearch
    }

    fn supports_context(&self) -> bool {
        true
    }

    fn supports_case_insensitive(&self) -> bool {
        true
    }

    fn supports_filename_search(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let re = compile(query, options.case_insensitive)?;
        let index = TrigramIndex::open(&self.index_file)?;
        debug!(
            "{}: opened {} ({} files)",
            self.name,
            self.index_file.display(),
            index.len()
        );

        if options.filenames_only {
            return Ok(filenames::search(&self.name, &index, &re));
        }
        self.search_index(&index, &re, options)
    }
}

/// Multi-line mode always, case folding on request
pub fn compile(query: &str, case_insensitive: bool) -> Result<Regex> {
    let mut pattern = format!("(?m){}", query);
    if case_insensitive {
        pattern.insert_str(0, "(?i)");
    }
    Ok(Regex::new(&pattern)?)
}

/// One line of matcher output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLine<'a> {
    pub path: Option<&'a str>,
    pub lineno: usize,
    pub text: &'a str,
}

/// Split a matcher output line into its fields. Only the leading fields are
/// split off, so the text keeps any colons it contains. When the path is
/// already known it is stripped literally first, which also handles paths
/// containing colons.
pub fn parse_match_line<'a>(
    line: &'a str,
    format: LineFormat,
    known_path: Option<&str>,
) -> Result<MatchLine<'a>> {
    let malformed = |fields: usize| {
        SearchError::Parse(format!(
            "malformed matcher output: has fewer than {} fields. Line: {:?}",
            fields, line
        ))
    };

    let (path, rest) = match format {
        LineFormat::NumberOnly => (None, line),
        LineFormat::WithPath => {
            let known = known_path.and_then(|known| {
                line.strip_prefix(known)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .map(|rest| (&line[..known.len()], rest))
            });
            match known {
                Some((path, rest)) => (Some(path), rest),
                None => {
                    let mut parts = line.splitn(3, ':');
                    match (parts.next(), parts.next(), parts.next()) {
                        (Some(path), Some(lineno), Some(text)) => {
                            let lineno = parse_lineno(lineno, line)?;
                            return Ok(MatchLine {
                                path: Some(path),
                                lineno,
                                text,
                            });
                        }
                        _ => return Err(malformed(3)),
                    }
                }
            }
        }
    };

    let (lineno, text) = rest.split_once(':').ok_or_else(|| {
        malformed(if path.is_some() { 3 } else { 2 })
    })?;
    Ok(MatchLine {
        path,
        lineno: parse_lineno(lineno, line)?,
        text,
    })
}

fn parse_lineno(field: &str, line: &str) -> Result<usize> {
    match field.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SearchError::Parse(format!(
            "invalid line number {:?} in matcher output {:?}",
            field, line
        ))),
    }
}

/// Indexed root containing `name`, the deepest one when roots nest
pub fn resolve_root<'a>(roots: &'a [String], name: &str) -> Option<&'a str> {
    let path = Path::new(name);
    roots
        .iter()
        .filter(|root| path.starts_with(root.as_str()))
        .max_by_key(|root| Path::new(root.as_str()).components().count())
        .map(|root| root.as_str())
}

fn relative_path(root: &str, name: &str) -> String {
    match Path::new(name).strip_prefix(root) {
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => name.to_string(),
    }
}

fn read_lines(name: &str) -> Result<Vec<String>> {
    let content = std::fs::read(name).map_err(|e| SearchError::filesystem(name, e))?;
    let text = String::from_utf8_lossy(&content);
    Ok(split_lines(&text).into_iter().map(String::from).collect())
}
