//! Result type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single code match, normalized across backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Backend that produced this result
    pub backend: String,
    /// The matched line, without its line terminator
    pub line: String,
    /// 1-based line number in the source file (0 for filename matches)
    pub lineno: usize,
    /// Lines surrounding the match
    #[serde(default)]
    pub context: ResultContext,
    /// Highlighted byte span within `line`
    #[serde(default)]
    pub highlight: Highlight,
    /// Path relative to the repository or indexed root
    pub path: String,
    /// Repository URL
    pub repo_url: String,
    /// Direct link to the file, optionally anchored at the line
    pub file_url: String,
    /// Owner or namespace of the repository
    pub owner: String,
    /// Repository name
    pub repo_name: String,
    /// Branch or ref the match was found on
    pub branch: String,
    /// The match is against the file name, not its content
    pub is_filename: bool,
}

impl SearchResult {
    /// Create a content match. The highlight is clamped to the line.
    pub fn line_match(
        backend: impl Into<String>,
        path: impl Into<String>,
        lineno: usize,
        line: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        let line = line.into();
        let highlight = Highlight::within(&line, start, end);
        Self {
            backend: backend.into(),
            line,
            lineno,
            context: ResultContext::default(),
            highlight,
            path: path.into(),
            repo_url: String::new(),
            file_url: String::new(),
            owner: String::new(),
            repo_name: String::new(),
            branch: String::new(),
            is_filename: false,
        }
    }

    /// Create a match against the file name only
    pub fn filename(backend: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            line: String::new(),
            lineno: 0,
            context: ResultContext::default(),
            highlight: Highlight::default(),
            path: path.into(),
            repo_url: String::new(),
            file_url: String::new(),
            owner: String::new(),
            repo_name: String::new(),
            branch: String::new(),
            is_filename: true,
        }
    }

    /// Attach repository coordinates
    pub fn with_repo(
        mut self,
        repo_url: impl Into<String>,
        owner: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        self.repo_url = repo_url.into();
        self.owner = owner.into();
        self.repo_name = repo_name.into();
        self
    }

    pub fn with_file_url(mut self, file_url: impl Into<String>) -> Self {
        self.file_url = file_url.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Attach context lines. Ignored for filename matches.
    pub fn with_context(mut self, context: ResultContext) -> Self {
        if !self.is_filename {
            self.context = context;
        }
        self
    }

    /// The highlighted part of the line
    pub fn highlighted(&self) -> &str {
        self.line
            .get(self.highlight.start..self.highlight.end)
            .unwrap_or_default()
    }
}

/// Byte span `[start, end)` relative to the matched line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
}

impl Highlight {
    /// Build a span guaranteed to satisfy `start <= end <= line.len()` and to
    /// fall on character boundaries.
    pub fn within(line: &str, start: usize, end: usize) -> Self {
        let end = floor_char_boundary(line, end.min(line.len()));
        let start = floor_char_boundary(line, start.min(end));
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Lines immediately before and after a match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultContext {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

impl ResultContext {
    /// Slice the context around the 0-based line `idx`, clipped at both ends
    /// of `lines`. The matched line itself is never included.
    pub fn around<S: AsRef<str>>(lines: &[S], idx: usize, before: usize, after: usize) -> Self {
        let idx = idx.min(lines.len());
        let start = idx.saturating_sub(before);
        let after_start = idx.saturating_add(1).min(lines.len());
        let after_end = idx
            .saturating_add(1)
            .saturating_add(after)
            .min(lines.len());

        Self {
            before: lines[start..idx]
                .iter()
                .map(|l| l.as_ref().to_string())
                .collect(),
            after: lines[after_start..after_end]
                .iter()
                .map(|l| l.as_ref().to_string())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Split text into lines on `\n`, dropping the empty piece a trailing
/// newline leaves behind. Line indexes match newline counts.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Per-backend timing information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timing {
    /// Backend name
    pub backend: String,
    /// Wall time spent in the backend's search
    pub duration: Duration,
    /// Number of results kept after sorting and capping
    pub result_count: usize,
}

impl Timing {
    pub fn time_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
