//! Streaming line matcher

use crate::error::{Result, SearchError};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

/// Shape of each emitted match line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `<lineno>:<text>`
    NumberOnly,
    /// `<path>:<lineno>:<text>`
    WithPath,
}

/// Writes every line of a file matching a pattern, one per output line
#[derive(Debug, Clone)]
pub struct Grep {
    regex: Regex,
    format: LineFormat,
}

impl Grep {
    pub fn new(regex: Regex, format: LineFormat) -> Self {
        Self { regex, format }
    }

    pub fn format(&self) -> LineFormat {
        self.format
    }

    /// Scan `path` and write its matching lines to `out`. Returns the number
    /// of lines written.
    pub fn file<W: Write>(&self, path: &str, out: &mut W) -> Result<usize> {
        let file = File::open(path).map_err(|e| SearchError::filesystem(path, e))?;
        let reader = BufReader::new(file);
        let mut count = 0;

        for (idx, line) in reader.split(b'\n').enumerate() {
            let line = line.map_err(|e| SearchError::filesystem(path, e))?;
            let text = String::from_utf8_lossy(&line);
            if !self.regex.is_match(&text) {
                continue;
            }

            let written = match self.format {
                LineFormat::NumberOnly => writeln!(out, "{}:{}", idx + 1, text),
                LineFormat::WithPath => writeln!(out, "{}:{}:{}", path, idx + 1, text),
            };
            written.map_err(|e| SearchError::filesystem(path, e))?;
            count += 1;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_grep_formats() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "first\nkey: value\nlast key\n").unwrap();
        let path = file.to_str().unwrap();

        let grep = Grep::new(Regex::new("(?m)key").unwrap(), LineFormat::NumberOnly);
        let mut out = Vec::new();
        assert_eq!(grep.file(path, &mut out).unwrap(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "2:key: value\n3:last key\n");

        let grep = Grep::new(Regex::new("(?m)^first$").unwrap(), LineFormat::WithPath);
        let mut out = Vec::new();
        grep.file(path, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}:1:first\n", path));
    }

    #[test]
    fn test_grep_missing_file() {
        let grep = Grep::new(Regex::new("x").unwrap(), LineFormat::NumberOnly);
        let err = grep.file("/definitely/not/here", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, SearchError::Filesystem { .. }));
    }
}
