/// Language detection and artifact-directory exclusion.
///
/// A file is classified by extension into a supported language or skipped.
/// Build/vendor directories are excluded before any parsing happens:
/// indexing minified artifacts explodes chunk counts and exhausts memory.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Languages with a parser, chunking queries, and a metadata extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    Go,
    TypeScript,
    JavaScript,
}

#[derive(Error, Debug)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(String);

impl Language {
    pub fn all() -> [Language; 5] {
        [
            Language::Python,
            Language::Rust,
            Language::Go,
            Language::TypeScript,
            Language::JavaScript,
        ]
    }

    /// Classify a file by extension. `None` means unsupported: skip the file.
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Language::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "rust" => Ok(Language::Rust),
            "go" => Ok(Language::Go),
            "typescript" => Ok(Language::TypeScript),
            "javascript" => Ok(Language::JavaScript),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// Whether any path component names an excluded build/vendor directory.
pub fn is_excluded(path: &Path, excluded_dirs: &[String]) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| excluded_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
    })
}
