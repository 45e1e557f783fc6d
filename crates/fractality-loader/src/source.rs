use fractality_core::{FractalityError, Result, stable_hash};
use fractality_graph::TestPattern;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a graph comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Pattern(TestPattern),
    Url(String),
    File(PathBuf),
    /// A document already in canonical form.
    Inline(serde_json::Value),
}

impl Source {
    /// Accepts `test:<pattern>`, a bare pattern name, an `http(s)://` URL,
    /// `file://<path>` or a filesystem path.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(FractalityError::SourceInvalid(
                "empty source descriptor".to_string(),
            ));
        }
        if let Some(pattern) = descriptor.strip_prefix("test:") {
            return Ok(Source::Pattern(pattern.parse()?));
        }
        if descriptor.starts_with("http://") || descriptor.starts_with("https://") {
            return Ok(Source::Url(descriptor.to_string()));
        }
        if let Some(path) = descriptor.strip_prefix("file://") {
            return Ok(Source::File(PathBuf::from(path)));
        }
        if let Ok(pattern) = descriptor.parse::<TestPattern>() {
            return Ok(Source::Pattern(pattern));
        }
        if descriptor.contains("://") {
            return Err(FractalityError::SourceInvalid(format!(
                "unsupported scheme in '{descriptor}'"
            )));
        }
        Ok(Source::File(PathBuf::from(descriptor)))
    }

    /// Cache key. Inline documents are keyed by a hash of their text.
    pub fn key(&self) -> String {
        match self {
            Source::Pattern(pattern) => format!("test:{pattern}"),
            Source::Url(url) => url.clone(),
            Source::File(path) => format!("file://{}", path.display()),
            Source::Inline(value) => format!("inline:{:016x}", stable_hash(&value.to_string())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Source {
    type Err = FractalityError;

    fn from_str(s: &str) -> Result<Self> {
        Source::parse(s)
    }
}

impl From<TestPattern> for Source {
    fn from(pattern: TestPattern) -> Self {
        Source::Pattern(pattern)
    }
}

impl From<serde_json::Value> for Source {
    fn from(value: serde_json::Value) -> Self {
        Source::Inline(value)
    }
}
