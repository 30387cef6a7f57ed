use std::fmt;

use anyhow::{bail, Result};

/// A `/`-separated location in the store tree. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Leading and trailing slashes are ignored; empty segments are not.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.trim().is_empty() {
                bail!("store path '{path}' contains an empty segment");
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn child(&self, key: &str) -> Result<Self> {
        if key.is_empty() || key.contains('/') {
            bail!("invalid store key '{key}'");
        }
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// A change at one path is visible from the other when either is an
    /// ancestor of (or equal to) the other.
    pub fn is_related(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
