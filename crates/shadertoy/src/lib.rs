mod cache;
mod document;
mod remote;

pub use cache::{BlobCache, BlobOrigin, CacheKey, CachedBlob, Fetch, FetchError};
pub use document::{
    parse, ContentDefinition, FilterMode, ParseError, ResourceBinding, SamplerConfig,
    ShaderMetadata, WrapMode, CHANNEL_COUNT,
};
pub use remote::{ShadertoyClient, ShadertoyConfig};

use std::fmt;
use std::str::FromStr;

/// Longest identifier accepted from the candidate list. Shadertoy ids are six
/// characters today; anything well past that is a typo, not an id.
pub const MAX_ID_LEN: usize = 16;

/// Opaque token naming one Shadertoy shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentIdError {
    #[error("shader id must not be empty")]
    Empty,
    #[error("shader id '{0}' is longer than {max} characters", max = MAX_ID_LEN)]
    TooLong(String),
    #[error("shader id '{id}' contains unsupported character {ch:?}")]
    InvalidChar { id: String, ch: char },
}

impl ContentId {
    /// Accepts a bare id, a `shadertoy://` handle, or a shadertoy.com view URL.
    ///
    /// Over-long ids are rejected rather than truncated, and only ASCII
    /// alphanumerics, `-` and `_` are allowed so the id can name a cache file.
    pub fn parse(input: &str) -> Result<Self, ContentIdError> {
        let trimmed = input.trim();
        let candidate = if let Some(rest) = trimmed.strip_prefix("shadertoy://") {
            rest.trim()
        } else if trimmed.contains("shadertoy.com") {
            trimmed
                .split(&['?', '#'][..])
                .next()
                .unwrap_or(trimmed)
                .split('/')
                .rev()
                .find(|segment| !segment.is_empty())
                .unwrap_or("")
        } else {
            trimmed
        };

        if candidate.is_empty() {
            return Err(ContentIdError::Empty);
        }
        if candidate.chars().count() > MAX_ID_LEN {
            return Err(ContentIdError::TooLong(candidate.to_string()));
        }
        if let Some(ch) = candidate
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_'))
        {
            return Err(ContentIdError::InvalidChar {
                id: candidate.to_string(),
                ch,
            });
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
