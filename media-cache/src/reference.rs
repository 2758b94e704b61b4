use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const CHUNKED_SCHEME: &str = "chunked://";

/// A media reference as stored in chat messages: either a URL the network
/// stack can fetch directly, or the id of a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaReference {
    Direct(String),
    Chunked(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("media reference is empty")]
    Empty,

    #[error("chunked reference has no file identifier")]
    MissingFileId,
}

impl MediaReference {
    pub fn file_id(&self) -> Option<&str> {
        match self {
            MediaReference::Chunked(id) => Some(id),
            MediaReference::Direct(_) => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, MediaReference::Chunked(_))
    }
}

impl FromStr for MediaReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReferenceError::Empty);
        }
        match s.strip_prefix(CHUNKED_SCHEME) {
            Some("") => Err(ReferenceError::MissingFileId),
            Some(id) => Ok(MediaReference::Chunked(id.to_string())),
            None => Ok(MediaReference::Direct(s.to_string())),
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaReference::Direct(url) => write!(f, "{}", url),
            MediaReference::Chunked(id) => write!(f, "{}{}", CHUNKED_SCHEME, id),
        }
    }
}
