//! Free-text search to geographic scope: geocoding, classification, and
//! approximate bounds.

pub mod classify;
pub mod geocoder;
pub mod resolver;
pub mod states;

pub use classify::*;
pub use geocoder::*;
pub use resolver::*;
pub use states::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    Transport(String),
    Status(u16),
    Decode(String),
    QueryTooLong(usize),
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::Transport(msg) => write!(f, "geocoder unreachable: {msg}"),
            ScopeError::Status(code) => write!(f, "geocoder returned HTTP {code}"),
            ScopeError::Decode(msg) => write!(f, "invalid geocoder response: {msg}"),
            ScopeError::QueryTooLong(len) => write!(f, "query too long ({len} bytes)"),
        }
    }
}

impl std::error::Error for ScopeError {}
