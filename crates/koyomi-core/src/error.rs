//! Error types for the playback core

use crate::types::{FaultCategory, ResolutionTier, SessionState};
use thiserror::Error;

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Playback error types
#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("Rendering surface unavailable: {0}")]
    Mount(String),

    #[error("Invalid session state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("Session is not ready")]
    NotReady,

    // Stream errors
    #[error("Stream fault ({category}), playback halted")]
    StreamFault { category: FaultCategory },

    #[error("Failed to fetch playlist: {0}")]
    PlaylistFetch(String),

    #[error("Failed to parse playlist: {0}")]
    PlaylistParse(String),

    #[error("No variant in playlist for tier {0}")]
    NoVariantForTier(ResolutionTier),

    // Overlay errors
    #[error("Overlay track failed to load: {0}")]
    OverlayLoad(String),

    // Resolution switch errors
    #[error("Resolution switch to {requested} aborted, staying at {prior}")]
    SwitchAborted {
        requested: ResolutionTier,
        prior: ResolutionTier,
    },

    #[error("Resolution switch to {requested} superseded by a newer request")]
    SwitchSuperseded { requested: ResolutionTier },

    // Backend errors
    #[error("Backend request failed with status {status}: {url}")]
    Backend { status: u16, url: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Returns true if this error halts playback when surfaced to the host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Mount(_) | Error::StreamFault { .. })
    }

    /// Classifies the error for the stream recovery policy.
    pub fn fault_category(&self) -> FaultCategory {
        match self {
            Error::PlaylistFetch(_) | Error::Network(_) | Error::Backend { .. } => {
                FaultCategory::Network
            }
            Error::PlaylistParse(_) | Error::NoVariantForTier(_) => FaultCategory::Media,
            Error::StreamFault { category } => *category,
            _ => FaultCategory::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Mount("no surface".into()).is_fatal());
        assert!(Error::StreamFault {
            category: FaultCategory::Network
        }
        .is_fatal());
        assert!(!Error::OverlayLoad("404".into()).is_fatal());
        assert!(!Error::SwitchAborted {
            requested: ResolutionTier::P720,
            prior: ResolutionTier::P1080,
        }
        .is_fatal());
    }

    #[test]
    fn test_fault_category() {
        assert_eq!(
            Error::PlaylistFetch("404".into()).fault_category(),
            FaultCategory::Network
        );
        assert_eq!(
            Error::PlaylistParse("bad tag".into()).fault_category(),
            FaultCategory::Media
        );
        assert_eq!(
            Error::NotReady.fault_category(),
            FaultCategory::Unknown
        );
    }
}
