//! Tracking backend selection from a URI
//!
//! `memory:` selects a fresh in-process store; `file:<dir>` or a bare path
//! selects a directory store. Binaries read the URI from
//! `HOUSING_TRACKING_URI`.

use crate::errors::{Result, TrackingError};
use crate::memory::InMemoryTracking;
use crate::storage::FileTracking;
use crate::tracking::TrackingClient;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Environment variable naming the tracking backend
pub const TRACKING_URI_ENV: &str = "HOUSING_TRACKING_URI";

/// Backend used when the environment does not name one
pub const DEFAULT_TRACKING_URI: &str = "file:./mlruns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    Memory,
    File(PathBuf),
}

impl FromStr for TrackingUri {
    type Err = TrackingError;

    fn from_str(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(TrackingError::InvalidTrackingUri(uri.to_string()));
        }
        if uri == "memory" || uri == "memory:" {
            return Ok(TrackingUri::Memory);
        }

        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
            .unwrap_or(uri);
        if path.is_empty() || path.contains("://") {
            return Err(TrackingError::InvalidTrackingUri(uri.to_string()));
        }
        Ok(TrackingUri::File(PathBuf::from(path)))
    }
}

impl TrackingUri {
    /// URI from `HOUSING_TRACKING_URI`, or the default directory store
    pub fn from_env() -> Result<Self> {
        std::env::var(TRACKING_URI_ENV)
            .unwrap_or_else(|_| DEFAULT_TRACKING_URI.to_string())
            .parse()
    }

    pub fn open(&self) -> Result<Arc<dyn TrackingClient>> {
        let client: Arc<dyn TrackingClient> = match self {
            TrackingUri::Memory => Arc::new(InMemoryTracking::new()),
            TrackingUri::File(root) => Arc::new(FileTracking::open(root)?),
        };
        info!("Tracking URI: {}", client.tracking_uri());
        Ok(client)
    }
}

/// Open the backend named by the environment
pub fn open_from_env() -> Result<Arc<dyn TrackingClient>> {
    TrackingUri::from_env()?.open()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracking_uris() {
        assert_eq!("memory:".parse::<TrackingUri>().unwrap(), TrackingUri::Memory);
        assert_eq!(
            "file:./mlruns".parse::<TrackingUri>().unwrap(),
            TrackingUri::File(PathBuf::from("./mlruns"))
        );
        assert_eq!(
            "file:///tmp/runs".parse::<TrackingUri>().unwrap(),
            TrackingUri::File(PathBuf::from("/tmp/runs"))
        );
        assert_eq!(
            "/srv/mlruns".parse::<TrackingUri>().unwrap(),
            TrackingUri::File(PathBuf::from("/srv/mlruns"))
        );
        assert!("".parse::<TrackingUri>().is_err());
        assert!("sqlite:///mlflow.db".parse::<TrackingUri>().is_err());
    }

    #[test]
    fn test_open_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let client = TrackingUri::File(dir.path().join("store")).open().unwrap();
        assert!(client.tracking_uri().starts_with("file:"));
        assert!(dir.path().join("store/runs").is_dir());
    }
}
