//! Error taxonomy surfaced by a harvest run.

use thiserror::Error;

use crate::config::ConfigError;
use crate::external_deps::browser::PageError;

use super::challenge::ChallengeError;

/// Result alias used across the harvest flow.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Everything that can stop a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Missing credentials. Reported before any browsing context exists.
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("challenge unresolved: {0}")]
    ChallengeUnresolved(#[from] ChallengeError),
    #[error("expected element missing: {0}")]
    LocatorNotFound(String),
    #[error("navigation error: {0}")]
    Navigation(String),
    #[error("download error: {0}")]
    Download(String),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("page automation error: {0}")]
    Page(PageError),
}

impl HarvestError {
    /// Short label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Precondition(_) => "precondition",
            HarvestError::ChallengeUnresolved(_) => "challenge_unresolved",
            HarvestError::LocatorNotFound(_) => "locator_not_found",
            HarvestError::Navigation(_) => "navigation",
            HarvestError::Download(_) => "download",
            HarvestError::Configuration(_) => "configuration",
            HarvestError::Io(_) => "io",
            HarvestError::Page(_) => "page",
        }
    }
}

impl From<PageError> for HarvestError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::LocatorNotFound(what) => HarvestError::LocatorNotFound(what),
            PageError::Navigation(reason) => HarvestError::Navigation(reason),
            PageError::Download(reason) => HarvestError::Download(reason),
            PageError::Io(err) => HarvestError::Io(err),
            other => HarvestError::Page(other),
        }
    }
}
