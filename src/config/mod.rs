//! Run configuration.
//!
//! Provides:
//! - `Credentials` and the `DownloadMode` chosen once per run
//! - `SiteProfile`, every URL and locator the flow touches (JSON loadable)
//! - `HarvestConfig`, the settings the orchestrator builder assembles

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::external_deps::browser::Locator;
use crate::flow::timing::InteractionTiming;

const SLIDESHARE_LOGIN_URL: &str = "https://www.slideshare.net/login/email";

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid site profile: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Account used to sign in.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Both fields present and non-empty.
    pub fn is_complete(&self) -> bool {
        let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.username) && present(&self.password)
    }

    pub(crate) fn pair(&self) -> Option<(&str, &str)> {
        if !self.is_complete() {
            return None;
        }
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What happens to each listed item. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadMode {
    /// Download every item into the directory.
    Persist(PathBuf),
    /// Touch nothing; record the item's delete identifier plus `.pdf`. The
    /// resulting names approximate, and may differ from, what a real
    /// download would be called.
    DryRun,
}

impl DownloadMode {
    /// `Persist` when a directory is given, `DryRun` otherwise.
    pub fn from_target(target: Option<PathBuf>) -> Self {
        match target {
            Some(dir) => Self::Persist(dir),
            None => Self::DryRun,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Where the account's pages live and how to find things on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub login_url: Url,
    pub username_field: Locator,
    pub password_field: Locator,
    /// Visible entry point of the anti-bot widget.
    pub challenge_entry: Locator,
    pub login_submit: Locator,
    pub account_menu: Locator,
    pub uploads_link: Locator,
    pub listing_row: Locator,
    pub row_title: Locator,
    pub row_download: Locator,
    pub row_delete: Locator,
    pub delete_id_attribute: String,
    pub next_page: Locator,
}

impl SiteProfile {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            login_url: Url::parse(SLIDESHARE_LOGIN_URL).expect("invalid default login url"),
            username_field: Locator::css("#user_login"),
            password_field: Locator::css("#user_password"),
            challenge_entry: Locator::in_frame(
                r#"iframe[title="reCAPTCHA"]"#,
                Locator::css("#recaptcha-anchor-label"),
            ),
            login_submit: Locator::css("#login_from_loginpage"),
            account_menu: Locator::css(r#"div[data-cy="user-dropdown-trigger"]"#),
            uploads_link: Locator::css(r#"div[data-cy="edit-my-uploads-link"]"#),
            listing_row: Locator::css(".my-upload-row"),
            row_title: Locator::css(".title-container"),
            row_download: Locator::label("Download slideshow"),
            row_delete: Locator::label("Delete slideshow"),
            delete_id_attribute: "data-delete-id".to_string(),
            next_page: Locator::css(".next_page a"),
        }
    }
}

/// Settings the orchestrator is built with.
#[derive(Debug, Clone, Default)]
pub struct HarvestConfig {
    pub site: SiteProfile,
    pub timing: InteractionTiming,
    /// Upper bound on listing pages visited; `None` walks until the sentinel.
    pub max_pages: Option<usize>,
}
