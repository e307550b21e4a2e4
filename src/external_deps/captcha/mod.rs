//! Captcha provider integrations.
//!
//! Providers turn a reCAPTCHA v2 site key and the page it guards into a
//! response token. The challenge resolver only sees [`CaptchaProvider`].

mod twocaptcha;

pub use twocaptcha::TwoCaptchaProvider;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Solving budget shared by every provider.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Give up once a task has been pending this long.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// A reCAPTCHA widget found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaTask {
    pub site_key: String,
    pub page_url: Url,
    /// Widget rendered with `data-size="invisible"`.
    pub invisible: bool,
}

impl CaptchaTask {
    pub fn new(site_key: impl Into<String>, page_url: Url) -> Self {
        Self {
            site_key: site_key.into(),
            page_url,
            invisible: false,
        }
    }

    pub fn invisible(mut self, invisible: bool) -> Self {
        self.invisible = invisible;
        self
    }
}

/// Token that satisfies a [`CaptchaTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaSolution {
    pub token: String,
    /// How long the site accepts the token after it was issued.
    pub valid_for: Option<Duration>,
    /// Provider-side identifier, for reporting bad solutions.
    pub task_id: Option<String>,
}

impl CaptchaSolution {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            valid_for: None,
            task_id: None,
        }
    }

    pub fn valid_for(mut self, ttl: Duration) -> Self {
        self.valid_for = Some(ttl);
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

pub type CaptchaResult = Result<CaptchaSolution, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult;
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha provider misconfigured: {0}")]
    Configuration(String),
    #[error("captcha provider unreachable: {0}")]
    Transport(String),
    #[error("captcha solving timed out after {0:?}")]
    Timeout(Duration),
    #[error("captcha provider rejected the task: {0}")]
    Rejected(String),
}
