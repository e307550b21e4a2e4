//! Challenge resolver adapter.
//!
//! Detects a pending reCAPTCHA on the current page, delegates solving to a
//! configurable captcha provider, and injects the returned token into the
//! page's response field so the login form carries it.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

use crate::external_deps::browser::{Locator, PageError, PageSession};
use crate::external_deps::captcha::{CaptchaError, CaptchaProvider, CaptchaTask};

const RESPONSE_FIELD: &str = r#"#g-recaptcha-response, textarea[name="g-recaptcha-response"]"#;

/// Result of a resolution attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Nothing on the page asked for verification.
    NotPresent,
    Solved { provider: &'static str },
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("challenge present but no captcha provider configured")]
    ProviderMissing,
    #[error("captcha provider {provider} failed: {source}")]
    Captcha {
        provider: &'static str,
        #[source]
        source: CaptchaError,
    },
    #[error("page has no field to receive the challenge response")]
    ResponseFieldMissing,
    #[error("page url unavailable: {0}")]
    PageUrl(String),
    #[error("page error while resolving challenge: {0}")]
    Page(#[from] PageError),
}

/// Clears whatever interactive verification the current page presents.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, page: &mut dyn PageSession) -> Result<ChallengeOutcome, ChallengeError>;
}

/// Resolver backed by a [`CaptchaProvider`] (2captcha by default).
#[derive(Clone, Default)]
pub struct CaptchaChallengeResolver {
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
}

impl CaptchaChallengeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_captcha_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.captcha_provider = Some(provider);
        self
    }

    /// Extracts the reCAPTCHA description from page markup, if any.
    pub fn detect(markup: &str, page_url: Url) -> Option<CaptchaTask> {
        let site_key = SITEKEY_ATTR_RE
            .captures(markup)
            .or_else(|| ANCHOR_FRAME_RE.captures(markup))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())?;

        Some(CaptchaTask::new(site_key, page_url).invisible(INVISIBLE_RE.is_match(markup)))
    }
}

#[async_trait]
impl ChallengeResolver for CaptchaChallengeResolver {
    fn name(&self) -> &'static str {
        "captcha"
    }

    async fn resolve(&self, page: &mut dyn PageSession) -> Result<ChallengeOutcome, ChallengeError> {
        let markup = page.content().await?;
        let current = page
            .current_url()
            .ok_or_else(|| ChallengeError::PageUrl("no page loaded".into()))?;
        let page_url = Url::parse(&current).map_err(|err| ChallengeError::PageUrl(err.to_string()))?;

        let Some(task) = Self::detect(&markup, page_url) else {
            log::debug!("no reCAPTCHA detected on {current}");
            return Ok(ChallengeOutcome::NotPresent);
        };

        let provider = self
            .captcha_provider
            .as_ref()
            .ok_or(ChallengeError::ProviderMissing)?;

        log::info!("solving reCAPTCHA {} via {}", task.site_key, provider.name());
        let solution = provider
            .solve(&task)
            .await
            .map_err(|source| ChallengeError::Captcha {
                provider: provider.name(),
                source,
            })?;

        let field = match page.locate(&Locator::css(RESPONSE_FIELD)).await {
            Ok(field) => field,
            Err(PageError::LocatorNotFound(_)) => return Err(ChallengeError::ResponseFieldMissing),
            Err(err) => return Err(err.into()),
        };
        page.fill(&field, &solution.token).await?;

        Ok(ChallengeOutcome::Solved {
            provider: provider.name(),
        })
    }
}

static SITEKEY_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"data-sitekey=['"]([0-9A-Za-z_-]{10,})['"]"#)
        .case_insensitive(true)
        .build()
        .expect("invalid recaptcha site key regex")
});

static ANCHOR_FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"recaptcha/(?:api2|enterprise)/anchor\?(?:[^'"]*?[&;])?k=([0-9A-Za-z_-]{10,})"#)
        .case_insensitive(true)
        .build()
        .expect("invalid recaptcha anchor regex")
});

static INVISIBLE_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"data-size=['"]invisible['"]"#)
        .case_insensitive(true)
        .build()
        .expect("invalid recaptcha size regex")
});
