//! # upload-harvester
//!
//! Signs into a document-sharing account through a browser-like session,
//! gets past the login page's anti-bot challenge, walks the paginated
//! uploads listing, and downloads every item (or, in dry-run mode, records
//! what each item would be called).
//!
//! ## Features
//!
//! - Pluggable page automation through [`BrowserEngine`] and [`PageSession`]
//! - Bundled cookie-persistent HTTP engine ([`HttpBrowser`])
//! - reCAPTCHA resolution backed by 2Captcha
//! - Sentinel-terminated pagination with per-page commit of results
//! - Event hooks for state changes, pages, and items
//!
//! ## Example
//!
//! ```no_run
//! use upload_harvester::{Credentials, DownloadMode, UploadHarvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let harvester = UploadHarvester::new();
//!     let credentials = Credentials::new("alice@example.com", "secret");
//!     let report = harvester.run(&credentials, &DownloadMode::DryRun).await;
//!     for record in report.into_result()? {
//!         println!("{} -> {}", record.title, record.filename);
//!     }
//!     Ok(())
//! }
//! ```

mod harvester;

pub mod config;
pub mod external_deps;
pub mod flow;
pub mod modules;

pub use crate::harvester::{HarvestReport, RunState, UploadHarvester, UploadHarvesterBuilder};

pub use crate::config::{ConfigError, Credentials, DownloadMode, HarvestConfig, SiteProfile};

pub use crate::external_deps::browser::{
    BrowserConfig,
    BrowserEngine,
    ClickOptions,
    Download,
    ElementHandle,
    HttpBrowser,
    Locator,
    PageError,
    PageResult,
    PageSession,
};

pub use crate::external_deps::captcha::{
    CaptchaConfig,
    CaptchaError,
    CaptchaProvider,
    CaptchaResult,
    CaptchaSolution,
    CaptchaTask,
    TwoCaptchaProvider,
};

pub use crate::flow::{
    CaptchaChallengeResolver,
    ChallengeError,
    ChallengeOutcome,
    ChallengeResolver,
    HarvestError,
    HarvestRecord,
    HarvestResult,
    InteractionTiming,
};

pub use crate::modules::{
    ChallengeEvent,
    ErrorEvent,
    EventDispatcher,
    EventHandler,
    HarvestEvent,
    ItemEvent,
    LoggingHandler,
    PageEvent,
    StateEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
