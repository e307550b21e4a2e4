//! Integrations that rely on third-party services.
//!
//! This module groups the page automation engine and the captcha providers
//! that the harvest flow consumes through narrow traits.

pub mod browser;
pub mod captcha;

pub use browser::{BrowserConfig, HttpBrowser};
pub use captcha::TwoCaptchaProvider;
