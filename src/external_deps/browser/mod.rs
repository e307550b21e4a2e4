//! Page automation boundary.
//!
//! The harvest flow never talks to a rendering engine directly. It drives a
//! [`PageSession`] obtained from a [`BrowserEngine`], addressing elements
//! through [`Locator`] values and the opaque [`ElementHandle`]s they resolve
//! to. [`HttpBrowser`] is the bundled implementation.

mod http_engine;

pub use self::http_engine::{BrowserConfig, HttpBrowser, HttpSession};

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Result alias used by every page automation call.
pub type PageResult<T> = Result<T, PageError>;

/// Failure conditions reported by the page automation engine.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("no element matches {0}")]
    LocatorNotFound(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element handle refers to a page that is no longer loaded")]
    StaleHandle,
    #[error("no page is loaded")]
    NoPage,
    #[error("download failed: {0}")]
    Download(String),
    #[error("unsupported interaction: {0}")]
    Unsupported(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Stable way to address an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector (`#id`, `.class`, attribute selectors, ...).
    Css { selector: String },
    /// Accessible label: `aria-label`, or the text of a `<label for=...>`.
    Label { text: String },
    /// Element living inside an embedded frame.
    InFrame { frame: String, inner: Box<Locator> },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label { text: text.into() }
    }

    pub fn in_frame(frame: impl Into<String>, inner: Locator) -> Self {
        Self::InFrame {
            frame: frame.into(),
            inner: Box::new(inner),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css `{selector}`"),
            Locator::Label { text } => write!(f, "label `{text}`"),
            Locator::InFrame { frame, inner } => write!(f, "{inner} in frame `{frame}`"),
        }
    }
}

/// Where a handle points: a document element, or content inside a frame element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleTarget {
    Element,
    FrameContent(Box<Locator>),
}

/// Opaque reference to an element of one loaded document.
///
/// Handles are only valid for the document generation they were resolved
/// in. Engines reject handles that outlived a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    generation: u64,
    index: usize,
    target: HandleTarget,
}

impl ElementHandle {
    pub fn new(generation: u64, index: usize) -> Self {
        Self {
            generation,
            index,
            target: HandleTarget::Element,
        }
    }

    pub fn frame_content(generation: u64, frame_index: usize, inner: Locator) -> Self {
        Self {
            generation,
            index: frame_index,
            target: HandleTarget::FrameContent(Box::new(inner)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &HandleTarget {
        &self.target
    }
}

/// Options applied to a click.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Pause before the click is dispatched.
    pub delay: Duration,
}

impl ClickOptions {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

/// A completed file transfer staged in a temporary location.
#[derive(Debug)]
pub struct Download {
    suggested_filename: String,
    staged: NamedTempFile,
}

impl Download {
    pub fn new(suggested_filename: impl Into<String>, staged: NamedTempFile) -> Self {
        Self {
            suggested_filename: suggested_filename.into(),
            staged,
        }
    }

    /// Name the server proposed for the file.
    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    /// Copy the staged transfer to `path`.
    pub async fn save_as(&self, path: &Path) -> PageResult<()> {
        tokio::fs::copy(self.staged.path(), path).await?;
        Ok(())
    }

    /// Release the staged transfer.
    pub fn delete(self) -> PageResult<()> {
        self.staged.close()?;
        Ok(())
    }
}

/// Launches isolated browsing contexts.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    fn name(&self) -> &'static str;
    async fn launch(&self) -> PageResult<Box<dyn PageSession>>;
}

/// One live browsing context with a single current page.
///
/// All calls are suspension points; the harvest flow never has two in flight
/// for the same session.
#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str) -> PageResult<()>;

    fn current_url(&self) -> Option<String>;

    /// Counter bumped each time a new document replaces the current page.
    fn generation(&self) -> u64;

    /// Raw markup of the current page.
    async fn content(&mut self) -> PageResult<String>;

    /// First element matching `locator`; `LocatorNotFound` when none does.
    async fn locate(&mut self, locator: &Locator) -> PageResult<ElementHandle>;

    /// Every element matching `locator`, in document order.
    async fn locate_all(&mut self, locator: &Locator) -> PageResult<Vec<ElementHandle>>;

    /// First descendant of `scope` matching `locator`.
    async fn locate_within(
        &mut self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> PageResult<ElementHandle>;

    async fn inner_text(&mut self, element: &ElementHandle) -> PageResult<String>;

    async fn attribute(&mut self, element: &ElementHandle, name: &str)
    -> PageResult<Option<String>>;

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> PageResult<()>;

    async fn click(&mut self, element: &ElementHandle, options: ClickOptions) -> PageResult<()>;

    /// Click `element` and wait for the file transfer it triggers.
    async fn click_for_download(&mut self, element: &ElementHandle) -> PageResult<Download>;

    async fn wait(&mut self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    async fn close(&mut self) -> PageResult<()>;
}
