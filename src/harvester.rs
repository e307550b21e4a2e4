//! High level harvest orchestration.
//!
//! Wires the session establisher, listing paginator, and item harvester into
//! one run over a single exclusively owned browsing context, and guarantees
//! that context is torn down on every exit path.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{Credentials, DownloadMode, HarvestConfig, SiteProfile};
use crate::external_deps::browser::{BrowserConfig, BrowserEngine, HttpBrowser};
use crate::external_deps::captcha::CaptchaProvider;
use crate::flow::{
    CaptchaChallengeResolver, ChallengeResolver, HarvestError, HarvestRecord, HarvestResult,
    InteractionTiming, ItemHarvester, ListingPaginator, Session, SessionEstablisher,
};
use crate::modules::events::{
    ErrorEvent, EventDispatcher, EventHandler, HarvestEvent, ItemEvent, LoggingHandler,
    PageEvent, StateEvent,
};

/// Phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Authenticating,
    Listing,
    Harvesting { page: usize },
    Failed,
    Closing,
    Done,
}

/// Outcome of a run: every committed record plus the error that stopped it,
/// if any.
///
/// Records are committed a page at a time, so a failure on page K keeps
/// pages 1 through K-1.
#[derive(Debug)]
pub struct HarvestReport {
    records: Vec<HarvestRecord>,
    error: Option<HarvestError>,
    pages_completed: usize,
}

impl HarvestReport {
    /// Records in listing order.
    pub fn records(&self) -> &[HarvestRecord] {
        &self.records
    }

    pub fn error(&self) -> Option<&HarvestError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn pages_completed(&self) -> usize {
        self.pages_completed
    }

    pub fn into_parts(self) -> (Vec<HarvestRecord>, Option<HarvestError>) {
        (self.records, self.error)
    }

    /// Fails if the run did not finish, discarding partial records.
    pub fn into_result(self) -> HarvestResult<Vec<HarvestRecord>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.records),
        }
    }
}

/// Fluent builder for [`UploadHarvester`].
pub struct UploadHarvesterBuilder {
    config: HarvestConfig,
    browser: Option<Arc<dyn BrowserEngine>>,
    browser_config: BrowserConfig,
    resolver: Option<Arc<dyn ChallengeResolver>>,
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl UploadHarvesterBuilder {
    pub fn new() -> Self {
        Self {
            config: HarvestConfig::default(),
            browser: None,
            browser_config: BrowserConfig::default(),
            resolver: None,
            captcha_provider: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: HarvestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_site_profile(mut self, site: SiteProfile) -> Self {
        self.config.site = site;
        self
    }

    pub fn with_timing(mut self, timing: InteractionTiming) -> Self {
        self.config.timing = timing;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = Some(max_pages.max(1));
        self
    }

    /// Replace the bundled HTTP engine.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserEngine>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Settings for the bundled HTTP engine; ignored when a browser is supplied.
    pub fn with_browser_config(mut self, config: BrowserConfig) -> Self {
        self.browser_config = config;
        self
    }

    /// Replace the captcha-backed resolver entirely.
    pub fn with_challenge_resolver(mut self, resolver: Arc<dyn ChallengeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Provider used by the default resolver.
    pub fn with_captcha_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.captcha_provider = Some(provider);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> UploadHarvester {
        let browser = self
            .browser
            .unwrap_or_else(|| Arc::new(HttpBrowser::new(self.browser_config)));

        let resolver = self.resolver.unwrap_or_else(|| {
            let mut resolver = CaptchaChallengeResolver::new();
            if let Some(provider) = self.captcha_provider {
                resolver = resolver.with_captcha_provider(provider);
            }
            Arc::new(resolver)
        });

        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        for handler in self.handlers {
            events.register_handler(handler);
        }

        UploadHarvester {
            config: self.config,
            browser,
            resolver,
            events,
        }
    }
}

impl Default for UploadHarvesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the current phase and announces every transition.
struct RunTracker<'a> {
    state: RunState,
    events: &'a EventDispatcher,
}

impl<'a> RunTracker<'a> {
    fn new(events: &'a EventDispatcher) -> Self {
        Self {
            state: RunState::Idle,
            events,
        }
    }

    fn transition(&mut self, to: RunState) {
        if self.state == to {
            return;
        }
        self.events.dispatch(HarvestEvent::StateChanged(StateEvent {
            from: self.state,
            to,
            timestamp: Utc::now(),
        }));
        self.state = to;
    }

    fn fail(&mut self, error: &HarvestError) {
        self.events.dispatch(HarvestEvent::Error(ErrorEvent {
            stage: self.state,
            kind: error.kind(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }));
        if self.state == RunState::Authenticating {
            self.transition(RunState::Failed);
        }
    }
}

/// Main harvest orchestrator.
pub struct UploadHarvester {
    config: HarvestConfig,
    browser: Arc<dyn BrowserEngine>,
    resolver: Arc<dyn ChallengeResolver>,
    events: EventDispatcher,
}

impl UploadHarvester {
    /// Orchestrator with the bundled HTTP engine and no captcha provider.
    pub fn new() -> Self {
        UploadHarvesterBuilder::new().build()
    }

    pub fn builder() -> UploadHarvesterBuilder {
        UploadHarvesterBuilder::new()
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Signs in, walks every listing page, and harvests each row in order.
    pub async fn run(&self, credentials: &Credentials, mode: &DownloadMode) -> HarvestReport {
        let mut tracker = RunTracker::new(&self.events);
        let mut records = Vec::new();
        let mut pages_completed = 0;

        tracker.transition(RunState::Authenticating);
        if !credentials.is_complete() {
            log::error!("Missing username or password");
            let err = HarvestError::Precondition("missing username or password".into());
            return Self::abandon(tracker, err);
        }

        match mode {
            DownloadMode::DryRun => log::warn!("Dry run! No files will be downloaded"),
            DownloadMode::Persist(dir) => {
                if let Err(err) = prepare_target(dir).await {
                    return Self::abandon(tracker, err);
                }
            }
        }

        let mut session = match self.browser.launch().await {
            Ok(page) => Session::new(page),
            Err(err) => return Self::abandon(tracker, err.into()),
        };
        log::info!("launched {} browsing context", self.browser.name());

        let outcome = self
            .drive(
                &mut session,
                credentials,
                mode,
                &mut tracker,
                &mut records,
                &mut pages_completed,
            )
            .await;
        if let Err(err) = &outcome {
            tracker.fail(err);
        }

        tracker.transition(RunState::Closing);
        if let Err(err) = session.close().await {
            log::warn!("failed to close browsing context: {err}");
        }
        tracker.transition(RunState::Done);

        log::info!(
            "harvested {} items across {pages_completed} pages",
            records.len()
        );
        HarvestReport {
            records,
            error: outcome.err(),
            pages_completed,
        }
    }

    /// Ends a run that never opened a browsing context.
    fn abandon(mut tracker: RunTracker<'_>, err: HarvestError) -> HarvestReport {
        tracker.fail(&err);
        tracker.transition(RunState::Closing);
        tracker.transition(RunState::Done);
        HarvestReport {
            records: Vec::new(),
            error: Some(err),
            pages_completed: 0,
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        credentials: &Credentials,
        mode: &DownloadMode,
        tracker: &mut RunTracker<'_>,
        records: &mut Vec<HarvestRecord>,
        pages_completed: &mut usize,
    ) -> HarvestResult<()> {
        let site = &self.config.site;
        let timing = &self.config.timing;
        let page = session.page();

        SessionEstablisher::new(site, timing, self.resolver.as_ref(), &self.events)
            .establish(page, credentials)
            .await?;

        let mut paginator = ListingPaginator::new(site, timing).with_max_pages(self.config.max_pages);
        let harvester = ItemHarvester::new(site);

        loop {
            tracker.transition(RunState::Listing);
            let Some(listing) = paginator.next_page(page).await? else {
                break;
            };
            self.events.dispatch(HarvestEvent::PageLoaded(PageEvent {
                number: listing.number,
                rows: listing.rows.len(),
                has_more: listing.next.has_more(),
                timestamp: Utc::now(),
            }));

            tracker.transition(RunState::Harvesting {
                page: listing.number,
            });
            let mut harvested = Vec::with_capacity(listing.rows.len());
            for row in &listing.rows {
                let record = harvester.harvest(page, row, mode).await?;
                self.events.dispatch(HarvestEvent::ItemHarvested(ItemEvent {
                    page: listing.number,
                    title: record.title.clone(),
                    filename: record.filename.clone(),
                    dry_run: mode.is_dry_run(),
                    timestamp: Utc::now(),
                }));
                harvested.push(record);
            }

            records.extend(harvested);
            *pages_completed += 1;
        }

        Ok(())
    }
}

impl Default for UploadHarvester {
    fn default() -> Self {
        Self::new()
    }
}

async fn prepare_target(dir: &Path) -> HarvestResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    let metadata = tokio::fs::metadata(dir).await?;
    if !metadata.is_dir() {
        return Err(HarvestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", dir.display()),
        )));
    }
    Ok(())
}
