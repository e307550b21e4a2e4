//! Session establishment.
//!
//! Drives the login surface: credentials, the anti-bot widget, the resolver,
//! form submission, and finally the account menu path to the uploads
//! listing. A single attempt; any failure aborts the run.

use crate::config::{Credentials, SiteProfile};
use crate::external_deps::browser::{ClickOptions, PageResult, PageSession};
use crate::modules::events::{ChallengeEvent, EventDispatcher, HarvestEvent};

use super::challenge::{ChallengeOutcome, ChallengeResolver};
use super::error::{HarvestError, HarvestResult};
use super::timing::InteractionTiming;

/// Authenticated browsing context, owned by the orchestrator for one run.
pub struct Session {
    page: Box<dyn PageSession>,
}

impl Session {
    pub fn new(page: Box<dyn PageSession>) -> Self {
        Self { page }
    }

    pub fn page(&mut self) -> &mut dyn PageSession {
        self.page.as_mut()
    }

    /// Tears the browsing context down. Consumes the session so it happens once.
    pub async fn close(mut self) -> PageResult<()> {
        self.page.close().await
    }
}

/// Signs in and lands on the uploads listing.
pub struct SessionEstablisher<'a> {
    site: &'a SiteProfile,
    timing: &'a InteractionTiming,
    resolver: &'a dyn ChallengeResolver,
    events: &'a EventDispatcher,
}

impl<'a> SessionEstablisher<'a> {
    pub fn new(
        site: &'a SiteProfile,
        timing: &'a InteractionTiming,
        resolver: &'a dyn ChallengeResolver,
        events: &'a EventDispatcher,
    ) -> Self {
        Self {
            site,
            timing,
            resolver,
            events,
        }
    }

    pub async fn establish(
        &self,
        page: &mut dyn PageSession,
        credentials: &Credentials,
    ) -> HarvestResult<()> {
        let (username, password) = credentials
            .pair()
            .ok_or_else(|| HarvestError::Precondition("missing username or password".into()))?;

        page.goto(self.site.login_url.as_str()).await?;

        let field = page.locate(&self.site.username_field).await?;
        page.fill(&field, username).await?;
        let field = page.locate(&self.site.password_field).await?;
        page.fill(&field, password).await?;

        let entry = page.locate(&self.site.challenge_entry).await?;
        page.click(
            &entry,
            ClickOptions::with_delay(self.timing.challenge_click_delay()),
        )
        .await?;

        let outcome = self.resolver.resolve(page).await;
        self.events.dispatch(HarvestEvent::Challenge(ChallengeEvent::new(
            self.resolver.name(),
            &outcome,
        )));
        match outcome? {
            ChallengeOutcome::NotPresent => log::warn!("login page presented no challenge"),
            ChallengeOutcome::Solved { provider } => log::info!("challenge solved by {provider}"),
        }

        let submit = page.locate(&self.site.login_submit).await?;
        page.click(&submit, ClickOptions::default()).await?;

        let menu = page.locate(&self.site.account_menu).await?;
        page.click(&menu, ClickOptions::default()).await?;
        let uploads = page.locate(&self.site.uploads_link).await?;
        page.click(&uploads, ClickOptions::default()).await?;

        log::info!(
            "signed in as {username}, listing at {}",
            page.current_url().unwrap_or_default()
        );
        Ok(())
    }
}
