//! Event system for harvest runs.
//!
//! Provides hooks for logging and custom reactions around state changes,
//! challenge resolution, listing pages, and harvested items.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::flow::challenge::{ChallengeError, ChallengeOutcome};
use crate::harvester::RunState;

#[derive(Debug, Clone)]
pub struct StateEvent {
    pub from: RunState,
    pub to: RunState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeEvent {
    pub resolver: String,
    pub success: bool,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ChallengeEvent {
    pub fn new(
        resolver: &str,
        outcome: &Result<ChallengeOutcome, ChallengeError>,
    ) -> Self {
        let (success, detail) = match outcome {
            Ok(ChallengeOutcome::Solved { provider }) => (true, format!("solved by {provider}")),
            Ok(ChallengeOutcome::NotPresent) => (true, "no challenge present".to_string()),
            Err(err) => (false, err.to_string()),
        };
        Self {
            resolver: resolver.to_string(),
            success,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Structured listing page event.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub number: usize,
    pub rows: usize,
    pub has_more: bool,
    pub timestamp: DateTime<Utc>,
}

/// Structured harvested item event.
#[derive(Debug, Clone)]
pub struct ItemEvent {
    pub page: usize,
    pub title: String,
    pub filename: String,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub stage: RunState,
    pub kind: &'static str,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum HarvestEvent {
    StateChanged(StateEvent),
    Challenge(ChallengeEvent),
    PageLoaded(PageEvent),
    ItemHarvested(ItemEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &HarvestEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: HarvestEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &HarvestEvent) {
        match event {
            HarvestEvent::StateChanged(change) => {
                log::debug!("state {:?} -> {:?}", change.from, change.to);
            }
            HarvestEvent::Challenge(challenge) => {
                if challenge.success {
                    log::info!("challenge via {}: {}", challenge.resolver, challenge.detail);
                } else {
                    log::error!("challenge via {} failed: {}", challenge.resolver, challenge.detail);
                }
            }
            HarvestEvent::PageLoaded(page) => {
                log::info!(
                    "listing page {} ({} rows, more={})",
                    page.number,
                    page.rows,
                    page.has_more
                );
            }
            HarvestEvent::ItemHarvested(item) => {
                log::debug!("page {} item '{}' -> {}", item.page, item.title, item.filename);
            }
            HarvestEvent::Error(error) => {
                log::error!("{} failed during {:?}: {}", error.kind, error.stage, error.error);
            }
        }
    }
}
