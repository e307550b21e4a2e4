//! Supporting infrastructure shared by the orchestrator and the flow.

pub mod events;

pub use events::{
    ChallengeEvent, ErrorEvent, EventDispatcher, EventHandler, HarvestEvent, ItemEvent,
    LoggingHandler, PageEvent, StateEvent,
};
