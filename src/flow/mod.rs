//! Session establishment and paginated harvest, the pieces the orchestrator
//! composes into a run.

pub mod challenge;
pub mod error;
pub mod item;
pub mod paginator;
pub mod session;
pub mod timing;
pub mod types;

pub use challenge::{CaptchaChallengeResolver, ChallengeError, ChallengeOutcome, ChallengeResolver};
pub use error::{HarvestError, HarvestResult};
pub use item::ItemHarvester;
pub use paginator::ListingPaginator;
pub use session::{Session, SessionEstablisher};
pub use timing::InteractionTiming;
pub use types::{
    DRY_RUN_EXTENSION, HarvestRecord, ItemRow, ListingPage, NEXT_PAGE_SENTINEL, NextPage,
    RowHandle,
};
