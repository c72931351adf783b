//! Roster model and rendering for Courtside.
//!
//! This crate holds everything about the weekly roster that does not touch
//! the network:
//!
//! - **Types**: sign-ups, the confirmed/waitlist split, cancellation records
//! - **Week**: the upcoming-Sunday anchor that scopes a week's state
//! - **Fetcher**: turns raw sheet rows into a [`Roster`] via [`RosterSource`]
//! - **Render**: deterministic message text for each channel role

mod error;
mod fetcher;
pub mod render;
mod types;
pub mod week;

pub use error::FetchError;
pub use fetcher::{RosterSource, fetch_roster, select_signups};
pub use render::{
    DEFAULT_REASON, MAX_REASON_CHARS, MESSAGE_LIMIT, clip_reason, render_announcement, render_roster,
};
pub use types::{CAPACITY, CancellationRecord, Roster, SheetRow, SignUp};
pub use week::next_sunday;
