//! Client-side session against the job server.
//!
//! A session owns the record list of the last search together with the
//! parse and spreadsheet job state. [`SessionController`] is the only
//! writer; each poll task hands its snapshots to the controller.

pub mod backend;
pub mod controller;
pub mod guard;
pub mod poll;
pub mod state;
pub mod store;

pub use backend::{Backend, HttpBackend};
pub use controller::{Completion, ExcelTicket, ParseTicket, SearchOutcome, SessionController};
pub use guard::NavigationGuard;
pub use poll::{PollTask, PollUpdate, DEFAULT_POLL_INTERVAL};
pub use state::{ExcelState, KeywordPlan, ParseState, Progress, SearchForm, StorageConfig, View};
pub use store::RecordStore;
