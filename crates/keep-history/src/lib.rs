//! Local history for Keep.
//!
//! The [`HistoryStore`] keeps earlier versions ("states") of workspace
//! files. Content goes to a [`BlobStore`](keep_blob::BlobStore); the list
//! of states per path goes to a bucket tree whose values are
//! [`HistoryEntry`]s, newest state first.
//!
//! # Durability
//!
//! Every index mutation is written to a journal (a chunk log) before it is
//! applied in memory. Buckets are saved lazily, so after a crash the store
//! replays the journal on open. Records are plain additions and removals
//! (a copy is journaled state by state), so replaying them is idempotent.
//! `remove_garbage` saves first, so it never deletes a blob whose
//! referencing entry is still only in memory.
//!
//! # Retention
//!
//! [`HistoryPolicy`] bounds the history: states larger than
//! `max_state_size` are refused when added, and [`HistoryStore::clean`]
//! drops states older than `max_age_ms` and keeps at most `max_states`
//! per path.

pub mod codec;
pub mod config;
pub mod error;
pub mod journal;
pub mod state;
pub mod store;

pub use codec::HistoryCodec;
pub use config::{HistoryConfig, HistoryPolicy};
pub use error::{HistoryError, HistoryResult};
pub use journal::{Journal, JournalRecord};
pub use state::{FileState, HistoryEntry};
pub use store::{CleanReport, GcReport, HistoryStore};
