//! Live cricket scoring engine
//!
//! Ball-by-ball delivery ledger with a deterministic match state projection.
//!
//! # Architecture
//!
//! - **Event Sourcing**: Innings state is a fold over immutable ledger entries
//! - **Single Writer**: One actor per match serializes every write
//! - **Atomic Commits**: Record, entries and snapshot land in one RocksDB batch
//! - **Published Views**: Readers see the state before or after a write, never between
//!
//! # Invariants
//!
//! - Run conservation: Σ(batter runs) + extras == innings total
//! - Deterministic replay: Same entries → same snapshot
//! - Append-only: Entries never modified or deleted; corrections are tombstones
//! - Rejected submissions leave the ledger unchanged

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod projector;
pub mod lifecycle;
pub mod state;
pub mod scorecard;
pub mod error;
pub mod actor;
pub mod engine;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use types::{
    DeliverySubmission, DismissalKind, ExtraType, Match, MatchFormat, MatchId, MatchStatus,
    PlayerEntry, PlayerId, TeamId, TeamSheet, TossDecision,
};
pub use projector::{InningsSnapshot, Projector};
pub use scorecard::{Scorecard, ScorecardAggregator};
pub use state::{Command, MatchState, MatchView};
pub use engine::ScoringEngine;
pub use config::Config;
pub use storage::Storage;
