//! Scoring engine
//!
//! Ties together storage, the delivery ledger and per-match actors into the
//! API a surrounding service calls.
//!
//! Writes are routed to the match's actor (spawned on first use and rebuilt
//! from RocksDB after a restart). Reads come from the actor's last published
//! view and never queue behind writes.
//!
//! # Example
//!
//! ```no_run
//! use scoring_core::{Config, ScoringEngine};
//!
//! #[tokio::main]
//! async fn main() -> scoring_core::Result<()> {
//!     let engine = ScoringEngine::open(Config::default()).await?;
//!
//!     // let record = engine.schedule_match(id, home, away, None)?;
//!     // engine.open_toss(id).await?;
//!
//!     engine.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_match_actor, MatchHandle, Receipt},
    ledger::DeliveryLedger,
    lifecycle,
    metrics::Metrics,
    projector::InningsSnapshot,
    scorecard::{InningsCompletion, InningsState, Scorecard, ScorecardAggregator},
    state::{Command, MatchState, MatchView},
    storage::{Storage, StorageStats},
    types::{
        DeliverySubmission, Match, MatchFormat, MatchId, PlayerId, TeamId, TeamSheet,
        TossDecision,
    },
    Config, Error, Result,
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Main scoring interface
pub struct ScoringEngine {
    /// Direct storage access
    storage: Arc<Storage>,

    /// Durable ledger shared by all actors
    ledger: Arc<DeliveryLedger>,

    /// Running match actors
    matches: DashMap<MatchId, MatchHandle>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("data_dir", &self.config.data_dir)
            .field("active_matches", &self.matches.len())
            .finish()
    }
}

impl ScoringEngine {
    /// Open engine with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let ledger = Arc::new(DeliveryLedger::new(storage.clone()));
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Scoring engine opened"
        );

        Ok(Self {
            storage,
            ledger,
            matches: DashMap::new(),
            metrics,
            config,
        })
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    // Writes

    /// Create a match in `Scheduled`
    pub fn schedule_match(
        &self,
        id: MatchId,
        home: TeamSheet,
        away: TeamSheet,
        format: Option<MatchFormat>,
    ) -> Result<Match> {
        let format = format.unwrap_or(self.config.default_format);
        let record = lifecycle::schedule(id, format, home, away)?;

        // The vacant slot locks out loads and other schedules of this id
        // until the record is durable
        let _slot = match self.matches.entry(id) {
            Entry::Occupied(_) => {
                return Err(Error::Validation(format!("match {} already scheduled", id)))
            }
            Entry::Vacant(vacant) => vacant,
        };
        if self.storage.match_exists(id)? {
            return Err(Error::Validation(format!("match {} already scheduled", id)));
        }
        self.storage.put_match(&record)?;

        tracing::info!(match_id = %id, label = %record.label(), "Match scheduled");
        Ok(record)
    }

    /// Open the toss
    pub async fn open_toss(&self, match_id: MatchId) -> Result<Receipt> {
        self.submit(match_id, Command::OpenToss, None).await
    }

    /// Record the toss
    pub async fn record_toss(
        &self,
        match_id: MatchId,
        winner: TeamId,
        decision: TossDecision,
    ) -> Result<Receipt> {
        self.submit(match_id, Command::RecordToss { winner, decision }, None)
            .await
    }

    /// Start innings `number` with its openers and first bowler
    pub async fn start_innings(
        &self,
        match_id: MatchId,
        number: u8,
        striker: PlayerId,
        non_striker: PlayerId,
        bowler: PlayerId,
    ) -> Result<Receipt> {
        let command = Command::StartInnings {
            number,
            striker,
            non_striker,
            bowler,
            nonce: Uuid::new_v4(),
        };
        self.submit(match_id, command, None).await
    }

    /// Record a delivery; returns its sequence number
    pub async fn record_delivery(&self, match_id: MatchId, sub: DeliverySubmission) -> Result<u64> {
        self.record_delivery_at(match_id, sub, None).await
    }

    /// Record a delivery only if the ledger head is still `expected_seq`
    pub async fn record_delivery_at(
        &self,
        match_id: MatchId,
        sub: DeliverySubmission,
        expected_seq: Option<u64>,
    ) -> Result<u64> {
        let receipt = self
            .submit(match_id, Command::Delivery(sub), expected_seq)
            .await?;
        receipt
            .appended
            .ok_or_else(|| Error::InvariantViolation("delivery appended no entry".to_string()))
    }

    /// Name the bowler of the next over
    pub async fn change_bowler(&self, match_id: MatchId, bowler: PlayerId) -> Result<Receipt> {
        let command = Command::ChangeBowler {
            bowler,
            nonce: Uuid::new_v4(),
        };
        self.submit(match_id, command, None).await
    }

    /// Name the batter replacing a dismissed one
    pub async fn new_batter(&self, match_id: MatchId, batter: PlayerId) -> Result<Receipt> {
        let command = Command::NewBatter {
            batter,
            nonce: Uuid::new_v4(),
        };
        self.submit(match_id, command, None).await
    }

    /// Retract the most recent effective entry of the live innings
    pub async fn retract_last(&self, match_id: MatchId) -> Result<Receipt> {
        let command = Command::RetractLast {
            nonce: Uuid::new_v4(),
        };
        self.submit(match_id, command, None).await
    }

    /// Close the live innings by hand
    pub async fn end_innings(&self, match_id: MatchId) -> Result<Receipt> {
        self.submit(match_id, Command::EndInnings, None).await
    }

    /// Abandon the match
    pub async fn end_match(&self, match_id: MatchId) -> Result<Receipt> {
        self.submit(match_id, Command::EndMatch, None).await
    }

    /// Route a command to the match's actor
    pub async fn submit(
        &self,
        match_id: MatchId,
        command: Command,
        expected_seq: Option<u64>,
    ) -> Result<Receipt> {
        let result = match self.handle(match_id) {
            Ok(handle) => handle.submit(command, expected_seq).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.metrics.record_rejection(e.kind());
        }
        result
    }

    // Reads

    /// Latest published view of a match
    pub fn view(&self, match_id: MatchId) -> Result<Arc<MatchView>> {
        Ok(self.handle(match_id)?.view())
    }

    /// Live state of the current innings
    pub fn innings_state(&self, match_id: MatchId) -> Result<InningsState> {
        let view = self.view(match_id)?;
        ScorecardAggregator::innings_state(&view)
            .ok_or_else(|| Error::NotFound(format!("match {} has no innings under way", match_id)))
    }

    /// Whether the last over is complete and awaits a new bowler
    pub fn is_over_completed(&self, match_id: MatchId) -> Result<bool> {
        let view = self.view(match_id)?;
        let live = view
            .record
            .live_innings()
            .and_then(|i| view.snapshot(i.id.number));
        Ok(live.map_or(false, |s| s.is_over_complete()))
    }

    /// Overs allotted against overs bowled in the current innings
    pub fn innings_completion(&self, match_id: MatchId) -> Result<InningsCompletion> {
        let view = self.view(match_id)?;
        ScorecardAggregator::innings_completion(&view)
            .ok_or_else(|| Error::NotFound(format!("match {} has no innings under way", match_id)))
    }

    /// Whether the match is over
    pub fn is_match_over(&self, match_id: MatchId) -> Result<bool> {
        Ok(self.view(match_id)?.record.is_terminal())
    }

    /// Side batting second, known once the toss is recorded
    pub fn second_innings_batting_team(&self, match_id: MatchId) -> Result<TeamId> {
        let view = self.view(match_id)?;
        ScorecardAggregator::second_innings_batting_team(&view)
            .ok_or_else(|| Error::NotFound(format!("match {} has no toss yet", match_id)))
    }

    /// Projected snapshot of one innings
    pub fn snapshot(&self, match_id: MatchId, number: u8) -> Result<InningsSnapshot> {
        let view = self.view(match_id)?;
        view.snapshot(number)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("innings {}/{}", match_id, number)))
    }

    /// Full scorecard
    pub fn scorecard(&self, match_id: MatchId) -> Result<Scorecard> {
        let view = self.view(match_id)?;
        Ok(ScorecardAggregator::scorecard(&view))
    }

    /// Stop all actors and flush storage
    pub async fn shutdown(self) -> Result<()> {
        let handles: Vec<MatchHandle> = self.matches.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                tracing::debug!(match_id = %handle.match_id(), error = %e, "Actor already stopped");
            }
        }
        self.matches.clear();
        self.storage.close()?;
        tracing::info!("Scoring engine shut down");
        Ok(())
    }

    /// Actor handle, spawning one from durable state if needed
    fn handle(&self, match_id: MatchId) -> Result<MatchHandle> {
        match self.matches.entry(match_id) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_closed() {
                    return Ok(occupied.get().clone());
                }
                tracing::warn!(match_id = %match_id, "Match actor stopped, restarting");
                let handle = self.load(match_id)?;
                occupied.insert(handle.clone());
                Ok(handle)
            }
            Entry::Vacant(vacant) => {
                let handle = self.load(match_id)?;
                vacant.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    fn load(&self, match_id: MatchId) -> Result<MatchHandle> {
        let record = self.storage.get_match(match_id)?;
        let entries = [
            self.ledger.entries(match_id, 1)?,
            self.ledger.entries(match_id, 2)?,
        ];
        let cached = [
            self.storage.get_snapshot(match_id, 1)?,
            self.storage.get_snapshot(match_id, 2)?,
        ];
        let nonces = self.storage.read_nonces(match_id)?;
        let state = MatchState::restore(record, entries, cached, nonces)?;

        tracing::info!(
            match_id = %match_id,
            head_seq = state.head_seq(),
            status = ?state.record().status,
            "Match loaded"
        );

        Ok(spawn_match_actor(
            state,
            self.ledger.clone(),
            self.metrics.clone(),
            self.config.actor.mailbox_capacity,
        ))
    }
}
