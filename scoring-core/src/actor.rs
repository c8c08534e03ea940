//! Actor-based concurrency for match scoring
//!
//! Each match gets its own single writer:
//! - One tokio task owns the match's [`MatchState`] and is the only code that
//!   appends to its ledger
//! - Submissions queue in a bounded mailbox in arrival order; when the mailbox
//!   is full the submission is rejected with
//!   [`Error::ConcurrentModification`] instead of waiting
//! - After every commit the actor publishes an immutable [`MatchView`];
//!   readers clone the `Arc` and never wait on the writer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                MatchHandle (Clone)                   │
//! │     try_send into mailbox  ·  read published view    │
//! └─────────────────────┬───────────────────▲────────────┘
//!                       │                   │
//!                       │ mpsc (bounded)    │ Arc<MatchView>
//!                       ▼                   │
//! ┌──────────────────────────────────────────────────────┐
//! │              MatchActor (Single Task)                │
//! │   stage ─► DeliveryLedger::append ─► apply ─► publish│
//! │           (one RocksDB WriteBatch)                   │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    ledger::DeliveryLedger,
    lifecycle::Transition,
    metrics::Metrics,
    state::{Command, MatchState, MatchView},
    storage::Commit,
    types::MatchId,
    Error, Result,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Outcome of an accepted command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Ledger head after the command
    pub head_seq: u64,
    /// Sequence number of the last entry the command appended
    pub appended: Option<u64>,
    /// Lifecycle transitions the command caused
    pub transitions: Vec<Transition>,
}

/// Message sent to a match actor
#[derive(Debug)]
pub enum MatchMessage {
    /// Validate and apply a command
    Submit {
        /// Command to run
        command: Command,
        /// Ledger head the caller last saw, if it cares
        expected_seq: Option<u64>,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Stop once the queued submissions ahead of it are handled
    Shutdown {
        /// Signalled after the actor has released its storage handle
        response: oneshot::Sender<()>,
    },
}

/// Published read view slot
pub type SharedView = Arc<RwLock<Arc<MatchView>>>;

/// Actor that owns one match
pub struct MatchActor {
    /// Write model
    state: MatchState,

    /// Durable ledger
    ledger: Arc<DeliveryLedger>,

    /// Published read view
    view: SharedView,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<MatchMessage>,

    /// Metrics
    metrics: Metrics,
}

impl MatchActor {
    /// Create new actor
    pub fn new(
        state: MatchState,
        ledger: Arc<DeliveryLedger>,
        view: SharedView,
        mailbox: mpsc::Receiver<MatchMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            state,
            ledger,
            view,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let match_id = self.state.record().id;
        tracing::debug!(match_id = %match_id, "Match actor started");

        let mut on_stop = None;
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                MatchMessage::Submit {
                    command,
                    expected_seq,
                    response,
                } => {
                    let result = self.handle(command, expected_seq);
                    if response.send(result).is_err() {
                        tracing::debug!(match_id = %match_id, "Submitter went away before reply");
                    }
                }
                MatchMessage::Shutdown { response } => {
                    on_stop = Some(response);
                    break;
                }
            }
        }

        self.metrics.active_matches.dec();
        // Release the storage handle before acknowledging
        drop(self.ledger);
        tracing::debug!(match_id = %match_id, "Match actor stopped");
        if let Some(response) = on_stop {
            let _ = response.send(());
        }
    }

    /// Stage, commit, apply and publish one command
    fn handle(&mut self, command: Command, expected_seq: Option<u64>) -> Result<Receipt> {
        let started = Instant::now();
        let match_id = self.state.record().id;

        let staged = match self.state.stage(&command, expected_seq, Utc::now()) {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(
                    match_id = %match_id,
                    command = command.name(),
                    error = %e,
                    "Submission rejected"
                );
                return Err(e);
            }
        };

        let commit = Commit {
            record: &staged.record,
            entries: &staged.entries,
            snapshot: staged.snapshot.as_ref(),
        };
        if let Err(e) = self.ledger.append(&commit) {
            tracing::error!(
                match_id = %match_id,
                command = command.name(),
                error = %e,
                "Commit failed"
            );
            return Err(e);
        }

        let appended = staged.last_seq();
        let transitions = staged.transitions.clone();
        self.metrics.record_entries(staged.entries.len());
        self.state.apply(staged);

        for transition in &transitions {
            tracing::info!(match_id = %match_id, transition = ?transition, "Match transition");
            self.metrics.record_transition(transition);
        }

        *self.view.write() = Arc::new(self.state.view());
        self.metrics
            .record_append_duration(started.elapsed().as_secs_f64());

        Ok(Receipt {
            head_seq: self.state.head_seq(),
            appended,
            transitions,
        })
    }
}

/// Handle for sending messages to a match actor
#[derive(Clone)]
pub struct MatchHandle {
    match_id: MatchId,
    sender: mpsc::Sender<MatchMessage>,
    view: SharedView,
}

impl std::fmt::Debug for MatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchHandle")
            .field("match_id", &self.match_id)
            .field("head_seq", &self.view.read().head_seq)
            .finish()
    }
}

impl MatchHandle {
    /// Create new handle
    pub fn new(match_id: MatchId, sender: mpsc::Sender<MatchMessage>, view: SharedView) -> Self {
        Self {
            match_id,
            sender,
            view,
        }
    }

    /// Match this handle writes to
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Queue a command and wait for its outcome
    pub async fn submit(&self, command: Command, expected_seq: Option<u64>) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .try_send(MatchMessage::Submit {
                command,
                expected_seq,
                response: tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::ConcurrentModification(format!(
                    "match {} has too many pending submissions",
                    self.match_id
                )),
                mpsc::error::TrySendError::Closed(_) => {
                    Error::Concurrency("Actor mailbox closed".to_string())
                }
            })?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Latest published view
    pub fn view(&self) -> Arc<MatchView> {
        self.view.read().clone()
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Shutdown actor and wait until it has stopped
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MatchMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Actor stopped without acknowledging".to_string()))
    }
}

/// Spawn the actor for one match
pub fn spawn_match_actor(
    state: MatchState,
    ledger: Arc<DeliveryLedger>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> MatchHandle {
    let match_id = state.record().id;
    let view = Arc::new(RwLock::new(Arc::new(state.view())));
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));

    metrics.active_matches.inc();
    let actor = MatchActor::new(state, ledger, view.clone(), rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    MatchHandle::new(match_id, tx, view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::storage::Storage;
    use crate::types::{MatchFormat, MatchStatus, PlayerEntry, TeamSheet};
    use crate::Config;

    fn test_state() -> MatchState {
        let home = TeamSheet::new(1, "Home", vec![PlayerEntry::new(1, "A"), PlayerEntry::new(2, "B")]);
        let away = TeamSheet::new(2, "Away", vec![PlayerEntry::new(3, "C"), PlayerEntry::new(4, "D")]);
        let record = lifecycle::schedule(MatchId::new(1), MatchFormat::default(), home, away).unwrap();
        MatchState::new(record)
    }

    #[tokio::test]
    async fn test_actor_submit_publishes_view() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let ledger = Arc::new(DeliveryLedger::new(storage.clone()));
        let metrics = Metrics::new().unwrap();
        let handle = spawn_match_actor(test_state(), ledger, metrics.clone(), 8);

        assert_eq!(handle.view().record.status, MatchStatus::Scheduled);
        let receipt = handle.submit(Command::OpenToss, None).await.unwrap();
        assert_eq!(receipt.transitions, vec![Transition::TossOpened]);
        assert_eq!(handle.view().record.status, MatchStatus::TossPending);
        assert_eq!(storage.get_match(MatchId::new(1)).unwrap().status, MatchStatus::TossPending);

        let err = handle.submit(Command::OpenToss, None).await.unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
        assert_eq!(handle.view().record.status, MatchStatus::TossPending);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_mailbox_is_concurrent_modification() {
        let state = test_state();
        let view = Arc::new(RwLock::new(Arc::new(state.view())));
        let (tx, _rx) = mpsc::channel(1);
        let (ack, _) = oneshot::channel();
        tx.try_send(MatchMessage::Shutdown { response: ack }).unwrap();

        let handle = MatchHandle::new(MatchId::new(1), tx, view);
        let err = handle.submit(Command::OpenToss, None).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification(_)));
    }
}
