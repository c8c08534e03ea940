//! Per-match write model
//!
//! [`MatchState`] owns everything the single writer of a match needs: the
//! record, both innings' ledgers, their snapshots, the ledger head and the
//! claimed idempotency keys. A command is handled in two steps:
//!
//! 1. [`MatchState::stage`] validates it and builds the full outcome
//!    (new record, entries, snapshot) without touching `self`.
//! 2. Once storage has accepted the outcome, [`MatchState::apply`] folds it in.
//!
//! A rejected command therefore leaves both the durable ledger and the
//! in-memory state unchanged.

use crate::{
    error::{Error, Result},
    ledger::{self, StagedEntry},
    lifecycle::{self, Transition},
    projector::{Advance, InningsSnapshot, Projector},
    types::{
        DeliverySubmission, EntryKind, IdempotencyKey, Innings, InningsClose, InningsStatus,
        LedgerEntry, Match, MatchStatus, PlayerId, TeamId, TossDecision,
    },
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A write against one match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scheduled → TossPending
    OpenToss,
    /// Record the toss
    RecordToss {
        /// Toss winner
        winner: TeamId,
        /// Winner's election
        decision: TossDecision,
    },
    /// Start an innings with its openers and first bowler
    StartInnings {
        /// Innings number (1 or 2)
        number: u8,
        /// Opening striker
        striker: PlayerId,
        /// Opening non-striker
        non_striker: PlayerId,
        /// Bowler of the first over
        bowler: PlayerId,
        /// Submission nonce
        nonce: Uuid,
    },
    /// Record a delivery
    Delivery(DeliverySubmission),
    /// Name the bowler of the next over
    ChangeBowler {
        /// Incoming bowler
        bowler: PlayerId,
        /// Submission nonce
        nonce: Uuid,
    },
    /// Name the batter replacing a dismissed one
    NewBatter {
        /// Incoming batter
        batter: PlayerId,
        /// Submission nonce
        nonce: Uuid,
    },
    /// Tombstone the most recent effective entry of the live innings
    RetractLast {
        /// Submission nonce
        nonce: Uuid,
    },
    /// Close the live innings by hand
    EndInnings,
    /// Abandon the match
    EndMatch,
}

impl Command {
    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenToss => "open_toss",
            Command::RecordToss { .. } => "record_toss",
            Command::StartInnings { .. } => "start_innings",
            Command::Delivery(_) => "delivery",
            Command::ChangeBowler { .. } => "change_bowler",
            Command::NewBatter { .. } => "new_batter",
            Command::RetractLast { .. } => "retract_last",
            Command::EndInnings => "end_innings",
            Command::EndMatch => "end_match",
        }
    }
}

/// Outcome of a validated command, not yet durable
#[derive(Debug, Clone)]
pub struct Staged {
    /// Record after the command
    pub record: Match,
    /// Entries to append
    pub entries: Vec<StagedEntry>,
    /// Snapshot of the innings the command touched
    pub snapshot: Option<InningsSnapshot>,
    /// Status changes taken
    pub transitions: Vec<Transition>,
}

impl Staged {
    fn record_only(record: Match, transitions: Vec<Transition>) -> Self {
        Self {
            record,
            entries: Vec::new(),
            snapshot: None,
            transitions,
        }
    }

    /// Sequence number of the last staged entry
    pub fn last_seq(&self) -> Option<u64> {
        self.entries.last().map(|s| s.entry.seq)
    }
}

/// Immutable read view of a match, published after every commit
#[derive(Debug, Clone, PartialEq)]
pub struct MatchView {
    /// Match record
    pub record: Match,
    /// Innings snapshots (index 0 = innings 1)
    pub innings: [Option<InningsSnapshot>; 2],
    /// Sequence number of the last ledger entry
    pub head_seq: u64,
}

impl MatchView {
    /// Snapshot of an innings
    pub fn snapshot(&self, number: u8) -> Option<&InningsSnapshot> {
        slot(number).and_then(|i| self.innings[i].as_ref())
    }

    /// Snapshot of the innings being scored, or the latest one
    pub fn current(&self) -> Option<&InningsSnapshot> {
        match self.record.live_innings() {
            Some(live) => self.snapshot(live.id.number),
            None => self.innings[1].as_ref().or(self.innings[0].as_ref()),
        }
    }

    /// Runs needed by the side batting second
    pub fn target(&self) -> Option<u32> {
        self.innings[0]
            .as_ref()
            .filter(|_| {
                self.record
                    .innings(1)
                    .map_or(false, |i| i.status == InningsStatus::Completed)
            })
            .map(lifecycle::target)
    }
}

fn slot(number: u8) -> Option<usize> {
    match number {
        1 => Some(0),
        2 => Some(1),
        _ => None,
    }
}

/// Write model of one match
#[derive(Debug, Clone)]
pub struct MatchState {
    record: Match,
    entries: [Vec<LedgerEntry>; 2],
    snapshots: [Option<InningsSnapshot>; 2],
    head_seq: u64,
    nonces: HashMap<Uuid, IdempotencyKey>,
}

impl MatchState {
    /// State of a freshly scheduled match
    pub fn new(record: Match) -> Self {
        Self {
            record,
            entries: [Vec::new(), Vec::new()],
            snapshots: [None, None],
            head_seq: 0,
            nonces: HashMap::new(),
        }
    }

    /// Rebuild from durable state by replaying each innings
    ///
    /// Cached snapshots are checked against the replay; on divergence the
    /// replay wins.
    pub fn restore(
        record: Match,
        entries: [Vec<LedgerEntry>; 2],
        cached: [Option<InningsSnapshot>; 2],
        nonces: Vec<IdempotencyKey>,
    ) -> Result<Self> {
        let mut snapshots = [None, None];
        for innings in &record.innings {
            let index = match slot(innings.id.number) {
                Some(index) if innings.status != InningsStatus::NotStarted => index,
                _ => continue,
            };
            let replayed = Projector::project(innings, &record.format, &entries[index])?;
            match &cached[index] {
                Some(cached) if *cached != replayed => {
                    tracing::warn!(
                        match_id = %record.id,
                        innings = innings.id.number,
                        cached_seq = cached.last_seq,
                        replayed_seq = replayed.last_seq,
                        "Cached snapshot diverges from ledger replay"
                    );
                }
                None if !entries[index].is_empty() => {
                    tracing::warn!(
                        match_id = %record.id,
                        innings = innings.id.number,
                        "Snapshot missing, rebuilt from ledger"
                    );
                }
                _ => {}
            }
            snapshots[index] = Some(replayed);
        }

        let head_seq = entries
            .iter()
            .flat_map(|e| e.last())
            .map(|e| e.seq)
            .max()
            .unwrap_or(0);

        Ok(Self {
            record,
            entries,
            snapshots,
            head_seq,
            nonces: nonces.into_iter().map(|k| (k.nonce, k)).collect(),
        })
    }

    /// Match record
    pub fn record(&self) -> &Match {
        &self.record
    }

    /// Ledger head
    pub fn head_seq(&self) -> u64 {
        self.head_seq
    }

    /// Ledger of one innings
    pub fn entries(&self, number: u8) -> &[LedgerEntry] {
        match slot(number) {
            Some(i) => &self.entries[i],
            None => &[],
        }
    }

    /// Read view for publication
    pub fn view(&self) -> MatchView {
        MatchView {
            record: self.record.clone(),
            innings: self.snapshots.clone(),
            head_seq: self.head_seq,
        }
    }

    /// Validate a command and build its outcome
    pub fn stage(
        &self,
        command: &Command,
        expected_seq: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Staged> {
        if let Some(expected) = expected_seq {
            if expected != self.head_seq {
                return Err(Error::ConcurrentModification(format!(
                    "ledger head moved to {}, caller saw {}",
                    self.head_seq, expected
                )));
            }
        }

        let mut record = self.record.clone();
        match command {
            Command::OpenToss => {
                let t = lifecycle::open_toss(&mut record, now)?;
                Ok(Staged::record_only(record, vec![t]))
            }
            Command::RecordToss { winner, decision } => {
                let t = lifecycle::record_toss(&mut record, *winner, *decision, now)?;
                Ok(Staged::record_only(record, vec![t]))
            }
            Command::StartInnings {
                number,
                striker,
                non_striker,
                bowler,
                nonce,
            } => {
                self.check_nonce(*nonce)?;
                lifecycle::check_start(&record, *number, *striker, *non_striker, *bowler)?;
                let t = lifecycle::start_innings(&mut record, *number, now)?;
                let innings = record
                    .innings(*number)
                    .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
                let mut snapshot = Projector::empty(innings, &record.format);

                let openers = self.entry(*number, *nonce, now, 1, EntryKind::Openers {
                    striker: *striker,
                    non_striker: *non_striker,
                });
                let first_bowler =
                    self.entry(*number, Uuid::new_v4(), now, 2, EntryKind::BowlerIn { bowler: *bowler });
                Projector::advance(&mut snapshot, &openers)?;
                Projector::advance(&mut snapshot, &first_bowler)?;

                let key = IdempotencyKey {
                    innings: innings.id,
                    over: 0,
                    ball: 0,
                    nonce: *nonce,
                };
                Ok(Staged {
                    record,
                    entries: vec![
                        StagedEntry { entry: openers, key: Some(key) },
                        StagedEntry { entry: first_bowler, key: None },
                    ],
                    snapshot: Some(snapshot),
                    transitions: vec![t],
                })
            }
            Command::Delivery(sub) => {
                let number = self.live_innings_for_delivery()?;
                self.check_nonce(sub.nonce)?;
                let (innings, snapshot) = self.live(number)?;
                let delivery = ledger::validate_delivery(&record, innings, snapshot, sub)?;
                let key = IdempotencyKey {
                    innings: innings.id,
                    over: sub.over,
                    ball: sub.ball,
                    nonce: sub.nonce,
                };
                let entry = self.entry(number, sub.nonce, now, 1, EntryKind::Ball(delivery));
                self.stage_entry(record, number, entry, key, now)
            }
            Command::ChangeBowler { bowler, nonce } => {
                let number = self.live_innings_number()?;
                self.check_nonce(*nonce)?;
                let (innings, snapshot) = self.live(number)?;
                ledger::validate_bowler_change(&record, innings, snapshot, *bowler)?;
                let key = self.position_key(snapshot, *nonce);
                let entry = self.entry(number, *nonce, now, 1, EntryKind::BowlerIn { bowler: *bowler });
                self.stage_entry(record, number, entry, key, now)
            }
            Command::NewBatter { batter, nonce } => {
                let number = self.live_innings_number()?;
                self.check_nonce(*nonce)?;
                let (innings, snapshot) = self.live(number)?;
                ledger::validate_incoming_batter(&record, innings, snapshot, *batter)?;
                let key = self.position_key(snapshot, *nonce);
                let entry = self.entry(number, *nonce, now, 1, EntryKind::BatterIn { batter: *batter });
                self.stage_entry(record, number, entry, key, now)
            }
            Command::RetractLast { nonce } => {
                let reopen = lifecycle::reopenable_innings(&record);
                let number = match reopen {
                    Some(number) => number,
                    None => self.live_innings_number()?,
                };
                self.check_nonce(*nonce)?;
                let (_, snapshot) = self.live(number)?;
                let target = ledger::retraction_target(self.entries(number))?;
                let key = self.position_key(snapshot, *nonce);
                let reopened = match reopen {
                    Some(number) => Some(lifecycle::reopen_innings(&mut record, number, now)?),
                    None => None,
                };
                let entry = self.entry(number, *nonce, now, 1, EntryKind::Retraction {
                    target_seq: target.seq,
                });
                let mut staged = self.stage_entry(record, number, entry, key, now)?;
                if let Some(t) = reopened {
                    staged.transitions.insert(0, t);
                }
                Ok(staged)
            }
            Command::EndInnings => {
                let number = self.live_innings_number()?;
                let transitions = lifecycle::complete_innings(
                    &mut record,
                    number,
                    InningsClose::Declared,
                    [self.snapshots[0].as_ref(), self.snapshots[1].as_ref()],
                    now,
                )?;
                Ok(Staged::record_only(record, transitions))
            }
            Command::EndMatch => {
                let transitions = lifecycle::end_match(&mut record, now)?;
                Ok(Staged::record_only(record, transitions))
            }
        }
    }

    /// Fold a committed outcome into the state
    pub fn apply(&mut self, staged: Staged) {
        for s in staged.entries {
            if let Some(key) = s.key {
                self.nonces.insert(key.nonce, key);
            }
            self.head_seq = self.head_seq.max(s.entry.seq);
            if let Some(i) = slot(s.entry.innings) {
                self.entries[i].push(s.entry);
            }
        }
        if let Some(snapshot) = staged.snapshot {
            if let Some(i) = slot(snapshot.innings.number) {
                self.snapshots[i] = Some(snapshot);
            }
        }
        self.record = staged.record;
    }

    fn stage_entry(
        &self,
        mut record: Match,
        number: u8,
        entry: LedgerEntry,
        key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Staged> {
        let (innings, current) = self.live(number)?;
        let snapshot = {
            let mut next = current.clone();
            match Projector::advance(&mut next, &entry)? {
                Advance::Applied => next,
                Advance::ReplayRequired => {
                    let mut all = self.entries(number).to_vec();
                    all.push(entry.clone());
                    Projector::project(innings, &record.format, &all)?
                }
            }
        };

        let mut transitions = Vec::new();
        let format = record.format;
        let close = match number {
            2 => {
                let target = self.snapshots[0].as_ref().map(lifecycle::target);
                match target {
                    Some(t) if lifecycle::can_finish_early(&snapshot, &format, t) => {
                        lifecycle::check_innings_end(&format, &snapshot, Some(t))
                    }
                    Some(_) => None,
                    None => lifecycle::check_innings_end(&format, &snapshot, None),
                }
            }
            _ => lifecycle::check_innings_end(&format, &snapshot, None),
        };
        if let Some(reason) = close {
            let snapshots = match number {
                1 => [Some(&snapshot), self.snapshots[1].as_ref()],
                _ => [self.snapshots[0].as_ref(), Some(&snapshot)],
            };
            transitions = lifecycle::complete_innings(&mut record, number, reason, snapshots, now)?;
        } else {
            record.updated_at = now;
        }

        Ok(Staged {
            record,
            entries: vec![StagedEntry { entry, key: Some(key) }],
            snapshot: Some(snapshot),
            transitions,
        })
    }

    fn entry(
        &self,
        innings: u8,
        nonce: Uuid,
        now: DateTime<Utc>,
        offset: u64,
        kind: EntryKind,
    ) -> LedgerEntry {
        LedgerEntry {
            seq: self.head_seq + offset,
            match_id: self.record.id,
            innings,
            nonce,
            recorded_at: now,
            kind,
        }
    }

    fn position_key(&self, snapshot: &InningsSnapshot, nonce: Uuid) -> IdempotencyKey {
        IdempotencyKey {
            innings: snapshot.innings,
            over: snapshot.over,
            ball: snapshot.ball_in_over,
            nonce,
        }
    }

    fn check_nonce(&self, nonce: Uuid) -> Result<()> {
        match self.nonces.get(&nonce) {
            Some(key) => Err(Error::Sequence(format!(
                "submission {} already recorded at {} {}.{}",
                nonce, key.innings, key.over, key.ball
            ))),
            None => Ok(()),
        }
    }

    fn live_innings_number(&self) -> Result<u8> {
        self.record
            .live_innings()
            .map(|i| i.id.number)
            .ok_or_else(|| {
                Error::Sequence(format!(
                    "no innings in progress, match is {:?}",
                    self.record.status
                ))
            })
    }

    fn live_innings_for_delivery(&self) -> Result<u8> {
        match self.record.live_innings() {
            Some(innings) => Ok(innings.id.number),
            None => match self.record.status {
                MatchStatus::Scheduled | MatchStatus::TossPending => Err(Error::Sequence(
                    "no delivery can be recorded before innings 1 starts".to_string(),
                )),
                status => Err(Error::Validation(format!(
                    "no innings in progress, match is {:?}",
                    status
                ))),
            },
        }
    }

    fn live(&self, number: u8) -> Result<(&Innings, &InningsSnapshot)> {
        let innings = self
            .record
            .innings(number)
            .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
        let snapshot = slot(number)
            .and_then(|i| self.snapshots[i].as_ref())
            .ok_or_else(|| {
                Error::InvariantViolation(format!("innings {} has no snapshot", innings.id))
            })?;
        Ok((innings, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DismissalKind, ExtraType, MatchFormat, MatchId, MatchResult, PlayerEntry, TeamSheet,
    };

    fn state(format: MatchFormat) -> MatchState {
        let sheet = |id: u64, first: u64| {
            TeamSheet::new(
                id,
                format!("Team {}", id),
                (first..first + 11)
                    .map(|p| PlayerEntry::new(p, format!("Player {}", p)))
                    .collect(),
            )
        };
        let record =
            lifecycle::schedule(MatchId::new(1), format, sheet(1, 100), sheet(2, 200)).unwrap();
        MatchState::new(record)
    }

    fn run(state: &mut MatchState, command: Command) -> Result<Staged> {
        let staged = state.stage(&command, None, Utc::now())?;
        state.apply(staged.clone());
        Ok(staged)
    }

    fn started(format: MatchFormat) -> MatchState {
        let mut s = state(format);
        run(&mut s, Command::OpenToss).unwrap();
        run(&mut s, Command::RecordToss { winner: TeamId::new(1), decision: TossDecision::Bat })
            .unwrap();
        run(&mut s, Command::StartInnings {
            number: 1,
            striker: PlayerId::new(100),
            non_striker: PlayerId::new(101),
            bowler: PlayerId::new(200),
            nonce: Uuid::new_v4(),
        })
        .unwrap();
        s
    }

    fn next(s: &MatchState) -> DeliverySubmission {
        let view = s.view();
        let snap = view.current().unwrap();
        DeliverySubmission::dot(
            snap.over,
            snap.ball_in_over + 1,
            snap.striker.unwrap(),
            snap.non_striker.unwrap(),
            snap.bowler.unwrap(),
        )
    }

    #[test]
    fn test_delivery_before_start_is_sequence_error() {
        let mut s = state(MatchFormat::default());
        let sub = DeliverySubmission::dot(0, 1, PlayerId::new(100), PlayerId::new(101), PlayerId::new(200));
        let err = s.stage(&Command::Delivery(sub.clone()), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
        run(&mut s, Command::OpenToss).unwrap();
        let err = s.stage(&Command::Delivery(sub), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
    }

    #[test]
    fn test_start_writes_openers_and_bowler() {
        let s = started(MatchFormat::default());
        assert_eq!(s.head_seq(), 2);
        assert_eq!(s.entries(1).len(), 2);
        assert_eq!(s.record().status, MatchStatus::InProgress);
        assert_eq!(s.view().current().unwrap().bowler, Some(PlayerId::new(200)));
    }

    #[test]
    fn test_duplicate_nonce_rejected() {
        let mut s = started(MatchFormat::default());
        let sub = next(&s).with_runs(1);
        run(&mut s, Command::Delivery(sub.clone())).unwrap();

        let mut again = next(&s);
        again.nonce = sub.nonce;
        let err = s.stage(&Command::Delivery(again), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
        assert_eq!(s.head_seq(), 3);
    }

    #[test]
    fn test_stale_expected_seq_is_concurrent_modification() {
        let s = started(MatchFormat::default());
        let err = s
            .stage(&Command::Delivery(next(&s)), Some(1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification(_)));
        assert!(s.stage(&Command::Delivery(next(&s)), Some(2), Utc::now()).is_ok());
    }

    #[test]
    fn test_rejected_command_leaves_state_unchanged() {
        let mut s = started(MatchFormat::default());
        for _ in 0..6 {
            let sub = next(&s);
            run(&mut s, Command::Delivery(sub)).unwrap();
        }
        let before = s.view();
        let err = run(&mut s, Command::ChangeBowler { bowler: PlayerId::new(200), nonce: Uuid::new_v4() })
            .unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
        assert_eq!(s.view(), before);

        run(&mut s, Command::ChangeBowler { bowler: PlayerId::new(201), nonce: Uuid::new_v4() })
            .unwrap();
        assert_eq!(s.view().current().unwrap().bowler, Some(PlayerId::new(201)));
    }

    #[test]
    fn test_retract_last_restores_previous_snapshot() {
        let mut s = started(MatchFormat::default());
        let sub = next(&s).with_runs(4);
        run(&mut s, Command::Delivery(sub)).unwrap();
        let before = s.view().current().unwrap().clone();

        let sub = next(&s).with_wicket(DismissalKind::Caught, PlayerId::new(100));
        run(&mut s, Command::Delivery(sub)).unwrap();
        assert_eq!(s.view().current().unwrap().wickets, 1);

        run(&mut s, Command::RetractLast { nonce: Uuid::new_v4() }).unwrap();
        let after = s.view().current().unwrap().clone();
        assert_eq!(after.wickets, 0);
        assert_eq!(after.total_runs, before.total_runs);
        assert_eq!(after.striker, before.striker);
        assert_eq!(after.legal_balls, before.legal_balls);
    }

    #[test]
    fn test_all_out_closes_innings_with_overs_left() {
        let format = MatchFormat { max_wickets: 2, ..MatchFormat::default() };
        let mut s = started(format);

        let sub = next(&s).with_wicket(DismissalKind::Bowled, PlayerId::new(100));
        run(&mut s, Command::Delivery(sub)).unwrap();
        run(&mut s, Command::NewBatter { batter: PlayerId::new(102), nonce: Uuid::new_v4() }).unwrap();
        let sub = next(&s).with_wicket(DismissalKind::Lbw, PlayerId::new(102));
        let staged = run(&mut s, Command::Delivery(sub)).unwrap();

        assert_eq!(
            staged.transitions,
            vec![Transition::InningsCompleted(1, InningsClose::AllOut)]
        );
        assert_eq!(s.record().status, MatchStatus::InningsBreak);
        let err = s.stage(&Command::Delivery(next_dot(&s)), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_retracting_closing_wicket_reopens_innings() {
        let format = MatchFormat { max_wickets: 2, ..MatchFormat::default() };
        let mut s = started(format);

        let sub = next(&s).with_wicket(DismissalKind::Bowled, PlayerId::new(100));
        run(&mut s, Command::Delivery(sub)).unwrap();
        run(&mut s, Command::NewBatter { batter: PlayerId::new(102), nonce: Uuid::new_v4() }).unwrap();
        let before = s.view().current().unwrap().clone();
        let sub = next(&s).with_wicket(DismissalKind::Lbw, PlayerId::new(102));
        run(&mut s, Command::Delivery(sub)).unwrap();
        assert_eq!(s.record().status, MatchStatus::InningsBreak);

        let staged = run(&mut s, Command::RetractLast { nonce: Uuid::new_v4() }).unwrap();
        assert_eq!(staged.transitions, vec![Transition::InningsReopened(1)]);
        assert_eq!(s.record().status, MatchStatus::InProgress);
        assert_eq!(s.record().innings(1).unwrap().closed_by, None);
        assert_eq!(s.view().target(), None);

        let after = s.view().snapshot(1).unwrap().clone();
        assert_eq!(after.wickets, before.wickets);
        assert_eq!(after.striker, before.striker);
        assert_eq!(after.legal_balls, before.legal_balls);

        // Scoring resumes from the reopened position
        let sub = next(&s).with_runs(2);
        run(&mut s, Command::Delivery(sub)).unwrap();
        assert_eq!(s.view().snapshot(1).unwrap().total_runs, 2);
    }

    #[test]
    fn test_declared_innings_cannot_be_retracted() {
        let mut s = started(MatchFormat::default());
        let sub = next(&s).with_runs(3);
        run(&mut s, Command::Delivery(sub)).unwrap();
        run(&mut s, Command::EndInnings).unwrap();

        let head = s.head_seq();
        let err = run(&mut s, Command::RetractLast { nonce: Uuid::new_v4() }).unwrap_err();
        assert!(matches!(err, Error::Sequence(_)));
        assert_eq!(s.head_seq(), head);
        assert_eq!(s.record().status, MatchStatus::InningsBreak);
    }

    fn next_dot(s: &MatchState) -> DeliverySubmission {
        let snap = s.view().snapshot(1).unwrap().clone();
        DeliverySubmission::dot(
            snap.over,
            snap.ball_in_over + 1,
            PlayerId::new(101),
            PlayerId::new(103),
            PlayerId::new(200),
        )
    }

    #[test]
    fn test_chase_completes_match() {
        let format = MatchFormat { overs_limit: 1, ..MatchFormat::default() };
        let mut s = started(format);
        for _ in 0..6 {
            let sub = next(&s).with_extra(ExtraType::Bye, 1);
            run(&mut s, Command::Delivery(sub)).unwrap();
        }
        assert_eq!(s.record().status, MatchStatus::InningsBreak);
        assert_eq!(s.view().target(), Some(7));

        run(&mut s, Command::StartInnings {
            number: 2,
            striker: PlayerId::new(200),
            non_striker: PlayerId::new(201),
            bowler: PlayerId::new(100),
            nonce: Uuid::new_v4(),
        })
        .unwrap();
        let sub = next(&s).with_runs(6);
        run(&mut s, Command::Delivery(sub)).unwrap();
        assert_eq!(s.record().status, MatchStatus::InProgress);
        let sub = next(&s).with_runs(1);
        let staged = run(&mut s, Command::Delivery(sub)).unwrap();

        assert_eq!(s.record().status, MatchStatus::Completed);
        assert_eq!(staged.transitions.len(), 2);
        assert!(matches!(
            s.record().result,
            Some(MatchResult::Won { winner, .. }) if winner == TeamId::new(2)
        ));
    }

    #[test]
    fn test_restore_matches_live_state() {
        let mut s = started(MatchFormat::default());
        for runs in [1, 4, 0, 2] {
            let sub = next(&s).with_runs(runs);
            run(&mut s, Command::Delivery(sub)).unwrap();
        }
        let entries = [s.entries(1).to_vec(), s.entries(2).to_vec()];
        let nonces = s.nonces.values().copied().collect();
        let restored = MatchState::restore(s.record().clone(), entries, [None, None], nonces).unwrap();
        assert_eq!(restored.view(), s.view());
        assert_eq!(restored.nonces.len(), s.nonces.len());
    }
}
