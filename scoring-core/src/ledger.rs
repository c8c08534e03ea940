//! Delivery ledger
//!
//! Append-only record of everything that happened on the field. Entries are
//! never modified or deleted: a correction is a [`EntryKind::Retraction`]
//! tombstone that projections skip.
//!
//! The validators in this module are pure functions of the match record and
//! the current innings snapshot. A submission that fails any of them is
//! rejected before anything is staged, so the ledger stays byte-for-byte
//! unchanged.
//!
//! # Error policy
//!
//! - Malformed input or players outside the designated rosters:
//!   [`Error::Validation`]
//! - Input that disagrees with the derived scoring context (stale position,
//!   wrong striker, pending selection, consecutive overs): [`Error::Sequence`]

use crate::{
    error::{Error, Result},
    projector::{InningsSnapshot, PendingSelection},
    storage::{Commit, Storage},
    types::{
        Delivery, DeliverySubmission, EntryKind, ExtraType, IdempotencyKey, Innings,
        InningsStatus, LedgerEntry, Match, MatchId, PlayerId, Wicket,
    },
};
use std::sync::Arc;

/// Entry ready to append, with the idempotency key it claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    /// Entry
    pub entry: LedgerEntry,
    /// Idempotency key; `None` for entries the engine writes on its own
    pub key: Option<IdempotencyKey>,
}

/// Most runs a batter can be credited off one delivery
pub const MAX_RUNS_OFF_BAT: u32 = 6;

/// Check a submitted delivery against the innings and its derived context
///
/// Returns the delivery to append.
pub fn validate_delivery(
    record: &Match,
    innings: &Innings,
    snapshot: &InningsSnapshot,
    sub: &DeliverySubmission,
) -> Result<Delivery> {
    if innings.status != InningsStatus::InProgress {
        return Err(Error::Validation(format!(
            "innings {} is not in progress",
            innings.id
        )));
    }

    let batting = record
        .team(innings.batting_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.batting_team)))?;
    let bowling = record
        .team(innings.bowling_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.bowling_team)))?;

    for (role, player) in [("striker", sub.striker), ("non-striker", sub.non_striker)] {
        if !batting.contains(player) {
            return Err(Error::Validation(format!(
                "{} {} is not on the {} roster",
                role, player, batting.name
            )));
        }
    }
    if !bowling.contains(sub.bowler) {
        return Err(Error::Validation(format!(
            "bowler {} is not on the {} roster",
            sub.bowler, bowling.name
        )));
    }

    let wicket = check_shape(sub)?;

    match snapshot.pending() {
        Some(PendingSelection::Batter) => {
            return Err(Error::Sequence(
                "an incoming batter must be named before the next delivery".to_string(),
            ))
        }
        Some(PendingSelection::Bowler) => {
            return Err(Error::Sequence(
                "a bowler must be named for the new over".to_string(),
            ))
        }
        None => {}
    }

    if let Some(w) = wicket {
        if w.player != sub.striker && w.player != sub.non_striker {
            return Err(Error::Validation(format!(
                "dismissed player {} is not batting",
                w.player
            )));
        }
    }

    if snapshot.striker != Some(sub.striker) || snapshot.non_striker != Some(sub.non_striker) {
        return Err(Error::Sequence(format!(
            "batters {}/{} do not match the crease",
            sub.striker, sub.non_striker
        )));
    }
    if snapshot.bowler != Some(sub.bowler) {
        return Err(Error::Sequence(format!(
            "bowler {} is not bowling this over",
            sub.bowler
        )));
    }

    let expected = (snapshot.over, snapshot.ball_in_over + 1);
    if (sub.over, sub.ball) != expected {
        return Err(Error::Sequence(format!(
            "stale position {}.{}, next delivery is {}.{}",
            sub.over, sub.ball, expected.0, expected.1
        )));
    }

    Ok(Delivery {
        over: sub.over,
        ball: sub.ball,
        striker: sub.striker,
        non_striker: sub.non_striker,
        bowler: sub.bowler,
        runs_off_bat: sub.runs_off_bat,
        extra: sub.extra,
        extra_runs: sub.extra_runs,
        boundary: sub.boundary,
        wicket,
    })
}

/// Field-level checks that need no context
fn check_shape(sub: &DeliverySubmission) -> Result<Option<Wicket>> {
    if sub.runs_off_bat > MAX_RUNS_OFF_BAT {
        return Err(Error::Validation(format!(
            "runs off the bat must be at most {}, got {}",
            MAX_RUNS_OFF_BAT, sub.runs_off_bat
        )));
    }
    match sub.extra {
        ExtraType::None if sub.extra_runs > 0 => {
            return Err(Error::Validation(
                "extra runs recorded without an extra type".to_string(),
            ))
        }
        ExtraType::None => {}
        extra if sub.extra_runs == 0 => {
            return Err(Error::Validation(format!(
                "{:?} must carry at least one extra run",
                extra
            )))
        }
        _ => {}
    }
    if sub.extra == ExtraType::Wide && sub.runs_off_bat > 0 {
        return Err(Error::Validation(
            "a wide cannot carry runs off the bat".to_string(),
        ));
    }
    if sub.boundary && !matches!(sub.runs_off_bat, 4 | 6) {
        return Err(Error::Validation(
            "boundary flag needs four or six runs off the bat".to_string(),
        ));
    }

    match (sub.is_wicket, sub.dismissal, sub.dismissed_player) {
        (false, None, None) => Ok(None),
        (false, _, _) => Err(Error::Validation(
            "dismissal details given without the wicket flag".to_string(),
        )),
        (true, Some(kind), Some(player)) => Ok(Some(Wicket { kind, player })),
        (true, None, _) => Err(Error::Validation(
            "wicket recorded without a mode of dismissal".to_string(),
        )),
        (true, _, None) => Err(Error::Validation(
            "wicket recorded without a dismissed player".to_string(),
        )),
    }
}

/// Check a bowler named for the next over
pub fn validate_bowler_change(
    record: &Match,
    innings: &Innings,
    snapshot: &InningsSnapshot,
    bowler: PlayerId,
) -> Result<()> {
    if innings.status != InningsStatus::InProgress {
        return Err(Error::Validation(format!(
            "innings {} is not in progress",
            innings.id
        )));
    }
    let bowling = record
        .team(innings.bowling_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.bowling_team)))?;
    if !bowling.contains(bowler) {
        return Err(Error::Validation(format!(
            "bowler {} is not on the {} roster",
            bowler, bowling.name
        )));
    }
    if snapshot.deliveries_this_over != 0 || snapshot.bowler.is_some() {
        return Err(Error::Sequence(format!(
            "over {} is under way, bowler can only change at the end of an over",
            snapshot.over
        )));
    }
    if snapshot.previous_over_bowler == Some(bowler) {
        return Err(Error::Sequence(format!(
            "bowler {} bowled the previous over",
            bowler
        )));
    }
    Ok(())
}

/// Check a batter coming in after a wicket
pub fn validate_incoming_batter(
    record: &Match,
    innings: &Innings,
    snapshot: &InningsSnapshot,
    batter: PlayerId,
) -> Result<()> {
    if innings.status != InningsStatus::InProgress {
        return Err(Error::Validation(format!(
            "innings {} is not in progress",
            innings.id
        )));
    }
    let batting = record
        .team(innings.batting_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.batting_team)))?;
    if !batting.contains(batter) {
        return Err(Error::Validation(format!(
            "batter {} is not on the {} roster",
            batter, batting.name
        )));
    }
    if snapshot.batter(batter).map_or(false, |b| b.is_out()) {
        return Err(Error::Validation(format!(
            "batter {} has already been dismissed",
            batter
        )));
    }
    if snapshot.is_batting(batter) {
        return Err(Error::Validation(format!(
            "batter {} is already at the crease",
            batter
        )));
    }
    if snapshot.pending() != Some(PendingSelection::Batter) {
        return Err(Error::Sequence(
            "no vacancy at the crease".to_string(),
        ));
    }
    Ok(())
}

/// Most recent effective entry of an innings, the target of "retract last"
///
/// The opening pair cannot be retracted.
pub fn retraction_target(entries: &[LedgerEntry]) -> Result<&LedgerEntry> {
    let retracted: Vec<u64> = entries
        .iter()
        .filter_map(|e| match e.kind {
            EntryKind::Retraction { target_seq } => Some(target_seq),
            _ => None,
        })
        .collect();

    let target = entries
        .iter()
        .rev()
        .filter(|e| !matches!(e.kind, EntryKind::Retraction { .. }))
        .find(|e| !retracted.contains(&e.seq))
        .ok_or_else(|| Error::Sequence("nothing to retract".to_string()))?;

    if matches!(target.kind, EntryKind::Openers { .. }) {
        return Err(Error::Sequence(
            "the opening pair cannot be retracted".to_string(),
        ));
    }
    Ok(target)
}

/// Durable side of the ledger
pub struct DeliveryLedger {
    storage: Arc<Storage>,
}

impl std::fmt::Debug for DeliveryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryLedger").finish_non_exhaustive()
    }
}

impl DeliveryLedger {
    /// Create over a storage handle
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// All entries of one innings in insertion order
    pub fn entries(&self, match_id: MatchId, innings: u8) -> Result<Vec<LedgerEntry>> {
        self.storage.read_entries(match_id, innings)
    }

    /// Append staged entries atomically with the updated record and snapshot
    ///
    /// Returns the sequence number of the last entry written.
    pub fn append(&self, commit: &Commit<'_>) -> Result<u64> {
        for pair in commit.entries.windows(2) {
            if pair[1].entry.seq != pair[0].entry.seq + 1 {
                return Err(Error::InvariantViolation(format!(
                    "non-contiguous sequence {} after {}",
                    pair[1].entry.seq, pair[0].entry.seq
                )));
            }
        }
        self.storage.commit(commit)?;

        let last = commit.entries.last().map(|s| s.entry.seq).unwrap_or(0);
        for staged in commit.entries {
            tracing::debug!(
                match_id = %staged.entry.match_id,
                innings = staged.entry.innings,
                seq = staged.entry.seq,
                kind = ?staged.entry.kind,
                "Entry appended"
            );
        }
        Ok(last)
    }
}
