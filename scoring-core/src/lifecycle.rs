//! Innings and match lifecycle
//!
//! ```text
//! Scheduled ─► TossPending ─► InProgress(1) ─► InningsBreak ─► InProgress(2) ─► Completed
//!                                   │                                ▲
//!                                   └──────── EndMatch ──────────────┘ (no result)
//! ```
//!
//! Retracting the ball that closed an innings automatically reopens it, as
//! long as the next innings has not started.
//!
//! Every function here is pure: it checks a transition against the current
//! record and, when legal, mutates a working copy the caller owns. Nothing is
//! visible until the caller commits.

use crate::{
    error::{Error, Result},
    projector::InningsSnapshot,
    types::{
        Innings, InningsClose, InningsId, InningsStatus, Margin, Match, MatchFormat,
        MatchResult, MatchStatus, PlayerId, TeamId, TeamSheet, Toss, TossDecision,
    },
};
use chrono::{DateTime, Utc};

/// A status change, reported for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Toss opened
    TossOpened,
    /// Toss recorded, innings headers created
    TossRecorded,
    /// Innings started
    InningsStarted(u8),
    /// Innings closed
    InningsCompleted(u8, InningsClose),
    /// Automatic close taken back by a retraction
    InningsReopened(u8),
    /// Match finished
    MatchCompleted(MatchResult),
}

impl Transition {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Transition::TossOpened => "toss_opened",
            Transition::TossRecorded => "toss_recorded",
            Transition::InningsStarted(_) => "innings_started",
            Transition::InningsCompleted(..) => "innings_completed",
            Transition::InningsReopened(_) => "innings_reopened",
            Transition::MatchCompleted(_) => "match_completed",
        }
    }
}

/// Longest innings a format may allot
pub const MAX_OVERS_LIMIT: u32 = 500;

/// Longest over a format may use
pub const MAX_BALLS_PER_OVER: u32 = 10;

/// Reject formats no innings could be played under
pub fn validate_format(format: &MatchFormat) -> Result<()> {
    if !(1..=MAX_OVERS_LIMIT).contains(&format.overs_limit) {
        return Err(Error::Validation(format!(
            "overs limit must be between 1 and {}, got {}",
            MAX_OVERS_LIMIT, format.overs_limit
        )));
    }
    if !(1..=MAX_BALLS_PER_OVER).contains(&format.balls_per_over) {
        return Err(Error::Validation(format!(
            "balls per over must be between 1 and {}, got {}",
            MAX_BALLS_PER_OVER, format.balls_per_over
        )));
    }
    if format.max_wickets == 0 {
        return Err(Error::Validation("max wickets must be at least 1".to_string()));
    }
    Ok(())
}

/// Build a scheduled match record
pub fn schedule(
    id: crate::types::MatchId,
    format: MatchFormat,
    home: TeamSheet,
    away: TeamSheet,
) -> Result<Match> {
    validate_format(&format)?;
    if home.id == away.id {
        return Err(Error::Validation(format!(
            "team {} cannot play itself",
            home.id
        )));
    }
    for sheet in [&home, &away] {
        if sheet.players.len() < 2 {
            return Err(Error::Validation(format!(
                "{} needs at least two players",
                sheet.name
            )));
        }
    }
    if home.players.iter().any(|p| away.contains(p.id)) {
        return Err(Error::Validation(
            "a player cannot appear on both team sheets".to_string(),
        ));
    }
    Ok(Match::new(id, format, home, away))
}

/// Scheduled → TossPending
pub fn open_toss(record: &mut Match, now: DateTime<Utc>) -> Result<Transition> {
    if record.status != MatchStatus::Scheduled {
        return Err(Error::Sequence(format!(
            "toss can only open on a scheduled match, match is {:?}",
            record.status
        )));
    }
    record.status = MatchStatus::TossPending;
    record.updated_at = now;
    Ok(Transition::TossOpened)
}

/// Record the toss and create both innings headers
pub fn record_toss(
    record: &mut Match,
    winner: TeamId,
    decision: TossDecision,
    now: DateTime<Utc>,
) -> Result<Transition> {
    if record.status != MatchStatus::TossPending || record.toss.is_some() {
        return Err(Error::Sequence(format!(
            "toss cannot be recorded while match is {:?}",
            record.status
        )));
    }
    let loser = record
        .opponent(winner)
        .ok_or_else(|| Error::NotFound(format!("team {} is not playing", winner)))?;

    let (first, second) = match decision {
        TossDecision::Bat => (winner, loser),
        TossDecision::Bowl => (loser, winner),
    };
    record.toss = Some(Toss { winner, decision });
    record.innings = vec![
        innings_header(record, 1, first, second),
        innings_header(record, 2, second, first),
    ];
    record.updated_at = now;
    Ok(Transition::TossRecorded)
}

fn innings_header(record: &Match, number: u8, batting: TeamId, bowling: TeamId) -> Innings {
    Innings {
        id: InningsId::new(record.id, number),
        batting_team: batting,
        bowling_team: bowling,
        status: InningsStatus::NotStarted,
        closed_by: None,
    }
}

/// Check that an innings may start with the given openers and bowler
pub fn check_start(
    record: &Match,
    number: u8,
    striker: PlayerId,
    non_striker: PlayerId,
    bowler: PlayerId,
) -> Result<()> {
    match number {
        1 => {
            if record.toss.is_none() || record.status != MatchStatus::TossPending {
                return Err(Error::Sequence(
                    "innings 1 cannot start before the toss".to_string(),
                ));
            }
        }
        2 => {
            let first_done = record
                .innings(1)
                .map_or(false, |i| i.status == InningsStatus::Completed);
            if !first_done || record.status != MatchStatus::InningsBreak {
                return Err(Error::Sequence(
                    "innings 2 cannot start before innings 1 is completed".to_string(),
                ));
            }
        }
        n => return Err(Error::NotFound(format!("innings {}", n))),
    }

    let innings = record
        .innings(number)
        .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
    if innings.status != InningsStatus::NotStarted {
        return Err(Error::Sequence(format!("innings {} already started", number)));
    }

    let batting = record
        .team(innings.batting_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.batting_team)))?;
    let bowling = record
        .team(innings.bowling_team)
        .ok_or_else(|| Error::NotFound(format!("team {}", innings.bowling_team)))?;

    if striker == non_striker {
        return Err(Error::Validation("openers must be two different players".to_string()));
    }
    for opener in [striker, non_striker] {
        if !batting.contains(opener) {
            return Err(Error::Validation(format!(
                "opener {} is not on the {} roster",
                opener, batting.name
            )));
        }
    }
    if !bowling.contains(bowler) {
        return Err(Error::Validation(format!(
            "bowler {} is not on the {} roster",
            bowler, bowling.name
        )));
    }
    Ok(())
}

/// Mark an innings in progress (after [`check_start`])
pub fn start_innings(record: &mut Match, number: u8, now: DateTime<Utc>) -> Result<Transition> {
    let innings = record
        .innings_mut(number)
        .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
    innings.status = InningsStatus::InProgress;
    record.status = MatchStatus::InProgress;
    record.updated_at = now;
    Ok(Transition::InningsStarted(number))
}

/// Runs the side batting second needs (innings-1 total + 1)
pub fn target(first_innings: &InningsSnapshot) -> u32 {
    first_innings.total_runs + 1
}

/// Automatic close condition of an innings, if one holds
pub fn check_innings_end(
    format: &MatchFormat,
    snapshot: &InningsSnapshot,
    target: Option<u32>,
) -> Option<InningsClose> {
    if target.map_or(false, |t| snapshot.total_runs >= t) {
        Some(InningsClose::TargetReached)
    } else if snapshot.wickets >= format.max_wickets {
        Some(InningsClose::AllOut)
    } else if snapshot.legal_balls >= format.balls_per_innings() {
        Some(InningsClose::OversExhausted)
    } else {
        None
    }
}

/// Whether the chase is decided before its overs run out
pub fn can_finish_early(snapshot: &InningsSnapshot, format: &MatchFormat, target: u32) -> bool {
    snapshot.innings.number == 2
        && (snapshot.total_runs >= target
            || snapshot.wickets >= format.max_wickets
            || snapshot.legal_balls >= format.balls_per_innings())
}

/// Close an innings; closing innings 2 completes the match
///
/// Returns the transitions taken.
pub fn complete_innings(
    record: &mut Match,
    number: u8,
    reason: InningsClose,
    snapshots: [Option<&InningsSnapshot>; 2],
    now: DateTime<Utc>,
) -> Result<Vec<Transition>> {
    let innings = record
        .innings_mut(number)
        .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
    if innings.status != InningsStatus::InProgress {
        return Err(Error::Sequence(format!(
            "innings {} is not in progress",
            number
        )));
    }
    innings.status = InningsStatus::Completed;
    innings.closed_by = Some(reason);
    record.updated_at = now;

    let mut transitions = vec![Transition::InningsCompleted(number, reason)];
    if number == 1 {
        record.status = MatchStatus::InningsBreak;
    } else {
        let result = match snapshots {
            [Some(first), Some(second)] => decide_result(record, first, second),
            _ => MatchResult::NoResult,
        };
        record.status = MatchStatus::Completed;
        record.result = Some(result);
        transitions.push(Transition::MatchCompleted(result));
    }
    Ok(transitions)
}

/// Innings whose automatic close a retraction may take back
///
/// Only the innings that closed last qualifies, and only while nothing has
/// happened since: innings 1 during the break, innings 2 once the match is
/// complete. Declared innings stay closed.
pub fn reopenable_innings(record: &Match) -> Option<u8> {
    let number = match record.status {
        MatchStatus::InningsBreak => 1,
        MatchStatus::Completed => 2,
        _ => return None,
    };
    record
        .innings(number)
        .filter(|i| i.status == InningsStatus::Completed)
        .filter(|i| !matches!(i.closed_by, None | Some(InningsClose::Declared)))
        .map(|i| i.id.number)
}

/// Put an automatically closed innings back in progress
pub fn reopen_innings(record: &mut Match, number: u8, now: DateTime<Utc>) -> Result<Transition> {
    if reopenable_innings(record) != Some(number) {
        return Err(Error::Sequence(format!(
            "innings {} cannot be reopened while match is {:?}",
            number, record.status
        )));
    }
    let innings = record
        .innings_mut(number)
        .ok_or_else(|| Error::NotFound(format!("innings {}", number)))?;
    innings.status = InningsStatus::InProgress;
    innings.closed_by = None;
    record.status = MatchStatus::InProgress;
    record.result = None;
    record.updated_at = now;
    Ok(Transition::InningsReopened(number))
}

/// Result once both innings are closed
pub fn decide_result(
    record: &Match,
    first: &InningsSnapshot,
    second: &InningsSnapshot,
) -> MatchResult {
    if second.total_runs >= target(first) {
        MatchResult::Won {
            winner: second.batting_team,
            margin: Margin::Wickets(record.format.max_wickets.saturating_sub(second.wickets)),
        }
    } else if second.total_runs + 1 == target(first) {
        MatchResult::Tie
    } else {
        MatchResult::Won {
            winner: first.batting_team,
            margin: Margin::Runs(first.total_runs - second.total_runs),
        }
    }
}

/// Abandon a match in progress
pub fn end_match(record: &mut Match, now: DateTime<Utc>) -> Result<Vec<Transition>> {
    if record.status != MatchStatus::InProgress {
        return Err(Error::Sequence(format!(
            "match can only be ended while in progress, match is {:?}",
            record.status
        )));
    }
    let mut transitions = Vec::new();
    for innings in record.innings.iter_mut() {
        if innings.status == InningsStatus::InProgress {
            innings.status = InningsStatus::Completed;
            innings.closed_by = Some(InningsClose::Declared);
            transitions.push(Transition::InningsCompleted(innings.id.number, InningsClose::Declared));
        }
    }
    record.status = MatchStatus::Completed;
    record.result = Some(MatchResult::NoResult);
    record.updated_at = now;
    transitions.push(Transition::MatchCompleted(MatchResult::NoResult));
    Ok(transitions)
}

/// Result line for the scorecard
pub fn describe_result(record: &Match, result: &MatchResult) -> String {
    let name = |team: TeamId| {
        record
            .team(team)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| team.to_string())
    };
    match result {
        MatchResult::Won { winner, margin: Margin::Runs(n) } => {
            format!("{} won by {} run{}", name(*winner), n, plural(*n))
        }
        MatchResult::Won { winner, margin: Margin::Wickets(n) } => {
            format!("{} won by {} wicket{}", name(*winner), n, plural(*n))
        }
        MatchResult::Tie => "Match tied".to_string(),
        MatchResult::NoResult => "No result".to_string(),
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
