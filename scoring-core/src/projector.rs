//! Match state projector
//!
//! Folds an innings' ledger entries, left to right, into an
//! [`InningsSnapshot`]. The snapshot is a pure function of the ledger:
//! [`Projector::project`] replays from an empty snapshot and must always agree
//! with a snapshot advanced one entry at a time by [`Projector::advance`].
//!
//! Retraction tombstones cannot be folded incrementally (they remove an
//! earlier entry), so `advance` reports [`Advance::ReplayRequired`] for them
//! and the caller replays the innings from scratch.

use crate::error::{Error, Result};
use crate::types::{
    DismissalKind, EntryKind, ExtraType, Innings, InningsId, LedgerEntry, MatchFormat, PlayerId,
    TeamId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Batting line for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatterLine {
    /// Player
    pub player: PlayerId,
    /// Runs off the bat
    pub runs: u32,
    /// Balls faced (legal deliveries and no-balls)
    pub balls: u32,
    /// Fours
    pub fours: u32,
    /// Sixes
    pub sixes: u32,
    /// How the batter was dismissed
    pub dismissal: Option<DismissalKind>,
    /// Bowler credited with the wicket
    pub dismissed_by: Option<PlayerId>,
}

impl BatterLine {
    fn new(player: PlayerId) -> Self {
        Self {
            player,
            runs: 0,
            balls: 0,
            fours: 0,
            sixes: 0,
            dismissal: None,
            dismissed_by: None,
        }
    }

    /// Runs per hundred balls, two decimal places; zero before the first ball
    pub fn strike_rate(&self) -> Decimal {
        if self.balls == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.runs) * Decimal::ONE_HUNDRED / Decimal::from(self.balls)).round_dp(2)
    }

    /// Whether the batter is out
    pub fn is_out(&self) -> bool {
        self.dismissal.is_some()
    }
}

/// Bowling line for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlerLine {
    /// Player
    pub player: PlayerId,
    /// Legal deliveries bowled
    pub legal_balls: u32,
    /// Runs conceded (off the bat plus wides and no-balls)
    pub runs_conceded: u32,
    /// Wickets credited
    pub wickets: u32,
    /// Completed overs without a run conceded or an extra
    pub maidens: u32,
    /// Wides bowled
    pub wides: u32,
    /// No-balls bowled
    pub no_balls: u32,
}

impl BowlerLine {
    fn new(player: PlayerId) -> Self {
        Self {
            player,
            legal_balls: 0,
            runs_conceded: 0,
            wickets: 0,
            maidens: 0,
            wides: 0,
            no_balls: 0,
        }
    }

    /// Overs in `O.B` notation
    pub fn overs(&self, balls_per_over: u32) -> String {
        format_overs(self.legal_balls, balls_per_over)
    }

    /// Runs conceded per over, two decimal places
    pub fn economy(&self, balls_per_over: u32) -> Decimal {
        if self.legal_balls == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.runs_conceded) * Decimal::from(balls_per_over)
            / Decimal::from(self.legal_balls))
        .round_dp(2)
    }

    /// Runs conceded per wicket, two decimal places
    pub fn average(&self) -> Option<Decimal> {
        if self.wickets == 0 {
            return None;
        }
        Some((Decimal::from(self.runs_conceded) / Decimal::from(self.wickets)).round_dp(2))
    }
}

/// Batting partnership between two wicket falls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partnership {
    /// The pair
    pub batters: [PlayerId; 2],
    /// Runs added (including extras)
    pub runs: u32,
    /// Legal balls
    pub balls: u32,
    /// Wicket number that ended it; `None` while open
    pub ended_at_wicket: Option<u32>,
}

impl Partnership {
    fn open(first: PlayerId, second: PlayerId) -> Self {
        Self {
            batters: [first, second],
            runs: 0,
            balls: 0,
            ended_at_wicket: None,
        }
    }

    /// Whether the pair is still together
    pub fn is_open(&self) -> bool {
        self.ended_at_wicket.is_none()
    }
}

/// Extras breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extras {
    /// Wides
    pub wides: u32,
    /// No-balls
    pub no_balls: u32,
    /// Byes
    pub byes: u32,
    /// Leg-byes
    pub leg_byes: u32,
    /// Penalty runs
    pub penalties: u32,
}

impl Extras {
    /// Sum of all extras
    pub fn total(&self) -> u32 {
        self.wides + self.no_balls + self.byes + self.leg_byes + self.penalties
    }

    fn add(&mut self, extra: ExtraType, runs: u32) {
        match extra {
            ExtraType::None => {}
            ExtraType::Wide => self.wides += runs,
            ExtraType::NoBall => self.no_balls += runs,
            ExtraType::Bye => self.byes += runs,
            ExtraType::LegBye => self.leg_byes += runs,
            ExtraType::Penalty => self.penalties += runs,
        }
    }
}

/// Fall of a wicket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallOfWicket {
    /// Wicket number (1-based)
    pub wicket: u32,
    /// Batter out
    pub player: PlayerId,
    /// Team score when it fell
    pub score: u32,
    /// Legal balls bowled when it fell
    pub legal_balls: u32,
}

/// Input the scorer must provide before the next delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingSelection {
    /// A crease slot is vacant after a wicket
    Batter,
    /// No bowler for the current over
    Bowler,
}

/// Projected state of one innings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsSnapshot {
    /// Innings
    pub innings: InningsId,
    /// Batting side
    pub batting_team: TeamId,
    /// Fielding side
    pub bowling_team: TeamId,
    /// Legal deliveries per over
    pub balls_per_over: u32,

    /// Innings total
    pub total_runs: u32,
    /// Wickets fallen
    pub wickets: u32,
    /// Legal deliveries bowled
    pub legal_balls: u32,
    /// Completed overs
    pub over: u32,
    /// Legal deliveries in the current over
    pub ball_in_over: u32,
    /// All deliveries (including wides and no-balls) in the current over
    pub deliveries_this_over: u32,
    /// Runs (including extras) in the current over
    pub runs_this_over: u32,
    /// Extras breakdown
    pub extras: Extras,

    /// Batting lines in order of appearance
    pub batters: Vec<BatterLine>,
    /// Bowling lines in order of first over
    pub bowlers: Vec<BowlerLine>,
    /// Partnerships, the last one open unless a slot is vacant
    pub partnerships: Vec<Partnership>,
    /// Fall of wickets
    pub fall_of_wickets: Vec<FallOfWicket>,

    /// Batter on strike
    pub striker: Option<PlayerId>,
    /// Batter at the other end
    pub non_striker: Option<PlayerId>,
    /// Bowler of the current over
    pub bowler: Option<PlayerId>,
    /// Bowler of the last completed over
    pub previous_over_bowler: Option<PlayerId>,

    /// Sequence of the last folded entry
    pub last_seq: u64,
    /// Deliveries folded
    pub deliveries: u32,
}

impl InningsSnapshot {
    /// Batting line of a player
    pub fn batter(&self, player: PlayerId) -> Option<&BatterLine> {
        self.batters.iter().find(|b| b.player == player)
    }

    /// Bowling line of a player
    pub fn bowler_line(&self, player: PlayerId) -> Option<&BowlerLine> {
        self.bowlers.iter().find(|b| b.player == player)
    }

    /// Whether the player is at the crease
    pub fn is_batting(&self, player: PlayerId) -> bool {
        self.striker == Some(player) || self.non_striker == Some(player)
    }

    /// Open partnership, if any
    pub fn current_partnership(&self) -> Option<&Partnership> {
        self.partnerships.last().filter(|p| p.is_open())
    }

    /// Selection the scorer owes before the next delivery
    pub fn pending(&self) -> Option<PendingSelection> {
        if self.striker.is_none() || self.non_striker.is_none() {
            Some(PendingSelection::Batter)
        } else if self.bowler.is_none() {
            Some(PendingSelection::Bowler)
        } else {
            None
        }
    }

    /// An over has been completed and its successor still needs a bowler
    ///
    /// Clears as soon as the next bowler is named.
    pub fn is_over_complete(&self) -> bool {
        self.legal_balls > 0 && self.ball_in_over == 0 && self.bowler.is_none()
    }

    /// Innings overs in `O.B` notation
    pub fn overs(&self) -> String {
        format!("{}.{}", self.over, self.ball_in_over)
    }

    /// Sum of batters' runs
    pub fn batter_runs(&self) -> u32 {
        self.batters.iter().map(|b| b.runs).sum()
    }

    fn batter_mut(&mut self, player: PlayerId) -> &mut BatterLine {
        let index = match self.batters.iter().position(|b| b.player == player) {
            Some(index) => index,
            None => {
                self.batters.push(BatterLine::new(player));
                self.batters.len() - 1
            }
        };
        &mut self.batters[index]
    }

    fn bowler_mut(&mut self, player: PlayerId) -> &mut BowlerLine {
        let index = match self.bowlers.iter().position(|b| b.player == player) {
            Some(index) => index,
            None => {
                self.bowlers.push(BowlerLine::new(player));
                self.bowlers.len() - 1
            }
        };
        &mut self.bowlers[index]
    }

    fn open_partnership(&mut self) {
        if let (Some(striker), Some(non_striker)) = (self.striker, self.non_striker) {
            self.partnerships.push(Partnership::open(striker, non_striker));
        }
    }

    fn swap_strike(&mut self) {
        std::mem::swap(&mut self.striker, &mut self.non_striker);
    }
}

/// Outcome of folding one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Entry folded into the snapshot
    Applied,
    /// Entry is a retraction; replay the innings
    ReplayRequired,
}

/// Deterministic projection of the delivery ledger
#[derive(Debug)]
pub struct Projector;

impl Projector {
    /// Snapshot of an innings before any entry
    pub fn empty(innings: &Innings, format: &MatchFormat) -> InningsSnapshot {
        InningsSnapshot {
            innings: innings.id,
            batting_team: innings.batting_team,
            bowling_team: innings.bowling_team,
            balls_per_over: format.balls_per_over,
            total_runs: 0,
            wickets: 0,
            legal_balls: 0,
            over: 0,
            ball_in_over: 0,
            deliveries_this_over: 0,
            runs_this_over: 0,
            extras: Extras::default(),
            batters: Vec::new(),
            bowlers: Vec::new(),
            partnerships: Vec::new(),
            fall_of_wickets: Vec::new(),
            striker: None,
            non_striker: None,
            bowler: None,
            previous_over_bowler: None,
            last_seq: 0,
            deliveries: 0,
        }
    }

    /// Replay an innings from scratch, honouring retraction tombstones
    pub fn project(
        innings: &Innings,
        format: &MatchFormat,
        entries: &[LedgerEntry],
    ) -> Result<InningsSnapshot> {
        let retracted: HashSet<u64> = entries
            .iter()
            .filter_map(|e| match e.kind {
                EntryKind::Retraction { target_seq } => Some(target_seq),
                _ => None,
            })
            .collect();

        let mut snapshot = Self::empty(innings, format);
        let mut last_seq = 0;
        for entry in entries {
            if entry.innings != innings.id.number {
                return Err(Error::InvariantViolation(format!(
                    "entry {} belongs to innings {}, not {}",
                    entry.seq, entry.innings, innings.id.number
                )));
            }
            if entry.seq <= last_seq {
                return Err(Error::InvariantViolation(format!(
                    "entry {} out of order after {}",
                    entry.seq, last_seq
                )));
            }
            last_seq = entry.seq;

            if retracted.contains(&entry.seq) || matches!(entry.kind, EntryKind::Retraction { .. }) {
                continue;
            }
            fold(&mut snapshot, entry);
        }
        snapshot.last_seq = last_seq;
        Ok(snapshot)
    }

    /// Fold one newly appended entry into a snapshot
    pub fn advance(snapshot: &mut InningsSnapshot, entry: &LedgerEntry) -> Result<Advance> {
        if entry.innings != snapshot.innings.number {
            return Err(Error::InvariantViolation(format!(
                "entry {} belongs to innings {}, not {}",
                entry.seq, entry.innings, snapshot.innings.number
            )));
        }
        if entry.seq <= snapshot.last_seq {
            return Err(Error::InvariantViolation(format!(
                "entry {} already folded (last {})",
                entry.seq, snapshot.last_seq
            )));
        }
        if matches!(entry.kind, EntryKind::Retraction { .. }) {
            return Ok(Advance::ReplayRequired);
        }
        fold(snapshot, entry);
        snapshot.last_seq = entry.seq;
        Ok(Advance::Applied)
    }
}

fn fold(s: &mut InningsSnapshot, entry: &LedgerEntry) {
    match entry.kind {
        EntryKind::Openers { striker, non_striker } => {
            s.striker = Some(striker);
            s.non_striker = Some(non_striker);
            s.batter_mut(striker);
            s.batter_mut(non_striker);
            s.open_partnership();
        }
        EntryKind::BowlerIn { bowler } => {
            s.bowler = Some(bowler);
            s.bowler_mut(bowler);
        }
        EntryKind::BatterIn { batter } => {
            if s.striker.is_none() {
                s.striker = Some(batter);
            } else if s.non_striker.is_none() {
                s.non_striker = Some(batter);
            }
            s.batter_mut(batter);
            s.open_partnership();
        }
        EntryKind::Ball(d) => {
            let runs = d.total_runs();
            s.total_runs += runs;
            s.runs_this_over += runs;
            s.deliveries_this_over += 1;
            s.deliveries += 1;
            s.extras.add(d.extra, d.extra_runs);

            {
                let boundary = d.is_boundary();
                let batter = s.batter_mut(d.striker);
                batter.runs += d.runs_off_bat;
                if d.extra != ExtraType::Wide {
                    batter.balls += 1;
                }
                if boundary {
                    match d.runs_off_bat {
                        4 => batter.fours += 1,
                        6 => batter.sixes += 1,
                        _ => {}
                    }
                }
            }

            {
                let bowler = s.bowler_mut(d.bowler);
                bowler.runs_conceded += d.runs_conceded();
                match d.extra {
                    ExtraType::Wide => bowler.wides += 1,
                    ExtraType::NoBall => bowler.no_balls += 1,
                    _ => {}
                }
                if d.is_legal() {
                    bowler.legal_balls += 1;
                }
            }

            if let Some(p) = s.partnerships.last_mut().filter(|p| p.is_open()) {
                p.runs += runs;
                if d.is_legal() {
                    p.balls += 1;
                }
            }

            if d.is_legal() {
                s.ball_in_over += 1;
                s.legal_balls += 1;
            }

            if let Some(wicket) = d.wicket {
                s.wickets += 1;
                let number = s.wickets;
                let credited = wicket.kind.credited_to_bowler();
                {
                    let batter = s.batter_mut(wicket.player);
                    batter.dismissal = Some(wicket.kind);
                    batter.dismissed_by = credited.then_some(d.bowler);
                }
                if credited {
                    s.bowler_mut(d.bowler).wickets += 1;
                }
                if let Some(p) = s.partnerships.last_mut().filter(|p| p.is_open()) {
                    p.ended_at_wicket = Some(number);
                }
                let (score, legal_balls) = (s.total_runs, s.legal_balls);
                s.fall_of_wickets.push(FallOfWicket {
                    wicket: number,
                    player: wicket.player,
                    score,
                    legal_balls,
                });
                if s.striker == Some(wicket.player) {
                    s.striker = None;
                } else if s.non_striker == Some(wicket.player) {
                    s.non_striker = None;
                }
            }

            if d.runs_crossed() % 2 == 1 {
                s.swap_strike();
            }

            if d.is_legal() && s.ball_in_over == s.balls_per_over {
                if s.runs_this_over == 0 {
                    s.bowler_mut(d.bowler).maidens += 1;
                }
                s.over += 1;
                s.ball_in_over = 0;
                s.deliveries_this_over = 0;
                s.runs_this_over = 0;
                s.swap_strike();
                s.previous_over_bowler = Some(d.bowler);
                s.bowler = None;
            }
        }
        EntryKind::Retraction { .. } => {}
    }
}

/// Balls rendered as `O.B`
pub fn format_overs(legal_balls: u32, balls_per_over: u32) -> String {
    if balls_per_over == 0 {
        return "0.0".to_string();
    }
    format!("{}.{}", legal_balls / balls_per_over, legal_balls % balls_per_over)
}
