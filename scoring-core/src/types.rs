//! Core types for the scoring engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Cheap cloning into published read views
//! - Integer arithmetic only (runs, balls and wickets never need fractions)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Match identifier (assigned by the fixtures service)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(u64);

impl MatchId {
    /// Create new match ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(u64);

impl TeamId {
    /// Create new team ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(u64);

impl PlayerId {
    /// Create new player ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Innings identifier: the match plus the innings sequence number (1 or 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InningsId {
    /// Owning match
    pub match_id: MatchId,
    /// Sequence number within the match
    pub number: u8,
}

impl InningsId {
    /// Create new innings ID
    pub fn new(match_id: MatchId, number: u8) -> Self {
        Self { match_id, number }
    }
}

impl fmt::Display for InningsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.match_id, self.number)
    }
}

/// Playing conditions for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFormat {
    /// Overs allotted to each innings
    pub overs_limit: u32,

    /// Legal deliveries per over
    pub balls_per_over: u32,

    /// Wickets that end an innings (all out)
    pub max_wickets: u32,
}

impl MatchFormat {
    /// Legal deliveries available to one innings
    pub fn balls_per_innings(&self) -> u32 {
        self.overs_limit.saturating_mul(self.balls_per_over)
    }
}

impl Default for MatchFormat {
    fn default() -> Self {
        Self {
            overs_limit: 20,
            balls_per_over: 6,
            max_wickets: 10,
        }
    }
}

/// A player on a team sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    /// Player ID
    pub id: PlayerId,
    /// Display name
    pub name: String,
}

impl PlayerEntry {
    /// Create new player entry
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(id),
            name: name.into(),
        }
    }
}

/// Team sheet: the team and its playing roster for one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSheet {
    /// Team ID
    pub id: TeamId,
    /// Display name
    pub name: String,
    /// Playing roster
    pub players: Vec<PlayerEntry>,
}

impl TeamSheet {
    /// Create new team sheet
    pub fn new(id: u64, name: impl Into<String>, players: Vec<PlayerEntry>) -> Self {
        Self {
            id: TeamId::new(id),
            name: name.into(),
            players,
        }
    }

    /// Whether the player is on this roster
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == player)
    }

    /// Name of a rostered player
    pub fn player_name(&self, player: PlayerId) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.id == player)
            .map(|p| p.name.as_str())
    }
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MatchStatus {
    /// Fixture created
    Scheduled = 1,
    /// Teams at the ground, toss not yet recorded
    TossPending = 2,
    /// An innings is being scored
    InProgress = 3,
    /// Between innings 1 and innings 2
    InningsBreak = 4,
    /// Match over (terminal)
    Completed = 5,
}

/// Toss decision of the winning captain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TossDecision {
    /// Toss winner bats first
    Bat,
    /// Toss winner bowls first
    Bowl,
}

impl fmt::Display for TossDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TossDecision::Bat => write!(f, "bat"),
            TossDecision::Bowl => write!(f, "bowl"),
        }
    }
}

/// Recorded toss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toss {
    /// Team that won the toss
    pub winner: TeamId,
    /// What the winner elected to do
    pub decision: TossDecision,
}

/// Innings status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InningsStatus {
    /// Created at the toss, no ball bowled
    NotStarted = 1,
    /// Being scored
    InProgress = 2,
    /// Closed (terminal)
    Completed = 3,
}

/// Why an innings closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InningsClose {
    /// Configured number of wickets fell
    AllOut,
    /// Overs limit reached
    OversExhausted,
    /// Chasing side passed the target
    TargetReached,
    /// Closed by the scorer (declaration or abandonment)
    Declared,
}

impl fmt::Display for InningsClose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InningsClose::AllOut => "all out",
            InningsClose::OversExhausted => "overs exhausted",
            InningsClose::TargetReached => "target reached",
            InningsClose::Declared => "declared",
        };
        f.write_str(text)
    }
}

/// Innings header. Runs, wickets and balls live in the projected snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Innings {
    /// Innings ID
    pub id: InningsId,
    /// Batting side
    pub batting_team: TeamId,
    /// Fielding side
    pub bowling_team: TeamId,
    /// Current status
    pub status: InningsStatus,
    /// Reason the innings closed
    pub closed_by: Option<InningsClose>,
}

/// Winning margin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Margin {
    /// Side batting first defended its total
    Runs(u32),
    /// Chasing side reached the target
    Wickets(u32),
}

/// Final match result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    /// One side won
    Won {
        /// Winning team
        winner: TeamId,
        /// Winning margin
        margin: Margin,
    },
    /// Scores level after both innings
    Tie,
    /// Match ended before a result was possible
    NoResult,
}

/// Match record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Match ID
    pub id: MatchId,

    /// Playing conditions
    pub format: MatchFormat,

    /// The two sides (home first)
    pub teams: [TeamSheet; 2],

    /// Lifecycle status
    pub status: MatchStatus,

    /// Toss, once recorded
    pub toss: Option<Toss>,

    /// Innings headers, created at the toss decision
    pub innings: Vec<Innings>,

    /// Result, once the match is complete
    pub result: Option<MatchResult>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Create a scheduled match
    pub fn new(id: MatchId, format: MatchFormat, home: TeamSheet, away: TeamSheet) -> Self {
        let now = Utc::now();
        Self {
            id,
            format,
            teams: [home, away],
            status: MatchStatus::Scheduled,
            toss: None,
            innings: Vec::new(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Team sheet by ID
    pub fn team(&self, team: TeamId) -> Option<&TeamSheet> {
        self.teams.iter().find(|t| t.id == team)
    }

    /// The side that is not `team`
    pub fn opponent(&self, team: TeamId) -> Option<TeamId> {
        match (self.teams[0].id, self.teams[1].id) {
            (a, b) if a == team => Some(b),
            (a, b) if b == team => Some(a),
            _ => None,
        }
    }

    /// Innings header by sequence number
    pub fn innings(&self, number: u8) -> Option<&Innings> {
        self.innings.iter().find(|i| i.id.number == number)
    }

    /// Mutable innings header by sequence number
    pub fn innings_mut(&mut self, number: u8) -> Option<&mut Innings> {
        self.innings.iter_mut().find(|i| i.id.number == number)
    }

    /// The innings currently being scored
    pub fn live_innings(&self) -> Option<&Innings> {
        self.innings
            .iter()
            .find(|i| i.status == InningsStatus::InProgress)
    }

    /// "Home vs Away" label
    pub fn label(&self) -> String {
        format!("{} vs {}", self.teams[0].name, self.teams[1].name)
    }

    /// Resolve a player's name from either team sheet
    pub fn player_name(&self, player: PlayerId) -> Option<&str> {
        self.teams.iter().find_map(|t| t.player_name(player))
    }

    /// Check if match is in terminal state
    pub fn is_terminal(&self) -> bool {
        self.status == MatchStatus::Completed
    }
}

/// Extra classification of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExtraType {
    /// No extra
    None = 0,
    /// Wide (ball does not count)
    Wide = 1,
    /// No-ball (ball does not count)
    NoBall = 2,
    /// Bye
    Bye = 3,
    /// Leg-bye
    LegBye = 4,
    /// Penalty runs
    Penalty = 5,
}

impl ExtraType {
    /// Wides and no-balls must be re-bowled
    pub fn voids_ball(&self) -> bool {
        matches!(self, ExtraType::Wide | ExtraType::NoBall)
    }

    /// Extras charged to the bowler's analysis
    pub fn charged_to_bowler(&self) -> bool {
        matches!(self, ExtraType::Wide | ExtraType::NoBall)
    }
}

/// Mode of dismissal. Codes follow the scoring app's dismissal picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DismissalKind {
    /// Bowled
    Bowled = 1,
    /// Caught
    Caught = 2,
    /// Leg before wicket
    Lbw = 3,
    /// Run out
    RunOut = 4,
    /// Stumped
    Stumped = 5,
    /// Retired
    Retired = 6,
    /// Hit the ball twice
    HitTheBallTwice = 7,
    /// Hit wicket
    HitWicket = 8,
    /// Obstructing the field
    ObstructingTheField = 9,
    /// Timed out
    TimedOut = 10,
    /// Handled the ball
    HandledTheBall = 11,
}

impl DismissalKind {
    /// Numeric code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse from numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        let kind = match code {
            1 => DismissalKind::Bowled,
            2 => DismissalKind::Caught,
            3 => DismissalKind::Lbw,
            4 => DismissalKind::RunOut,
            5 => DismissalKind::Stumped,
            6 => DismissalKind::Retired,
            7 => DismissalKind::HitTheBallTwice,
            8 => DismissalKind::HitWicket,
            9 => DismissalKind::ObstructingTheField,
            10 => DismissalKind::TimedOut,
            11 => DismissalKind::HandledTheBall,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether the wicket goes into the bowler's analysis
    pub fn credited_to_bowler(&self) -> bool {
        matches!(
            self,
            DismissalKind::Bowled
                | DismissalKind::Caught
                | DismissalKind::Lbw
                | DismissalKind::Stumped
                | DismissalKind::HitWicket
                | DismissalKind::HitTheBallTwice
        )
    }

    /// Scorecard text
    pub fn label(&self) -> &'static str {
        match self {
            DismissalKind::Bowled => "bowled",
            DismissalKind::Caught => "caught",
            DismissalKind::Lbw => "lbw",
            DismissalKind::RunOut => "run out",
            DismissalKind::Stumped => "stumped",
            DismissalKind::Retired => "retired",
            DismissalKind::HitTheBallTwice => "hit the ball twice",
            DismissalKind::HitWicket => "hit wicket",
            DismissalKind::ObstructingTheField => "obstructing the field",
            DismissalKind::TimedOut => "timed out",
            DismissalKind::HandledTheBall => "handled the ball",
        }
    }
}

/// A fallen wicket attached to a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wicket {
    /// Mode of dismissal
    pub kind: DismissalKind,
    /// Batter given out (striker or non-striker)
    pub player: PlayerId,
}

/// One bowled ball and its recorded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Over index (0-based; completed overs before this ball)
    pub over: u32,

    /// Ball number within the over (1-based, legal balls only advance it)
    pub ball: u32,

    /// Batter on strike
    pub striker: PlayerId,

    /// Batter at the other end
    pub non_striker: PlayerId,

    /// Bowler
    pub bowler: PlayerId,

    /// Runs scored off the bat
    pub runs_off_bat: u32,

    /// Extra classification
    pub extra: ExtraType,

    /// Extra runs (for wides/no-balls this includes the one-run penalty)
    pub extra_runs: u32,

    /// Boundary flag, required for a no-ball four/six to count as a boundary
    pub boundary: bool,

    /// Wicket, if one fell
    pub wicket: Option<Wicket>,
}

impl Delivery {
    /// Whether the ball counts towards the over
    pub fn is_legal(&self) -> bool {
        !self.extra.voids_ball()
    }

    /// Runs added to the innings total
    pub fn total_runs(&self) -> u32 {
        self.runs_off_bat + self.extra_runs
    }

    /// Runs charged to the bowler
    pub fn runs_conceded(&self) -> u32 {
        if self.extra.charged_to_bowler() {
            self.runs_off_bat + self.extra_runs
        } else {
            self.runs_off_bat
        }
    }

    /// Runs the batters ran or were awarded while crossing
    ///
    /// The one-run penalty of a wide or no-ball is not run; anything above
    /// it was. Byes, leg-byes and penalties never move the batters.
    pub fn runs_crossed(&self) -> u32 {
        match self.extra {
            ExtraType::Wide | ExtraType::NoBall => {
                self.runs_off_bat + self.extra_runs.saturating_sub(1)
            }
            _ => self.runs_off_bat,
        }
    }

    /// Whether the runs off the bat count as a four or six
    pub fn is_boundary(&self) -> bool {
        if !matches!(self.runs_off_bat, 4 | 6) {
            return false;
        }
        match self.extra {
            ExtraType::Bye | ExtraType::LegBye | ExtraType::Wide => false,
            ExtraType::NoBall => self.boundary,
            ExtraType::None | ExtraType::Penalty => true,
        }
    }
}

/// Ledger entry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Opening pair walks out
    Openers {
        /// Opening striker
        striker: PlayerId,
        /// Opening non-striker
        non_striker: PlayerId,
    },
    /// Bowler takes the next over
    BowlerIn {
        /// Incoming bowler
        bowler: PlayerId,
    },
    /// Batter replaces a dismissed one
    BatterIn {
        /// Incoming batter
        batter: PlayerId,
    },
    /// A delivery
    Ball(Delivery),
    /// Tombstone excluding an earlier entry from projections
    Retraction {
        /// Sequence number of the retracted entry
        target_seq: u64,
    },
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Per-match insertion sequence (starts at 1)
    pub seq: u64,

    /// Owning match
    pub match_id: MatchId,

    /// Innings sequence number
    pub innings: u8,

    /// Scorer-supplied submission nonce
    pub nonce: Uuid,

    /// When the entry was appended
    pub recorded_at: DateTime<Utc>,

    /// Payload
    pub kind: EntryKind,
}

impl LedgerEntry {
    /// Innings this entry belongs to
    pub fn innings_id(&self) -> InningsId {
        InningsId::new(self.match_id, self.innings)
    }

    /// Delivery payload, if any
    pub fn delivery(&self) -> Option<&Delivery> {
        match &self.kind {
            EntryKind::Ball(d) => Some(d),
            _ => None,
        }
    }
}

/// Idempotency key of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Innings the submission targeted
    pub innings: InningsId,
    /// Over at submission time
    pub over: u32,
    /// Ball-in-over at submission time
    pub ball: u32,
    /// Submission nonce
    pub nonce: Uuid,
}

/// A delivery as submitted by the scorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySubmission {
    /// Submission nonce (idempotency)
    pub nonce: Uuid,

    /// Over the scorer believes is being bowled (0-based)
    pub over: u32,

    /// Ball number the scorer believes is being bowled (1-based)
    pub ball: u32,

    /// Batter on strike
    pub striker: PlayerId,

    /// Batter at the other end
    pub non_striker: PlayerId,

    /// Bowler
    pub bowler: PlayerId,

    /// Runs off the bat
    pub runs_off_bat: u32,

    /// Extra classification
    pub extra: ExtraType,

    /// Extra runs
    pub extra_runs: u32,

    /// Boundary flag
    #[serde(default)]
    pub boundary: bool,

    /// Wicket flag
    #[serde(default)]
    pub is_wicket: bool,

    /// Mode of dismissal (with the wicket flag)
    #[serde(default)]
    pub dismissal: Option<DismissalKind>,

    /// Dismissed batter (with the wicket flag)
    #[serde(default)]
    pub dismissed_player: Option<PlayerId>,
}

impl DeliverySubmission {
    /// A dot ball at the given position
    pub fn dot(over: u32, ball: u32, striker: PlayerId, non_striker: PlayerId, bowler: PlayerId) -> Self {
        Self {
            nonce: Uuid::new_v4(),
            over,
            ball,
            striker,
            non_striker,
            bowler,
            runs_off_bat: 0,
            extra: ExtraType::None,
            extra_runs: 0,
            boundary: false,
            is_wicket: false,
            dismissal: None,
            dismissed_player: None,
        }
    }

    /// Set runs off the bat
    pub fn with_runs(mut self, runs: u32) -> Self {
        self.runs_off_bat = runs;
        self
    }

    /// Set an extra
    pub fn with_extra(mut self, extra: ExtraType, runs: u32) -> Self {
        self.extra = extra;
        self.extra_runs = runs;
        self
    }

    /// Mark a wicket
    pub fn with_wicket(mut self, kind: DismissalKind, player: PlayerId) -> Self {
        self.is_wicket = true;
        self.dismissal = Some(kind);
        self.dismissed_player = Some(player);
        self
    }
}
