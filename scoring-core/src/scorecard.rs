//! Scorecard aggregation
//!
//! Read-only views built from a published [`MatchView`]. Nothing here mutates
//! state; an innings in progress renders as it stands, and innings 2 is
//! never assumed to exist.

use crate::{
    error::Result,
    lifecycle,
    projector::{format_overs, Extras, InningsSnapshot, PendingSelection},
    state::MatchView,
    types::{DismissalKind, Match, MatchStatus, PlayerId, TeamId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Batter at the crease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreaseBatter {
    /// Player id
    pub player: PlayerId,
    /// Name from the team sheet
    pub name: String,
    /// Runs scored
    pub runs: u32,
    /// Balls faced
    pub balls: u32,
    /// Facing the next ball
    pub on_strike: bool,
}

/// Bowler figures for the live view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlerFigures {
    /// Player id
    pub player: PlayerId,
    /// Name from the team sheet
    pub name: String,
    /// Overs in `O.B` notation
    pub overs: String,
    /// Runs conceded
    pub runs: u32,
    /// Wickets credited
    pub wickets: u32,
}

/// Live state of the current innings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsState {
    /// "Home vs Away"
    pub label: String,
    /// Innings number
    pub innings: u8,
    /// Batting side
    pub batting_team: String,
    /// Batters at the crease, striker first
    pub batters: Vec<CreaseBatter>,
    /// Current bowler, if one is named
    pub bowler: Option<BowlerFigures>,
    /// Everyone who has bowled, in order of first over
    pub bowlers: Vec<BowlerFigures>,
    /// Innings total
    pub total_runs: u32,
    /// Wickets fallen
    pub wickets: u32,
    /// Completed overs
    pub overs: u32,
    /// Legal balls in the current over
    pub balls_in_over: u32,
    /// Runs needed to win, innings 2 only
    pub target: Option<u32>,
    /// Selection owed before the next delivery
    pub pending: Option<PendingSelection>,
    /// Ledger head the view was built from
    pub head_seq: u64,
}

/// Overs allotted against overs bowled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsCompletion {
    /// Overs allotted by the format
    pub decided_overs: u32,
    /// Completed overs
    pub bowled_overs: u32,
    /// Legal balls in the over under way
    pub balls_in_over: u32,
    /// Innings closed
    pub completed: bool,
}

/// Batting card row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattingRow {
    /// Player id
    pub player: PlayerId,
    /// Name from the team sheet
    pub name: String,
    /// Runs scored
    pub runs: u32,
    /// Balls faced
    pub balls: u32,
    /// Fours
    pub fours: u32,
    /// Sixes
    pub sixes: u32,
    /// Runs per 100 balls, 2 dp
    pub strike_rate: Decimal,
    /// How out, or "not out"
    pub dismissal: String,
}

/// Bowling card row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlingRow {
    /// Player id
    pub player: PlayerId,
    /// Name from the team sheet
    pub name: String,
    /// Overs in `O.B` notation
    pub overs: String,
    /// Maiden overs
    pub maidens: u32,
    /// Runs conceded
    pub runs: u32,
    /// Wickets credited
    pub wickets: u32,
    /// Runs per over, 2 dp
    pub economy: Decimal,
    /// Runs per wicket, none without a wicket
    pub average: Option<Decimal>,
    /// Wides bowled
    pub wides: u32,
    /// No-balls bowled
    pub no_balls: u32,
}

/// Partnership row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipRow {
    /// For which wicket (1-based)
    pub wicket: u32,
    /// Both batters, in order of arrival
    pub batters: [String; 2],
    /// Runs added
    pub runs: u32,
    /// Legal balls
    pub balls: u32,
    /// Still together
    pub unbroken: bool,
}

/// Fall of wicket row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallOfWicketRow {
    /// Wicket number
    pub wicket: u32,
    /// Batter out
    pub name: String,
    /// Team score at the fall
    pub score: u32,
    /// Innings overs at the fall
    pub overs: String,
}

/// Innings totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsSummary {
    /// Innings total
    pub total_runs: u32,
    /// Wickets fallen
    pub wickets: u32,
    /// Overs in `O.B` notation
    pub overs: String,
    /// Extras breakdown
    pub extras: Extras,
    /// Sum of extras
    pub total_extras: u32,
    /// Runs per over, 2 dp
    pub run_rate: Decimal,
}

/// One innings of the scorecard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsCard {
    /// Innings number
    pub number: u8,
    /// Batting side
    pub batting_team: String,
    /// Batting card
    pub batting: Vec<BattingRow>,
    /// Bowling card
    pub bowling: Vec<BowlingRow>,
    /// Partnerships, first wicket first
    pub partnerships: Vec<PartnershipRow>,
    /// Fall of wickets
    pub fall_of_wickets: Vec<FallOfWicketRow>,
    /// Totals
    pub summary: InningsSummary,
}

/// Full match scorecard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorecard {
    /// Whether innings 1 / innings 2 have data
    pub availability: [bool; 2],
    /// "Home vs Away"
    pub label: String,
    /// Toss line, once recorded
    pub toss: Option<String>,
    /// Cards for innings 1 and 2
    pub innings: [Option<InningsCard>; 2],
    /// Result line, once decided
    pub result: Option<String>,
}

impl Scorecard {
    /// Render as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds read-side DTOs from snapshots
#[derive(Debug)]
pub struct ScorecardAggregator;

impl ScorecardAggregator {
    /// Live state of the current (or most recent) innings
    pub fn innings_state(view: &MatchView) -> Option<InningsState> {
        let record = &view.record;
        let snap = view.current()?;
        let bpo = snap.balls_per_over;

        let crease = [(snap.striker, true), (snap.non_striker, false)];
        let batters = crease
            .iter()
            .filter_map(|(player, on_strike)| {
                let line = snap.batter((*player)?)?;
                Some(CreaseBatter {
                    player: line.player,
                    name: name(record, line.player),
                    runs: line.runs,
                    balls: line.balls,
                    on_strike: *on_strike,
                })
            })
            .collect();

        let figures = |player: PlayerId| {
            snap.bowler_line(player).map(|line| BowlerFigures {
                player,
                name: name(record, player),
                overs: line.overs(bpo),
                runs: line.runs_conceded,
                wickets: line.wickets,
            })
        };

        Some(InningsState {
            label: record.label(),
            innings: snap.innings.number,
            batting_team: team_name(record, snap.batting_team),
            batters,
            bowler: snap.bowler.and_then(figures),
            bowlers: snap.bowlers.iter().filter_map(|b| figures(b.player)).collect(),
            total_runs: snap.total_runs,
            wickets: snap.wickets,
            overs: snap.over,
            balls_in_over: snap.ball_in_over,
            target: match snap.innings.number {
                2 => view.target(),
                _ => None,
            },
            pending: snap.pending(),
            head_seq: view.head_seq,
        })
    }

    /// Decided overs against bowled overs for the current innings
    pub fn innings_completion(view: &MatchView) -> Option<InningsCompletion> {
        let snap = view.current()?;
        let completed = view
            .record
            .innings(snap.innings.number)
            .map_or(false, |i| i.closed_by.is_some());
        Some(InningsCompletion {
            decided_overs: view.record.format.overs_limit,
            bowled_overs: snap.over,
            balls_in_over: snap.ball_in_over,
            completed,
        })
    }

    /// Side batting in innings 2, once the toss fixed it
    pub fn second_innings_batting_team(view: &MatchView) -> Option<TeamId> {
        view.record.innings(2).map(|i| i.batting_team)
    }

    /// Batting card
    pub fn batting_card(record: &Match, snap: &InningsSnapshot) -> Vec<BattingRow> {
        snap.batters
            .iter()
            .map(|line| BattingRow {
                player: line.player,
                name: name(record, line.player),
                runs: line.runs,
                balls: line.balls,
                fours: line.fours,
                sixes: line.sixes,
                strike_rate: line.strike_rate(),
                dismissal: match line.dismissal {
                    None => "not out".to_string(),
                    Some(kind) => dismissal_text(record, kind, line.dismissed_by),
                },
            })
            .collect()
    }

    /// Bowling card
    pub fn bowling_card(record: &Match, snap: &InningsSnapshot) -> Vec<BowlingRow> {
        let bpo = snap.balls_per_over;
        snap.bowlers
            .iter()
            .filter(|line| line.legal_balls > 0 || line.runs_conceded > 0)
            .map(|line| BowlingRow {
                player: line.player,
                name: name(record, line.player),
                overs: line.overs(bpo),
                maidens: line.maidens,
                runs: line.runs_conceded,
                wickets: line.wickets,
                economy: line.economy(bpo),
                average: line.average(),
                wides: line.wides,
                no_balls: line.no_balls,
            })
            .collect()
    }

    /// Partnerships in wicket order
    pub fn partnerships(record: &Match, snap: &InningsSnapshot) -> Vec<PartnershipRow> {
        snap.partnerships
            .iter()
            .enumerate()
            .map(|(i, p)| PartnershipRow {
                wicket: i as u32 + 1,
                batters: [name(record, p.batters[0]), name(record, p.batters[1])],
                runs: p.runs,
                balls: p.balls,
                unbroken: p.is_open(),
            })
            .collect()
    }

    /// Fall of wickets
    pub fn fall_of_wickets(record: &Match, snap: &InningsSnapshot) -> Vec<FallOfWicketRow> {
        snap.fall_of_wickets
            .iter()
            .map(|f| FallOfWicketRow {
                wicket: f.wicket,
                name: name(record, f.player),
                score: f.score,
                overs: format_overs(f.legal_balls, snap.balls_per_over),
            })
            .collect()
    }

    /// Totals and extras breakdown
    pub fn summary(snap: &InningsSnapshot) -> InningsSummary {
        let run_rate = if snap.legal_balls == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(snap.total_runs) * Decimal::from(snap.balls_per_over)
                / Decimal::from(snap.legal_balls))
            .round_dp(2)
        };
        InningsSummary {
            total_runs: snap.total_runs,
            wickets: snap.wickets,
            overs: snap.overs(),
            extras: snap.extras,
            total_extras: snap.extras.total(),
            run_rate,
        }
    }

    /// One innings card
    pub fn innings_card(record: &Match, snap: &InningsSnapshot) -> InningsCard {
        InningsCard {
            number: snap.innings.number,
            batting_team: team_name(record, snap.batting_team),
            batting: Self::batting_card(record, snap),
            bowling: Self::bowling_card(record, snap),
            partnerships: Self::partnerships(record, snap),
            fall_of_wickets: Self::fall_of_wickets(record, snap),
            summary: Self::summary(snap),
        }
    }

    /// Full scorecard
    pub fn scorecard(view: &MatchView) -> Scorecard {
        let record = &view.record;
        let card = |n: u8| {
            view.snapshot(n)
                .filter(|s| s.deliveries > 0 || !s.batters.is_empty())
                .map(|s| Self::innings_card(record, s))
        };
        let innings = [card(1), card(2)];

        let toss = record.toss.map(|t| {
            format!(
                "{} won the toss and elected to {}",
                team_name(record, t.winner),
                t.decision
            )
        });
        let result = match (record.status, record.result) {
            (MatchStatus::Completed, Some(result)) => {
                Some(lifecycle::describe_result(record, &result))
            }
            _ => None,
        };

        Scorecard {
            availability: [innings[0].is_some(), innings[1].is_some()],
            label: record.label(),
            toss,
            innings,
            result,
        }
    }
}

fn name(record: &Match, player: PlayerId) -> String {
    record
        .player_name(player)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", player))
}

fn team_name(record: &Match, team: TeamId) -> String {
    record
        .team(team)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| team.to_string())
}

fn dismissal_text(record: &Match, kind: DismissalKind, bowler: Option<PlayerId>) -> String {
    match (kind, bowler) {
        (DismissalKind::Bowled, Some(b)) => format!("b {}", name(record, b)),
        (kind, Some(b)) => format!("{} b {}", kind.label(), name(record, b)),
        (kind, None) => kind.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Command, MatchState};
    use crate::types::{
        DeliverySubmission, ExtraType, MatchFormat, MatchId, PlayerEntry, TeamSheet, TossDecision,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn live_match() -> MatchState {
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
            lifecycle::schedule(MatchId::new(1), MatchFormat::default(), sheet(1, 100), sheet(2, 200))
                .unwrap();
        let mut state = MatchState::new(record);
        let commands = vec![
            Command::OpenToss,
            Command::RecordToss { winner: TeamId::new(2), decision: TossDecision::Bowl },
            Command::StartInnings {
                number: 1,
                striker: PlayerId::new(100),
                non_striker: PlayerId::new(101),
                bowler: PlayerId::new(200),
                nonce: Uuid::new_v4(),
            },
        ];
        for command in commands {
            let staged = state.stage(&command, None, Utc::now()).unwrap();
            state.apply(staged);
        }
        state
    }

    fn deliver(state: &mut MatchState, f: impl FnOnce(DeliverySubmission) -> DeliverySubmission) {
        let view = state.view();
        let snap = view.current().unwrap();
        let sub = DeliverySubmission::dot(
            snap.over,
            snap.ball_in_over + 1,
            snap.striker.unwrap(),
            snap.non_striker.unwrap(),
            snap.bowler.unwrap(),
        );
        let staged = state.stage(&Command::Delivery(f(sub)), None, Utc::now()).unwrap();
        state.apply(staged);
    }

    #[test]
    fn test_scorecard_with_only_first_innings() {
        let mut state = live_match();
        deliver(&mut state, |s| s.with_runs(4));
        deliver(&mut state, |s| s.with_extra(ExtraType::Wide, 1));
        deliver(&mut state, |s| s.with_runs(1));
        deliver(&mut state, |s| {
            s.with_wicket(DismissalKind::Caught, PlayerId::new(101))
        });

        let card = ScorecardAggregator::scorecard(&state.view());
        assert_eq!(card.availability, [true, false]);
        assert!(card.innings[1].is_none());
        assert_eq!(card.toss.as_deref(), Some("Team 2 won the toss and elected to bowl"));
        assert_eq!(card.result, None);

        let first = card.innings[0].as_ref().unwrap();
        assert_eq!(first.batting_team, "Team 1");
        assert_eq!(first.summary.total_runs, 6);
        assert_eq!(first.summary.total_extras, 1);
        assert_eq!(first.summary.overs, "0.3");

        let opener = &first.batting[0];
        assert_eq!((opener.runs, opener.balls, opener.fours), (5, 2, 1));
        assert_eq!(opener.dismissal, "not out");
        assert_eq!(opener.strike_rate, Decimal::from(250));
        assert_eq!(first.batting[1].dismissal, "caught b Player 200");

        let bowler = &first.bowling[0];
        assert_eq!(bowler.overs, "0.3");
        assert_eq!(bowler.runs, 6);
        assert_eq!(bowler.wides, 1);
        assert_eq!(bowler.wickets, 1);

        assert_eq!(first.partnerships.len(), 1);
        assert!(!first.partnerships[0].unbroken);
        assert_eq!(first.fall_of_wickets[0].score, 6);

        let json = card.to_json().unwrap();
        assert!(json.contains("\"availability\""));
        assert!(json.contains("caught b Player 200"));
    }

    #[test]
    fn test_innings_state_and_completion() {
        let mut state = live_match();
        deliver(&mut state, |s| s.with_runs(1));

        let view = state.view();
        let live = ScorecardAggregator::innings_state(&view).unwrap();
        assert_eq!(live.label, "Team 1 vs Team 2");
        assert_eq!(live.batting_team, "Team 1");
        assert_eq!(live.batters.len(), 2);
        assert!(live.batters[0].on_strike);
        assert_eq!(live.batters[0].player, PlayerId::new(101));
        assert_eq!(live.bowler.as_ref().unwrap().overs, "0.1");
        assert_eq!((live.overs, live.balls_in_over), (0, 1));
        assert_eq!(live.target, None);

        let completion = ScorecardAggregator::innings_completion(&view).unwrap();
        assert_eq!(completion.decided_overs, 20);
        assert!(!completion.completed);
        assert_eq!(
            ScorecardAggregator::second_innings_batting_team(&view),
            Some(TeamId::new(2))
        );
    }
}
