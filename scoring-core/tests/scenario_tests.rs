//! End-to-end scoring scenarios against a RocksDB-backed engine

use scoring_core::{
    projector::PendingSelection,
    types::{InningsClose, InningsStatus, Margin, MatchResult},
    Config, DeliverySubmission, DismissalKind, Error, ExtraType, MatchFormat, MatchId,
    MatchStatus, PlayerEntry, PlayerId, ScoringEngine, TeamId, TeamSheet, TossDecision,
};
use tempfile::TempDir;

const MATCH: MatchId = MatchId::new(7);

fn sheet(id: u64, first: u64) -> TeamSheet {
    TeamSheet::new(
        id,
        format!("Team {}", id),
        (first..first + 11)
            .map(|p| PlayerEntry::new(p, format!("Player {}", p)))
            .collect(),
    )
}

async fn open(dir: &TempDir) -> ScoringEngine {
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    ScoringEngine::open(config).await.unwrap()
}

/// Team 1 bats first; openers 100/101 face bowler 200
async fn started(engine: &ScoringEngine, format: Option<MatchFormat>) {
    engine
        .schedule_match(MATCH, sheet(1, 100), sheet(2, 200), format)
        .unwrap();
    engine.open_toss(MATCH).await.unwrap();
    engine
        .record_toss(MATCH, TeamId::new(1), TossDecision::Bat)
        .await
        .unwrap();
    engine
        .start_innings(MATCH, 1, PlayerId::new(100), PlayerId::new(101), PlayerId::new(200))
        .await
        .unwrap();
}

/// Next legal-position delivery for the current crease
fn next_ball(engine: &ScoringEngine) -> DeliverySubmission {
    let view = engine.view(MATCH).unwrap();
    let snap = view.current().unwrap();
    DeliverySubmission::dot(
        snap.over,
        snap.ball_in_over + 1,
        snap.striker.unwrap(),
        snap.non_striker.unwrap(),
        snap.bowler.unwrap(),
    )
}

/// Name whoever the innings is waiting for
async fn resolve_pending(engine: &ScoringEngine, batters: u64, bowlers: u64) {
    loop {
        let view = engine.view(MATCH).unwrap();
        let snap = match view.current() {
            Some(snap) => snap.clone(),
            None => return,
        };
        match snap.pending() {
            Some(PendingSelection::Batter) => {
                let batter = (batters..batters + 11)
                    .map(PlayerId::new)
                    .find(|p| snap.batter(*p).is_none())
                    .unwrap();
                engine.new_batter(MATCH, batter).await.unwrap();
            }
            Some(PendingSelection::Bowler) => {
                let bowler = (bowlers..bowlers + 3)
                    .map(PlayerId::new)
                    .find(|p| snap.previous_over_bowler != Some(*p))
                    .unwrap();
                engine.change_bowler(MATCH, bowler).await.unwrap();
            }
            None => return,
        }
    }
}

#[tokio::test]
async fn test_four_credits_striker_and_bowler() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    let sub = next_ball(&engine).with_runs(4);
    engine.record_delivery(MATCH, sub).await.unwrap();

    let snap = engine.snapshot(MATCH, 1).unwrap();
    assert_eq!(snap.total_runs, 4);
    assert_eq!(snap.legal_balls, 1);
    let striker = snap.batter(PlayerId::new(100)).unwrap();
    assert_eq!((striker.runs, striker.balls, striker.fours), (4, 1, 1));
    assert_eq!(snap.bowler_line(PlayerId::new(200)).unwrap().runs_conceded, 4);
    assert_eq!(snap.striker, Some(PlayerId::new(100)));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wide_is_not_a_legal_ball() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    let sub = next_ball(&engine).with_extra(ExtraType::Wide, 1);
    engine.record_delivery(MATCH, sub).await.unwrap();

    let snap = engine.snapshot(MATCH, 1).unwrap();
    assert_eq!(snap.total_runs, 1);
    assert_eq!(snap.extras.wides, 1);
    assert_eq!((snap.over, snap.ball_in_over), (0, 0));
    assert_eq!(snap.batter(PlayerId::new(100)).unwrap().balls, 0);
    let bowler = snap.bowler_line(PlayerId::new(200)).unwrap();
    assert_eq!((bowler.legal_balls, bowler.runs_conceded, bowler.wides), (0, 1, 1));

    // The re-bowled ball keeps the same position
    let sub = next_ball(&engine);
    assert_eq!((sub.over, sub.ball), (0, 1));
    engine.record_delivery(MATCH, sub).await.unwrap();

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tenth_wicket_closes_innings() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    for _ in 0..10 {
        resolve_pending(&engine, 100, 200).await;
        let sub = next_ball(&engine);
        let striker = sub.striker;
        engine
            .record_delivery(MATCH, sub.with_wicket(DismissalKind::Bowled, striker))
            .await
            .unwrap();
    }

    let view = engine.view(MATCH).unwrap();
    assert_eq!(view.record.status, MatchStatus::InningsBreak);
    let innings = view.record.innings(1).unwrap();
    assert_eq!(innings.status, InningsStatus::Completed);
    assert_eq!(innings.closed_by, Some(InningsClose::AllOut));
    assert_eq!(view.snapshot(1).unwrap().wickets, 10);
    assert_eq!(view.target(), Some(1));

    // Nothing more can be bowled at the closed innings
    let err = engine
        .record_delivery(
            MATCH,
            DeliverySubmission::dot(1, 5, PlayerId::new(110), PlayerId::new(101), PlayerId::new(201)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mistaken_last_wicket_is_retracted() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open(&dir).await;
        started(&engine, None).await;
        for _ in 0..10 {
            resolve_pending(&engine, 100, 200).await;
            let sub = next_ball(&engine);
            let striker = sub.striker;
            engine
                .record_delivery(MATCH, sub.with_wicket(DismissalKind::Caught, striker))
                .await
                .unwrap();
        }
        assert_eq!(engine.view(MATCH).unwrap().record.status, MatchStatus::InningsBreak);

        engine.retract_last(MATCH).await.unwrap();
        engine.shutdown().await.unwrap();
    }

    let engine = open(&dir).await;
    let view = engine.view(MATCH).unwrap();
    assert_eq!(view.record.status, MatchStatus::InProgress);
    assert_eq!(view.record.innings(1).unwrap().status, InningsStatus::InProgress);
    assert_eq!(view.snapshot(1).unwrap().wickets, 9);

    engine.record_delivery(MATCH, next_ball(&engine).with_runs(1)).await.unwrap();
    assert_eq!(engine.snapshot(MATCH, 1).unwrap().total_runs, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overs_exhausted_then_chase_wins() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    for _ in 0..120 {
        resolve_pending(&engine, 100, 200).await;
        engine.record_delivery(MATCH, next_ball(&engine).with_runs(1)).await.unwrap();
    }

    let view = engine.view(MATCH).unwrap();
    assert_eq!(view.record.status, MatchStatus::InningsBreak);
    assert_eq!(
        view.record.innings(1).unwrap().closed_by,
        Some(InningsClose::OversExhausted)
    );
    assert_eq!(view.snapshot(1).unwrap().total_runs, 120);
    assert_eq!(view.snapshot(1).unwrap().over, 20);
    assert_eq!(engine.second_innings_batting_team(MATCH).unwrap(), TeamId::new(2));

    engine
        .start_innings(MATCH, 2, PlayerId::new(200), PlayerId::new(201), PlayerId::new(100))
        .await
        .unwrap();
    let mut balls = 0;
    while !engine.is_match_over(MATCH).unwrap() {
        resolve_pending(&engine, 200, 100).await;
        engine.record_delivery(MATCH, next_ball(&engine).with_runs(6)).await.unwrap();
        balls += 1;
    }

    // 21 sixes pass 120
    assert_eq!(balls, 21);
    let view = engine.view(MATCH).unwrap();
    assert_eq!(view.record.status, MatchStatus::Completed);
    assert_eq!(
        view.record.result,
        Some(MatchResult::Won {
            winner: TeamId::new(2),
            margin: Margin::Wickets(10),
        })
    );
    assert_eq!(engine.scorecard(MATCH).unwrap().result.as_deref(), Some("Team 2 won by 10 wickets"));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let before = {
        let engine = open(&dir).await;
        started(&engine, None).await;
        for runs in [1, 0, 4, 2, 0, 6, 3] {
            resolve_pending(&engine, 100, 200).await;
            engine.record_delivery(MATCH, next_ball(&engine).with_runs(runs)).await.unwrap();
        }
        let view = engine.view(MATCH).unwrap();
        engine.shutdown().await.unwrap();
        view
    };

    let engine = open(&dir).await;
    let after = engine.view(MATCH).unwrap();
    assert_eq!(*after, *before);
    assert_eq!(after.snapshot(1).unwrap().total_runs, 16);

    // Sequence numbers continue from the persisted head
    let seq = engine.record_delivery(MATCH, next_ball(&engine)).await.unwrap();
    assert_eq!(seq, before.head_seq + 1);
    assert_eq!(engine.stats().unwrap().total_matches, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    let sub = next_ball(&engine).with_runs(2);
    engine.record_delivery(MATCH, sub.clone()).await.unwrap();
    let head = engine.view(MATCH).unwrap().head_seq;

    let err = engine.record_delivery(MATCH, sub).await.unwrap_err();
    assert!(matches!(err, Error::Sequence(_)));
    assert_eq!(engine.view(MATCH).unwrap().head_seq, head);
    assert_eq!(engine.snapshot(MATCH, 1).unwrap().total_runs, 2);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_expected_seq_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    let head = engine.view(MATCH).unwrap().head_seq;
    let seq = engine
        .record_delivery_at(MATCH, next_ball(&engine).with_runs(1), Some(head))
        .await
        .unwrap();
    assert_eq!(seq, head + 1);

    // A second scorer still holding the old head loses
    let err = engine
        .record_delivery_at(MATCH, next_ball(&engine), Some(head))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrentModification(_)));
    assert_eq!(engine.view(MATCH).unwrap().head_seq, seq);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_same_bowler_twice_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir).await;
    started(&engine, None).await;

    for _ in 0..6 {
        engine.record_delivery(MATCH, next_ball(&engine)).await.unwrap();
    }
    assert!(engine.is_over_completed(MATCH).unwrap());
    let head = engine.view(MATCH).unwrap().head_seq;

    let err = engine
        .change_bowler(MATCH, PlayerId::new(200))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sequence(_)));
    assert_eq!(engine.view(MATCH).unwrap().head_seq, head);

    engine.change_bowler(MATCH, PlayerId::new(201)).await.unwrap();
    assert!(!engine.is_over_completed(MATCH).unwrap());
    let seq = engine.record_delivery(MATCH, next_ball(&engine)).await.unwrap();
    assert_eq!(seq, head + 2);
    assert!(!engine.is_over_completed(MATCH).unwrap());

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submitters_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let engine = std::sync::Arc::new(open(&dir).await);
    started(&engine, None).await;

    // Both race for ball 0.1; exactly one wins
    let sub = next_ball(&engine);
    let a = {
        let engine = engine.clone();
        let sub = sub.clone().with_runs(1);
        tokio::spawn(async move { engine.record_delivery(MATCH, sub).await })
    };
    let b = {
        let engine = engine.clone();
        let sub = DeliverySubmission { nonce: uuid::Uuid::new_v4(), ..sub }.with_runs(2);
        tokio::spawn(async move { engine.record_delivery(MATCH, sub).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let snap = engine.snapshot(MATCH, 1).unwrap();
    assert_eq!(snap.legal_balls, 1);
    assert!(snap.total_runs == 1 || snap.total_runs == 2);
}
