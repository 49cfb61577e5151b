//! Test session lifecycle tests
//!
//! Covers:
//! - Session creation over a module filter, ordering and shuffling
//! - Validation, not-found and forbidden answer updates
//! - Exactly-once completion, including two concurrent last answers
//! - History summaries

mod helpers;

use flashq_common::{AnswerStatus, Error};
use flashq_server::recommendation::JobOutcome;
use flashq_server::sessions::NewSession;
use helpers::{
    default_generator, module_ids, new_session, seed_cards, setup, state_for, ALICE, BOB, COURSE,
};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_create_session_with_module_filter() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 10).await;
    let modules = module_ids(&ctx.repo).await;
    assert_eq!(modules.len(), 2);

    let session = ctx
        .state
        .sessions
        .create_session(
            ALICE,
            NewSession {
                course_slug: COURSE.to_string(),
                // Duplicates and order do not matter
                module_ids: vec![modules[1], modules[0], modules[1]],
                shuffle: false,
            },
        )
        .await
        .unwrap();

    assert!(session.is_active);
    assert!(session.recommendation.is_none());
    assert_eq!(session.module_ids, modules);
    assert_eq!(session.id.get_version_num(), 7);

    let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();
    assert_eq!(answers.len(), 10);
    assert!(answers.iter().all(|a| a.answer.status == AnswerStatus::Null));
    let uids: Vec<i64> = answers.iter().map(|a| a.uid).collect();
    assert_eq!(uids, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_single_module_selects_its_cards_only() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 10).await;
    let course = ctx.repo.find_course_by_slug(COURSE).await.unwrap().unwrap();
    let trees = ctx
        .repo
        .list_modules(course.id)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.name == "Trees")
        .unwrap();

    let session = ctx
        .state
        .sessions
        .create_session(
            ALICE,
            NewSession {
                course_slug: COURSE.to_string(),
                module_ids: vec![trees.id],
                shuffle: false,
            },
        )
        .await
        .unwrap();

    let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();
    let uids: Vec<i64> = answers.iter().map(|a| a.uid).collect();
    assert_eq!(uids, vec![1, 3, 5, 7, 9]);
}

#[tokio::test]
async fn test_shuffled_session_has_same_cards() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 30).await;

    let ordered = new_session(&ctx.state, ALICE, false).await;
    let shuffled = new_session(&ctx.state, ALICE, true).await;
    assert!(shuffled.is_shuffled);

    let (_, ordered) = ctx.state.sessions.get_session(ordered.id, ALICE).await.unwrap();
    let (_, shuffled) = ctx.state.sessions.get_session(shuffled.id, ALICE).await.unwrap();

    let ordered_ids: Vec<i64> = ordered.iter().map(|a| a.answer.card_id).collect();
    let mut shuffled_ids: Vec<i64> = shuffled.iter().map(|a| a.answer.card_id).collect();
    shuffled_ids.sort_unstable();

    assert_eq!(ordered_ids, shuffled_ids);
}

#[tokio::test]
async fn test_unknown_course_and_empty_selection() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 3).await;

    let unknown = ctx
        .state
        .sessions
        .create_session(
            ALICE,
            NewSession {
                course_slug: "nope".to_string(),
                module_ids: Vec::new(),
                shuffle: false,
            },
        )
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let empty = ctx
        .state
        .sessions
        .create_session(
            ALICE,
            NewSession {
                course_slug: COURSE.to_string(),
                module_ids: vec![9999],
                shuffle: false,
            },
        )
        .await;
    assert!(matches!(empty, Err(Error::InvalidInput(_))));
    assert!(ctx.state.sessions.list_sessions(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_answering_all_cards_closes_session_once() {
    let ctx = setup(Some(default_generator())).await;
    seed_cards(&ctx.repo, 10).await;
    let session = new_session(&ctx.state, ALICE, false).await;
    let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();

    let mut job = None;
    for (i, answer) in answers.iter().enumerate() {
        let status = if i % 3 == 0 {
            AnswerStatus::Forgot
        } else {
            AnswerStatus::Remember
        };
        let update = ctx
            .state
            .sessions
            .update_answer(answer.answer.id, ALICE, status)
            .await
            .unwrap();

        assert_eq!(update.answer.status, status);
        if i < answers.len() - 1 {
            assert!(!update.closed, "closed early at answer {}", i + 1);
            assert!(update.session.is_active);
            assert!(update.job.is_none());
        } else {
            assert!(update.closed);
            assert!(!update.session.is_active);
            job = update.job;
        }
    }

    let outcome = job.expect("job started").await.unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));

    let records = ctx.repo.recommendation_records(session.id).await.unwrap();
    assert_eq!(records.len(), 1);

    // Re-submitting the first answer is rejected and changes nothing
    let again = ctx
        .state
        .sessions
        .update_answer(answers[0].answer.id, ALICE, AnswerStatus::Remember)
        .await;
    assert!(matches!(again, Err(Error::Forbidden(_))));

    let (stored, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();
    assert_eq!(answers[0].answer.status, AnswerStatus::Forgot);
    assert!(!stored.is_active);
    assert_eq!(ctx.state.metrics.snapshot().answers_updated, 10);
}

#[tokio::test]
async fn test_answer_update_rejections() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 2).await;
    let session = new_session(&ctx.state, ALICE, false).await;
    let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();
    let first = answers[0].answer.id;

    let null_status = ctx
        .state
        .sessions
        .update_answer(first, ALICE, AnswerStatus::Null)
        .await;
    assert!(matches!(null_status, Err(Error::InvalidInput(_))));

    let unknown = ctx
        .state
        .sessions
        .update_answer(Uuid::now_v7(), ALICE, AnswerStatus::Remember)
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let other_user = ctx
        .state
        .sessions
        .update_answer(first, BOB, AnswerStatus::Remember)
        .await;
    assert!(matches!(other_user, Err(Error::Forbidden(_))));

    let foreign_read = ctx.state.sessions.get_session(session.id, BOB).await;
    assert!(matches!(foreign_read, Err(Error::Forbidden(_))));

    let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();
    assert!(answers.iter().all(|a| a.answer.status == AnswerStatus::Null));
    assert_eq!(ctx.state.metrics.snapshot().answers_updated, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_last_answers_close_session_exactly_once() {
    let generator = default_generator();
    let ctx = setup(Some(generator.clone())).await;
    seed_cards(&ctx.repo, 10).await;

    for _ in 0..5 {
        let session = new_session(&ctx.state, ALICE, false).await;
        let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();

        for answer in &answers[..8] {
            ctx.state
                .sessions
                .update_answer(answer.answer.id, ALICE, AnswerStatus::Remember)
                .await
                .unwrap();
        }

        let ninth = {
            let sessions = ctx.state.sessions.clone();
            let id = answers[8].answer.id;
            tokio::spawn(async move { sessions.update_answer(id, ALICE, AnswerStatus::Forgot).await })
        };
        let tenth = {
            let sessions = ctx.state.sessions.clone();
            let id = answers[9].answer.id;
            tokio::spawn(async move { sessions.update_answer(id, ALICE, AnswerStatus::Remember).await })
        };

        let ninth = ninth.await.unwrap().unwrap();
        let tenth = tenth.await.unwrap().unwrap();

        assert!(ninth.closed ^ tenth.closed, "exactly one update must close the session");
        let job = ninth.job.or(tenth.job).expect("one job started");
        assert!(matches!(job.await.unwrap(), JobOutcome::Completed { .. }));

        let stored = ctx.repo.find_session(session.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.recommendation.is_some());
        assert_eq!(ctx.repo.recommendation_records(session.id).await.unwrap().len(), 1);
    }

    assert_eq!(generator.calls(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_engines_over_one_database() {
    let generator = default_generator();
    let ctx = setup(Some(generator.clone())).await;
    // Separate locks and job registry; only the database is shared
    let other = state_for(&ctx.pool, Some(generator.clone()), 64, ctx.shutdown.clone());
    seed_cards(&ctx.repo, 10).await;

    let mut jobs = Vec::new();
    let mut session_ids = Vec::new();

    for i in 0..30 {
        // The previous session's job is usually still storing its result
        let creator = if i % 2 == 0 { &ctx.state } else { &other };
        let session = new_session(creator, ALICE, false).await;
        let (_, answers) = ctx.state.sessions.get_session(session.id, ALICE).await.unwrap();

        for answer in &answers[..8] {
            ctx.state
                .sessions
                .update_answer(answer.answer.id, ALICE, AnswerStatus::Remember)
                .await
                .unwrap();
        }

        let ninth = {
            let sessions = ctx.state.sessions.clone();
            let id = answers[8].answer.id;
            tokio::spawn(async move { sessions.update_answer(id, ALICE, AnswerStatus::Forgot).await })
        };
        let tenth = {
            let sessions = other.sessions.clone();
            let id = answers[9].answer.id;
            tokio::spawn(async move { sessions.update_answer(id, ALICE, AnswerStatus::Remember).await })
        };

        let ninth = ninth.await.unwrap().unwrap();
        let tenth = tenth.await.unwrap().unwrap();

        assert!(ninth.closed ^ tenth.closed, "exactly one update must close the session");
        jobs.push(ninth.job.or(tenth.job).expect("one job started"));
        session_ids.push(session.id);
    }

    for job in jobs {
        assert!(matches!(job.await.unwrap(), JobOutcome::Completed { .. }));
    }
    for id in session_ids {
        let stored = ctx.repo.find_session(id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(ctx.repo.recommendation_records(id).await.unwrap().len(), 1);
    }
    assert_eq!(generator.calls(), 30);
}

#[tokio::test]
async fn test_session_summaries() {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, 3).await;

    let older = new_session(&ctx.state, ALICE, false).await;
    // Session ids are time ordered
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = new_session(&ctx.state, ALICE, true).await;
    new_session(&ctx.state, BOB, false).await;

    let (_, answers) = ctx.state.sessions.get_session(older.id, ALICE).await.unwrap();
    ctx.state
        .sessions
        .update_answer(answers[0].answer.id, ALICE, AnswerStatus::Remember)
        .await
        .unwrap();
    ctx.state
        .sessions
        .update_answer(answers[1].answer.id, ALICE, AnswerStatus::Forgot)
        .await
        .unwrap();

    let summaries = ctx.state.sessions.list_sessions(ALICE).await.unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, newer.id);
    assert_eq!(summaries[1].id, older.id);
    assert_eq!(summaries[1].count_null, 1);
    assert_eq!(summaries[1].count_remember, 1);
    assert_eq!(summaries[1].count_forgot, 1);
    assert!(summaries[1].is_active);
    assert!(!summaries[1].has_recommendation);
    assert_eq!(summaries[1].course_name, "Machine Learning 101");
    assert!(summaries[0].is_shuffled);

    let leaderboard = ctx.repo.leaderboard(10).await.unwrap();
    assert_eq!(leaderboard[0].user_id, ALICE);
    assert_eq!(leaderboard[0].remember_count, 1);
    assert_eq!(leaderboard[0].answered_count, 2);
    assert_eq!(leaderboard[0].started_sessions, 2);
    assert_eq!(leaderboard[1].user_id, BOB);
    assert_eq!(leaderboard[1].answered_count, 0);
}
