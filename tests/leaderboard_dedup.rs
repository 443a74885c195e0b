
use survey_engine::analytics::leaderboard;
use survey_engine::ingest::record_attempt;
use survey_engine::materialize::materialize_owner;
use survey_engine::model::ReducePolicy;
use test_support::{new_attempt, open_workspace, seed_owner, single_question};

fn seed_scored_attempt(
    conn: &rusqlite::Connection,
    owner_id: &str,
    email: &str,
    earned: f64,
) {
    // Stored total of 100 with a single question worth `earned`, answered
    // correctly: percentage lands exactly on `earned`.
    let mut attempt = new_attempt(
        owner_id,
        email,
        vec![single_question("q1", "Q1", 0, earned, "a", "a")],
    );
    attempt.total_marks = Some(100.0);
    record_attempt(conn, &attempt).expect("record attempt");
}

#[test]
fn highest_policy_keeps_one_best_row_per_respondent() {
    let (workspace, conn) = open_workspace("engine-leaderboard");
    let owner_id = seed_owner(&conn, "Championship Quiz", "assessment");

    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 60.0);
    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 90.0);
    seed_scored_attempt(&conn, &owner_id, "grace@example.com", 75.0);
    materialize_owner(&conn, &owner_id).expect("materialize");

    let ranked = leaderboard(&conn, &owner_id, Some(ReducePolicy::Highest)).expect("leaderboard");
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].respondent_email, "ada@example.com");
    assert_eq!(ranked[0].percentage, 90);
    assert_eq!(ranked[1].respondent_email, "grace@example.com");
    assert_eq!(ranked[1].percentage, 75);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn no_policy_ranks_every_attempt() {
    let (workspace, conn) = open_workspace("engine-leaderboard-all");
    let owner_id = seed_owner(&conn, "Championship Quiz", "assessment");

    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 60.0);
    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 90.0);
    materialize_owner(&conn, &owner_id).expect("materialize");

    let ranked = leaderboard(&conn, &owner_id, None).expect("leaderboard");
    assert_eq!(ranked.len(), 2, "without a policy every attempt stays");
    assert_eq!(ranked[0].percentage, 90);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn latest_policy_follows_creation_order() {
    let (workspace, conn) = open_workspace("engine-leaderboard-latest");
    let owner_id = seed_owner(&conn, "Championship Quiz", "assessment");

    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 90.0);
    seed_scored_attempt(&conn, &owner_id, "ada@example.com", 40.0);
    materialize_owner(&conn, &owner_id).expect("materialize");

    let ranked = leaderboard(&conn, &owner_id, Some(ReducePolicy::Latest)).expect("leaderboard");
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].percentage, 40, "the newer attempt wins under Latest");

    let _ = std::fs::remove_dir_all(workspace);
}
