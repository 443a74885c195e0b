
use survey_engine::analytics::analyze;
use survey_engine::ingest::record_attempt;
use survey_engine::materialize::materialize_owner;
use test_support::{new_attempt, open_workspace, seed_owner, single_question};

#[test]
fn worst_questions_use_the_incorrect_ratio_cutoff() {
    let (workspace, conn) = open_workspace("engine-worst-q");
    let owner_id = seed_owner(&conn, "Final Exam", "assessment");

    // 10 attempts: q1 always wrong (1.0), q2 wrong 7 times (0.7), q3 wrong
    // 6 times (0.6, below the cutoff). q0 is a 0-mark structural row and
    // must never enter the ratio.
    for i in 0..10 {
        let q2_answer = if i < 3 { "a" } else { "x" };
        let q3_answer = if i < 4 { "a" } else { "x" };
        record_attempt(
            &conn,
            &new_attempt(
                &owner_id,
                &format!("taker{}@example.com", i),
                vec![
                    single_question("q0", "Section header", 0, 0.0, "x", "a"),
                    single_question("q1", "Impossible question", 1, 5.0, "x", "a"),
                    single_question("q2", "Hard question", 2, 5.0, q2_answer, "a"),
                    single_question("q3", "Tricky question", 3, 5.0, q3_answer, "a"),
                ],
            ),
        )
        .expect("record attempt");
    }
    materialize_owner(&conn, &owner_id).expect("materialize");

    let bundle = analyze(&conn, &[owner_id]).expect("analyze");
    let codes: Vec<&str> = bundle
        .worst_questions
        .iter()
        .map(|q| q.code.as_str())
        .collect();
    assert_eq!(codes, vec!["q1", "q2"], "ordered by incorrect ratio");
    assert!((bundle.worst_questions[0].incorrect_ratio - 1.0).abs() < 1e-9);
    assert!((bundle.worst_questions[1].incorrect_ratio - 0.7).abs() < 1e-9);
    assert_eq!(bundle.worst_questions[1].attempts, 10);
    assert_eq!(bundle.worst_questions[1].correct, 3);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn worst_questions_are_capped_at_five() {
    let (workspace, conn) = open_workspace("engine-worst-cap");
    let owner_id = seed_owner(&conn, "Brutal Exam", "assessment");

    let questions: Vec<_> = (0..7_i64)
        .map(|i| {
            single_question(
                &format!("q{}", i),
                &format!("Question {}", i),
                i,
                5.0,
                "x",
                "a",
            )
        })
        .collect();
    record_attempt(&conn, &new_attempt(&owner_id, "taker@example.com", questions))
        .expect("record attempt");
    materialize_owner(&conn, &owner_id).expect("materialize");

    let bundle = analyze(&conn, &[owner_id]).expect("analyze");
    assert_eq!(bundle.worst_questions.len(), 5);

    let _ = std::fs::remove_dir_all(workspace);
}
