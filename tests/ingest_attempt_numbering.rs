
use serde_json::json;
use survey_engine::ingest::{record_attempt, NewQuestion};
use survey_engine::materialize::materialize_attempt;
use survey_engine::model::QuestionType;
use test_support::{new_attempt, open_workspace, seed_owner, single_question};

#[test]
fn attempt_numbers_count_per_owner_and_respondent() {
    let (workspace, conn) = open_workspace("engine-attempt-numbers");
    let owner_id = seed_owner(&conn, "Retake Quiz", "assessment");
    let other_owner = seed_owner(&conn, "Other Quiz", "assessment");

    let a1 = record_attempt(
        &conn,
        &new_attempt(&owner_id, "Ada@Example.com", vec![]),
    )
    .expect("first attempt");
    let a2 = record_attempt(
        &conn,
        &new_attempt(&owner_id, "ada@example.com", vec![]),
    )
    .expect("second attempt");
    let other = record_attempt(
        &conn,
        &new_attempt(&other_owner, "ada@example.com", vec![]),
    )
    .expect("other-owner attempt");

    let number = |id: &str| -> i64 {
        conn.query_row(
            "SELECT attempt_number FROM attempts WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .expect("attempt number")
    };
    assert_eq!(number(&a1), 1);
    assert_eq!(number(&a2), 2, "case-insensitive email joins the same run");
    assert_eq!(number(&other), 1, "numbering is per owner entity");

    let email: String = conn
        .query_row(
            "SELECT respondent_email FROM attempts WHERE id = ?",
            [&a1],
            |r| r.get(0),
        )
        .expect("email");
    assert_eq!(email, "ada@example.com");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_submissions_are_rejected_at_the_boundary() {
    let (workspace, conn) = open_workspace("engine-ingest-invalid");
    let owner_id = seed_owner(&conn, "Quiz", "assessment");

    let err = record_attempt(&conn, &new_attempt("no-such-owner", "a@x.com", vec![]))
        .expect_err("unknown owner");
    assert_eq!(err.code, "not_found");

    let err = record_attempt(&conn, &new_attempt(&owner_id, "   ", vec![]))
        .expect_err("blank email");
    assert_eq!(err.code, "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_question_meta_scores_zero_instead_of_failing() {
    let (workspace, conn) = open_workspace("engine-ingest-malformed");
    let owner_id = seed_owner(&conn, "Quiz", "assessment");

    let attempt_id = record_attempt(
        &conn,
        &new_attempt(
            &owner_id,
            "ada@example.com",
            vec![
                single_question("q1", "Fine question", 0, 5.0, "a", "a"),
                NewQuestion {
                    code: "q2".to_string(),
                    text: "Broken meta".to_string(),
                    qtype: QuestionType::MultiSelect,
                    sort_order: 1,
                    marks: 5.0,
                    meta: json!("this is not an object"),
                },
            ],
        ),
    )
    .expect("record attempt");

    let result = materialize_attempt(&conn, &attempt_id).expect("materialize");
    assert!((result.record.score - 5.0).abs() < 1e-9, "broken row scores 0");
    assert!((result.record.total_marks - 10.0).abs() < 1e-9);

    let _ = std::fs::remove_dir_all(workspace);
}
