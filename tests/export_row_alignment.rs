
use serde_json::json;
use survey_engine::export::export_owner_rows;
use survey_engine::ingest::{record_attempt, NewQuestion};
use survey_engine::materialize::materialize_owner;
use survey_engine::model::QuestionType;
use test_support::{
    multi_question, new_attempt, open_workspace, ordering_question, rating_question, seed_owner,
    single_question,
};

#[test]
fn flattened_rows_cover_every_scorable_sub_field() {
    let (workspace, conn) = open_workspace("engine-export-rows");
    let owner_id = seed_owner(&conn, "Onboarding Survey", "survey");

    let contact = NewQuestion {
        code: "c1".to_string(),
        text: "Contact details".to_string(),
        qtype: QuestionType::ContactInfo,
        sort_order: 0,
        marks: 0.0,
        meta: json!({ "fields": [
            { "label": "Name", "submitted": "Ada Lovelace" },
            { "label": "Phone", "submitted": "555-0100" }
        ]}),
    };
    let mut attempt = new_attempt(
        &owner_id,
        "ada@example.com",
        vec![
            contact,
            single_question("q1", "Capital of France?", 1, 5.0, "Paris", "Paris"),
            multi_question("q2", "Pick primes", 2, 4.0, &["2", "5"], &["2", "3", "5"]),
            ordering_question("q3", "Order the steps", 3, 6.0, &["a", "c", "b"], &["a", "b", "c"]),
            rating_question(
                "q4",
                "Rate the course",
                4,
                4.0,
                &[("Content", "5", "5"), ("Pace", "2", "4")],
            ),
        ],
    );
    attempt.external_questions = vec![single_question("ext1", "Department", 0, 0.0, "R&D", "")];
    record_attempt(&conn, &attempt).expect("record attempt");

    // Materialization must not disturb the export shape.
    materialize_owner(&conn, &owner_id).expect("materialize");

    let exports = export_owner_rows(&conn, &owner_id).expect("export");
    assert_eq!(exports.len(), 1);
    let rows = &exports[0].rows;

    // 1 external + 2 contact fields + 1 single + 1 multi + 3 positions +
    // 2 rating fields.
    assert_eq!(rows.answers.len(), 10);
    // Externally-injected questions sort first via the -1 sentinel.
    assert_eq!(rows.answers[0].key, "Department");
    assert_eq!(rows.answers[1].key, "Name");

    // Correctness: single + multi + 3 positions + 2 rating fields; the
    // external and free-text rows are suppressed.
    assert_eq!(rows.correctness.len(), 7);
    assert!(rows
        .correctness
        .iter()
        .all(|r| r.key.starts_with("[Answer]: ")));
    assert!(rows
        .correctness
        .iter()
        .all(|r| r.value == "TRUE" || r.value == "FALSE"));

    let multi_row = rows
        .answers
        .iter()
        .find(|r| r.key == "Pick primes")
        .expect("multi row");
    assert_eq!(multi_row.value, "2, 5");

    let position_keys: Vec<&str> = rows
        .answers
        .iter()
        .filter(|r| r.key.starts_with("Order the steps| Position:"))
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(
        position_keys,
        vec![
            "Order the steps| Position:1",
            "Order the steps| Position:2",
            "Order the steps| Position:3"
        ]
    );

    let pace_row = rows
        .correctness
        .iter()
        .find(|r| r.key == "[Answer]: Rate the course: Pace")
        .expect("pace correctness");
    assert_eq!(pace_row.value, "FALSE");

    let _ = std::fs::remove_dir_all(workspace);
}
