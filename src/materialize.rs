use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::EngineError;
use crate::grade;
use crate::ingest;
use crate::model::{AttemptQuestion, QuestionType, ResultQuestion, ResultRecord, ScoreFamily};
use crate::score;

/// Outcome of a materialization. `created` is false when the attempt already
/// had a result and the call was a no-op (or a replace, for manual grading).
#[derive(Debug, Clone)]
pub struct MaterializedResult {
    pub record: ResultRecord,
    pub questions: Vec<ResultQuestion>,
    pub created: bool,
}

/// A grader's override for one question of a materialized result, addressed
/// by question code. `marks` optionally re-weights the question.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualGrade {
    pub code: String,
    pub score: f64,
    #[serde(default)]
    pub marks: Option<f64>,
}

/// Derive and persist the result for one attempt. Idempotent: an attempt
/// that already has a result is returned as-is, never recreated. Safe under
/// concurrent calls -- the UNIQUE(attempt_id) constraint decides the winner
/// and the loser adopts the winning row.
pub fn materialize_attempt(
    conn: &Connection,
    attempt_id: &str,
) -> Result<MaterializedResult, EngineError> {
    if let Some(existing) = find_by_attempt(conn, attempt_id)? {
        return Ok(MaterializedResult {
            questions: load_result_questions(conn, &existing.id)?,
            record: existing,
            created: false,
        });
    }

    let attempt = ingest::load_attempt(conn, attempt_id)?;
    let bands = grade::load_bands(conn, &attempt.owner_id)?;
    let scored = score_snapshot(&attempt.questions);

    // Persist evaluator output back onto the snapshot so the attempt carries
    // its per-question scores (the manual-grade path rewrites them the same
    // way).
    for (q, s) in attempt.questions.iter().zip(scored.iter()) {
        if q.qtype.family() != ScoreFamily::Manual {
            conn.execute(
                "UPDATE attempt_questions SET score = ? WHERE id = ?",
                (s.score, &q.id),
            )?;
        }
    }

    let score_sum: f64 = scored.iter().map(|s| s.score).sum();
    let total_marks = attempt
        .total_marks
        .unwrap_or_else(|| attempt.questions.iter().map(|q| q.marks).sum());
    let pct = score::percentage(score_sum, total_marks);
    let band = grade::resolve_band(pct, &bands).map(|t| t.to_string());

    let result_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO results(id, owner_id, attempt_id, respondent_email, score, total_marks,
                             percentage, grade_band, time_taken_seconds)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(attempt_id) DO NOTHING",
        (
            &result_id,
            &attempt.owner_id,
            attempt_id,
            &attempt.respondent_email,
            score_sum,
            total_marks,
            pct,
            &band,
            attempt.time_taken_seconds,
        ),
    )?;
    if conn.changes() == 0 {
        // Lost the race to a concurrent materializer; its result stands.
        let existing = find_by_attempt(conn, attempt_id)?
            .ok_or_else(|| EngineError::new("db_query_failed", "result vanished mid-insert"))?;
        return Ok(MaterializedResult {
            questions: load_result_questions(conn, &existing.id)?,
            record: existing,
            created: false,
        });
    }

    insert_result_questions(conn, &result_id, &attempt.questions, &scored)?;

    let record = find_by_attempt(conn, attempt_id)?
        .ok_or_else(|| EngineError::new("db_query_failed", "result vanished after insert"))?;
    Ok(MaterializedResult {
        questions: load_result_questions(conn, &record.id)?,
        record,
        created: true,
    })
}

/// Materialize every attempt of an owner that has no result yet. Returns how
/// many results were created. Re-running converges: existing results are
/// skipped, never touched.
pub fn materialize_owner(conn: &Connection, owner_id: &str) -> Result<usize, EngineError> {
    require_owner(conn, owner_id)?;
    let mut stmt = conn.prepare(
        "SELECT a.id
         FROM attempts a
         LEFT JOIN results r ON r.attempt_id = a.id
         WHERE a.owner_id = ? AND r.id IS NULL
         ORDER BY a.rowid",
    )?;
    let pending: Vec<String> = stmt
        .query_map([owner_id], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut created = 0_usize;
    for attempt_id in &pending {
        if materialize_attempt(conn, attempt_id)?.created {
            created += 1;
        }
    }
    tracing::debug!(owner_id, created, "bulk materialize complete");
    Ok(created)
}

/// Full delete-and-recompute of an owner's results: two phases, not atomic.
/// A crash between phases leaves the owner with no results; re-invoking
/// converges to the same final state, so recovery is simply running it again.
pub fn regenerate(conn: &Connection, owner_id: &str) -> Result<usize, EngineError> {
    require_owner(conn, owner_id)?;
    conn.execute(
        "DELETE FROM result_questions
         WHERE result_id IN (SELECT id FROM results WHERE owner_id = ?)",
        [owner_id],
    )?;
    let deleted = conn.execute("DELETE FROM results WHERE owner_id = ?", [owner_id])?;
    tracing::debug!(owner_id, deleted, "regenerate: cleared existing results");
    materialize_owner(conn, owner_id)
}

/// Apply a grader's overrides to a materialized result: rewrite the attempt
/// snapshot's scores, recompute the totals and band, and replace the result
/// row by id (insert if a concurrent regenerate removed it mid-flight).
pub fn apply_manual_grade(
    conn: &Connection,
    result_id: &str,
    grades: &[ManualGrade],
) -> Result<MaterializedResult, EngineError> {
    let record = find_by_id(conn, result_id)?
        .ok_or_else(|| EngineError::not_found("result not found"))?;
    let attempt = ingest::load_attempt(conn, &record.attempt_id)?;

    for g in grades {
        let Some(q) = attempt.questions.iter().find(|q| q.code == g.code) else {
            return Err(EngineError::bad_params(format!(
                "no question with code {} on this attempt",
                g.code
            )));
        };
        let marks = g.marks.unwrap_or(q.marks).max(0.0);
        let score = g.score.clamp(0.0, marks);
        conn.execute(
            "UPDATE attempt_questions SET marks = ?, score = ? WHERE id = ?",
            (marks, score, &q.id),
        )?;
    }

    let questions = ingest::load_attempt_questions(conn, &record.attempt_id)?;
    let bands = grade::load_bands(conn, &record.owner_id)?;
    let scored = score_snapshot(&questions);
    let score_sum: f64 = scored.iter().map(|s| s.score).sum();
    let total_marks = attempt
        .total_marks
        .unwrap_or_else(|| questions.iter().map(|q| q.marks).sum());
    let pct = score::percentage(score_sum, total_marks);
    let band = grade::resolve_band(pct, &bands).map(|t| t.to_string());

    conn.execute(
        "INSERT INTO results(id, owner_id, attempt_id, respondent_email, score, total_marks,
                             percentage, grade_band, time_taken_seconds)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            score = excluded.score,
            total_marks = excluded.total_marks,
            percentage = excluded.percentage,
            grade_band = excluded.grade_band",
        (
            result_id,
            &record.owner_id,
            &record.attempt_id,
            &record.respondent_email,
            score_sum,
            total_marks,
            pct,
            &band,
            record.time_taken_seconds,
        ),
    )?;
    conn.execute(
        "DELETE FROM result_questions WHERE result_id = ?",
        [result_id],
    )?;
    insert_result_questions(conn, result_id, &questions, &scored)?;

    let record = find_by_id(conn, result_id)?
        .ok_or_else(|| EngineError::new("db_query_failed", "result vanished after upsert"))?;
    Ok(MaterializedResult {
        questions: load_result_questions(conn, result_id)?,
        record,
        created: false,
    })
}

struct ScoredQuestion {
    score: f64,
    correct: Option<bool>,
}

// Evaluator dispatch over a snapshot. Manual-family scores come from the
// stored value (NULL until graded); correctness is only tracked for gradable
// auto-family questions so structural and manual rows stay out of ratios.
fn score_snapshot(questions: &[AttemptQuestion]) -> Vec<ScoredQuestion> {
    questions
        .iter()
        .map(|q| {
            if q.qtype.family() == ScoreFamily::Manual {
                ScoredQuestion {
                    score: q.score.unwrap_or(0.0).clamp(0.0, q.marks.max(0.0)),
                    correct: None,
                }
            } else {
                ScoredQuestion {
                    score: score::score_question(q.qtype, q.marks, &q.payload),
                    correct: if q.marks > 0.0 {
                        Some(score::is_full_credit(q.qtype, q.marks, &q.payload))
                    } else {
                        None
                    },
                }
            }
        })
        .collect()
}

fn insert_result_questions(
    conn: &Connection,
    result_id: &str,
    questions: &[AttemptQuestion],
    scored: &[ScoredQuestion],
) -> Result<(), EngineError> {
    for (q, s) in questions.iter().zip(scored.iter()) {
        conn.execute(
            "INSERT INTO result_questions(id, result_id, code, text, qtype, sort_order,
                                          marks, score, correct, is_external)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                result_id,
                &q.code,
                &q.text,
                q.qtype.as_str(),
                q.sort_order,
                q.marks,
                s.score,
                s.correct.map(|c| c as i64),
                q.is_external as i64,
            ),
        )?;
    }
    Ok(())
}

fn require_owner(conn: &Connection, owner_id: &str) -> Result<(), EngineError> {
    let exists: Option<String> = conn
        .query_row("SELECT id FROM owners WHERE id = ?", [owner_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(EngineError::not_found("owner not found"));
    }
    Ok(())
}

const RESULT_COLUMNS: &str = "rowid, id, owner_id, attempt_id, respondent_email, score,
                              total_marks, percentage, grade_band, time_taken_seconds";

fn row_to_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        seq: r.get(0)?,
        id: r.get(1)?,
        owner_id: r.get(2)?,
        attempt_id: r.get(3)?,
        respondent_email: r.get(4)?,
        score: r.get(5)?,
        total_marks: r.get(6)?,
        percentage: r.get(7)?,
        grade_band: r.get(8)?,
        time_taken_seconds: r.get(9)?,
    })
}

fn find_by_attempt(
    conn: &Connection,
    attempt_id: &str,
) -> Result<Option<ResultRecord>, EngineError> {
    let sql = format!("SELECT {} FROM results WHERE attempt_id = ?", RESULT_COLUMNS);
    Ok(conn
        .query_row(&sql, [attempt_id], row_to_record)
        .optional()?)
}

fn find_by_id(conn: &Connection, result_id: &str) -> Result<Option<ResultRecord>, EngineError> {
    let sql = format!("SELECT {} FROM results WHERE id = ?", RESULT_COLUMNS);
    Ok(conn.query_row(&sql, [result_id], row_to_record).optional()?)
}

/// Results across a set of owner entities, in creation order.
pub fn load_results_for_owners(
    conn: &Connection,
    owner_ids: &[String],
) -> Result<Vec<ResultRecord>, EngineError> {
    if owner_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(owner_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT {} FROM results WHERE owner_id IN ({}) ORDER BY rowid",
        RESULT_COLUMNS, placeholders
    );
    let values: Vec<Value> = owner_ids.iter().map(|id| Value::Text(id.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Scored question snapshot of one result, in export order.
pub fn load_result_questions(
    conn: &Connection,
    result_id: &str,
) -> Result<Vec<ResultQuestion>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT code, text, qtype, sort_order, marks, score, correct, is_external
         FROM result_questions
         WHERE result_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([result_id], |r| {
            Ok(ResultQuestion {
                code: r.get(0)?,
                text: r.get(1)?,
                qtype: QuestionType::parse(&r.get::<_, String>(2)?)
                    .unwrap_or(QuestionType::SingleLineText),
                sort_order: r.get(3)?,
                marks: r.get(4)?,
                score: r.get(5)?,
                correct: r.get::<_, Option<i64>>(6)?.map(|c| c != 0),
                is_external: r.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
