use rusqlite::Connection;
use serde::Serialize;

use crate::error::EngineError;
use crate::ingest;
use crate::model::{AnswerPayload, AttemptQuestion, ScoreFamily};
use crate::score;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub key: String,
    pub value: String,
}

/// Flattened attempt: one uniform answer-row sequence for tabular export,
/// with a parallel correctness sequence keyed `"[Answer]: <label>"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRows {
    pub answers: Vec<ExportRow>,
    pub correctness: Vec<ExportRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptExport {
    pub attempt_id: String,
    pub respondent_email: String,
    pub attempt_number: i64,
    pub rows: ExportRows,
}

/// Normalize heterogeneous question/answer shapes into ordered key/value
/// rows. Externally-injected questions carry the `-1` order sentinel and so
/// sort before natively-defined ones. Correctness rows are suppressed for
/// 0-mark, external, and manually-graded questions.
pub fn flatten_attempt(questions: &[AttemptQuestion]) -> ExportRows {
    let mut ordered: Vec<&AttemptQuestion> = questions.iter().collect();
    ordered.sort_by_key(|q| q.sort_order);

    let mut answers = Vec::new();
    let mut correctness = Vec::new();
    for q in ordered {
        flatten_question(q, &mut answers, &mut correctness);
    }
    ExportRows {
        answers,
        correctness,
    }
}

fn flatten_question(
    q: &AttemptQuestion,
    answers: &mut Vec<ExportRow>,
    correctness: &mut Vec<ExportRow>,
) {
    let grade_rows = q.marks > 0.0 && !q.is_external && q.qtype.family() != ScoreFamily::Manual;

    match &q.payload {
        AnswerPayload::Text { fields } => {
            for f in fields {
                answers.push(ExportRow {
                    key: f.label.clone(),
                    value: f.submitted.clone().unwrap_or_default(),
                });
            }
        }
        AnswerPayload::Single {
            submitted,
            answer_key,
        } => {
            answers.push(ExportRow {
                key: q.text.clone(),
                value: submitted.clone().unwrap_or_default(),
            });
            if grade_rows {
                let correct = matches!((submitted, answer_key), (Some(s), Some(k)) if s == k);
                correctness.push(answer_row(&q.text, correct));
            }
        }
        AnswerPayload::Multi { submitted, .. } => {
            answers.push(ExportRow {
                key: q.text.clone(),
                value: submitted.join(", "),
            });
            if grade_rows {
                correctness.push(answer_row(
                    &q.text,
                    score::is_full_credit(q.qtype, q.marks, &q.payload),
                ));
            }
        }
        AnswerPayload::Ordering {
            submitted,
            answer_key,
        } => {
            for (i, key_entry) in answer_key.iter().enumerate() {
                let label = format!("{}| Position:{}", q.text, i + 1);
                let placed = submitted.get(i).cloned().unwrap_or_default();
                if grade_rows {
                    correctness.push(answer_row(&label, placed == *key_entry));
                }
                answers.push(ExportRow {
                    key: label,
                    value: placed,
                });
            }
        }
        AnswerPayload::Rating { fields } => {
            for f in fields {
                let label = format!("{}: {}", q.text, f.label);
                if grade_rows {
                    let correct = matches!((&f.submitted, &f.correct), (Some(s), Some(c)) if s == c);
                    correctness.push(answer_row(&label, correct));
                }
                answers.push(ExportRow {
                    key: label,
                    value: f.submitted.clone().unwrap_or_default(),
                });
            }
        }
    }
}

fn answer_row(label: &str, correct: bool) -> ExportRow {
    ExportRow {
        key: format!("[Answer]: {}", label),
        value: if correct { "TRUE" } else { "FALSE" }.to_string(),
    }
}

/// Flatten every attempt of an owner, in submission order -- the shape the
/// export renderer consumes for workbook output.
pub fn export_owner_rows(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<AttemptExport>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, respondent_email, attempt_number
         FROM attempts
         WHERE owner_id = ?
         ORDER BY rowid",
    )?;
    let headers = stmt
        .query_map([owner_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(headers.len());
    for (attempt_id, respondent_email, attempt_number) in headers {
        let questions = ingest::load_attempt_questions(conn, &attempt_id)?;
        out.push(AttemptExport {
            rows: flatten_attempt(&questions),
            attempt_id,
            respondent_email,
            attempt_number,
        });
    }
    Ok(out)
}
