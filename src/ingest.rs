use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    AnswerPayload, Attempt, AttemptQuestion, QuestionType, RatingField, ScoreFamily, TextField,
};

/// Order sentinel for externally-injected questions; sorts before every
/// natively-defined question.
pub const EXTERNAL_ORDER: i64 = -1;

/// A submission as the surrounding layer hands it over. Question meta arrives
/// as loose JSON and is normalized here, so nothing downstream ever sees a
/// malformed shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttempt {
    pub owner_id: String,
    pub respondent_email: String,
    #[serde(default)]
    pub external_name: Option<String>,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
    #[serde(default)]
    pub external_questions: Vec<NewQuestion>,
    #[serde(default)]
    pub time_taken_seconds: i64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub is_redo: bool,
    #[serde(default)]
    pub total_marks: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub code: String,
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub marks: f64,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Record a submission: snapshot every question with its normalized payload,
/// assign the attempt number, and persist. Returns the new attempt id.
pub fn record_attempt(conn: &Connection, new: &NewAttempt) -> Result<String, EngineError> {
    if new.respondent_email.trim().is_empty() {
        return Err(EngineError::bad_params("respondentEmail must not be empty"));
    }
    let owner_exists: Option<String> = conn
        .query_row(
            "SELECT id FROM owners WHERE id = ?",
            [&new.owner_id],
            |r| r.get(0),
        )
        .optional()?;
    if owner_exists.is_none() {
        return Err(EngineError::not_found("owner not found"));
    }

    let email = new.respondent_email.trim().to_ascii_lowercase();
    let prior: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attempts WHERE owner_id = ? AND respondent_email = ?",
        (&new.owner_id, &email),
        |r| r.get(0),
    )?;

    let attempt_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attempts(id, owner_id, respondent_email, external_name, attempt_number,
                              time_taken_seconds, started_at, ended_at, is_redo, total_marks)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &attempt_id,
            &new.owner_id,
            &email,
            &new.external_name,
            prior + 1,
            new.time_taken_seconds.max(0),
            normalize_rfc3339(new.started_at.as_deref()),
            normalize_rfc3339(new.ended_at.as_deref()),
            new.is_redo as i64,
            new.total_marks,
        ),
    )?;

    for q in &new.external_questions {
        insert_question(conn, &attempt_id, q, EXTERNAL_ORDER, true)?;
    }
    for q in &new.questions {
        insert_question(conn, &attempt_id, q, q.sort_order, false)?;
    }

    Ok(attempt_id)
}

fn insert_question(
    conn: &Connection,
    attempt_id: &str,
    q: &NewQuestion,
    sort_order: i64,
    is_external: bool,
) -> Result<(), EngineError> {
    let payload = normalize_payload(q.qtype, &q.meta);
    let payload_json = serde_json::to_string(&payload)
        .map_err(|e| EngineError::new("bad_params", e.to_string()))?;
    conn.execute(
        "INSERT INTO attempt_questions(id, attempt_id, code, text, qtype, sort_order,
                                       marks, payload, score, is_external)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        (
            Uuid::new_v4().to_string(),
            attempt_id,
            &q.code,
            &q.text,
            q.qtype.as_str(),
            sort_order,
            q.marks.max(0.0),
            payload_json,
            is_external as i64,
        ),
    )?;
    Ok(())
}

/// Normalize a loose meta value into the typed payload for the question's
/// family. Anything that cannot be coerced becomes the family's empty
/// payload, which scores 0 -- a submission is never rejected after the fact.
pub fn normalize_payload(qtype: QuestionType, meta: &serde_json::Value) -> AnswerPayload {
    let family = qtype.family();
    let Some(obj) = meta.as_object() else {
        return AnswerPayload::empty(family);
    };
    match family {
        ScoreFamily::Single => AnswerPayload::Single {
            submitted: value_as_string(obj.get("submitted")),
            answer_key: value_as_string(obj.get("answerKey")),
        },
        ScoreFamily::Multi => AnswerPayload::Multi {
            submitted: value_as_strings(obj.get("submitted")),
            answer_key: value_as_strings(obj.get("answerKey")),
        },
        ScoreFamily::Ordering => AnswerPayload::Ordering {
            submitted: value_as_strings(obj.get("submitted")),
            answer_key: value_as_strings(obj.get("answerKey")),
        },
        ScoreFamily::Rating => {
            let fields = obj
                .get("fields")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|f| {
                            let f = f.as_object()?;
                            Some(RatingField {
                                label: value_as_string(f.get("label")).unwrap_or_default(),
                                submitted: value_as_string(f.get("submitted")),
                                correct: value_as_string(f.get("correct")),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            AnswerPayload::Rating { fields }
        }
        ScoreFamily::Manual => {
            let fields = obj
                .get("fields")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|f| {
                            let f = f.as_object()?;
                            Some(TextField {
                                label: value_as_string(f.get("label")).unwrap_or_default(),
                                submitted: value_as_string(f.get("submitted")),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            AnswerPayload::Text { fields }
        }
    }
}

// Scalars coerce to their display string; arrays and objects do not.
fn value_as_string(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// An array keeps its coercible entries in order; a bare scalar becomes a
// one-entry list.
fn value_as_strings(v: Option<&serde_json::Value>) -> Vec<String> {
    match v {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| value_as_string(Some(item)))
            .collect(),
        Some(other) => value_as_string(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn normalize_rfc3339(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.to_rfc3339())
}

/// Load a full attempt with its question snapshot, external questions first.
pub fn load_attempt(conn: &Connection, attempt_id: &str) -> Result<Attempt, EngineError> {
    let header = conn
        .query_row(
            "SELECT id, owner_id, respondent_email, external_name, attempt_number,
                    time_taken_seconds, started_at, ended_at, is_redo, total_marks
             FROM attempts
             WHERE id = ?",
            [attempt_id],
            |r| {
                Ok(Attempt {
                    id: r.get(0)?,
                    owner_id: r.get(1)?,
                    respondent_email: r.get(2)?,
                    external_name: r.get(3)?,
                    attempt_number: r.get(4)?,
                    time_taken_seconds: r.get(5)?,
                    started_at: r.get(6)?,
                    ended_at: r.get(7)?,
                    is_redo: r.get::<_, i64>(8)? != 0,
                    total_marks: r.get(9)?,
                    questions: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut attempt) = header else {
        return Err(EngineError::not_found("attempt not found"));
    };
    attempt.questions = load_attempt_questions(conn, attempt_id)?;
    Ok(attempt)
}

pub fn load_attempt_questions(
    conn: &Connection,
    attempt_id: &str,
) -> Result<Vec<AttemptQuestion>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, code, text, qtype, sort_order, marks, payload, score, is_external
         FROM attempt_questions
         WHERE attempt_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([attempt_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, f64>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, Option<f64>>(7)?,
                r.get::<_, i64>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut questions = Vec::with_capacity(rows.len());
    for (id, code, text, qtype_raw, sort_order, marks, payload_json, score, is_external) in rows {
        // Unknown types and unreadable payloads degrade instead of failing
        // the whole attempt.
        let qtype = QuestionType::parse(&qtype_raw).unwrap_or(QuestionType::SingleLineText);
        let payload = serde_json::from_str::<AnswerPayload>(&payload_json)
            .unwrap_or_else(|_| AnswerPayload::empty(qtype.family()));
        questions.push(AttemptQuestion {
            id,
            code,
            text,
            qtype,
            sort_order,
            marks,
            payload,
            score,
            is_external: is_external != 0,
        });
    }
    Ok(questions)
}
