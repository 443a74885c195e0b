use crate::model::{AnswerPayload, QuestionType, RatingField};

/// Awarded score for one question: `0 <= score <= marks`.
///
/// Pure and total. A payload whose shape does not match the question type's
/// family degrades to 0 -- a respondent submission cannot be rejected after
/// the fact, so malformed rows score nothing instead of failing a batch.
pub fn score_question(qtype: QuestionType, marks: f64, payload: &AnswerPayload) -> f64 {
    if marks <= 0.0 {
        return 0.0;
    }
    let family = qtype.family();
    if payload.family() != family {
        return 0.0;
    }
    let raw = match payload {
        AnswerPayload::Single {
            submitted,
            answer_key,
        } => score_single(marks, submitted.as_deref(), answer_key.as_deref()),
        AnswerPayload::Multi {
            submitted,
            answer_key,
        } => score_multi(marks, submitted, answer_key),
        AnswerPayload::Ordering {
            submitted,
            answer_key,
        } => score_ordering(marks, submitted, answer_key),
        AnswerPayload::Rating { fields } => score_rating(marks, fields),
        // Manual family is graded by a human later; evaluation awards nothing.
        AnswerPayload::Text { .. } => 0.0,
    };
    raw.clamp(0.0, marks)
}

/// Full marks iff the submission matches the key. An absent key means the
/// question is unscored, never an error.
fn score_single(marks: f64, submitted: Option<&str>, answer_key: Option<&str>) -> f64 {
    match (submitted, answer_key) {
        (Some(s), Some(k)) if s == k => marks,
        _ => 0.0,
    }
}

/// Partial credit per key entry matched. An empty key yields 0 regardless of
/// what was submitted (and guards the division).
fn score_multi(marks: f64, submitted: &[String], answer_key: &[String]) -> f64 {
    if answer_key.is_empty() {
        return 0.0;
    }
    let matched = submitted
        .iter()
        .filter(|s| answer_key.iter().any(|k| k == *s))
        .count();
    marks * (matched as f64) / (answer_key.len().max(1) as f64)
}

/// Per-position credit. The answer key defines the position count; zero
/// positions yield 0.
fn score_ordering(marks: f64, submitted: &[String], answer_key: &[String]) -> f64 {
    let positions = answer_key.len();
    if positions == 0 {
        return 0.0;
    }
    let per_position = marks / (positions as f64);
    let mut total = 0.0;
    for (i, key) in answer_key.iter().enumerate() {
        if submitted.get(i).map(|s| s == key).unwrap_or(false) {
            total += per_position;
        }
    }
    total
}

/// Per-sub-field credit, awarded where the rated value equals the correct one.
fn score_rating(marks: f64, fields: &[RatingField]) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    let per_field = marks / (fields.len() as f64);
    fields
        .iter()
        .filter(|f| match (&f.submitted, &f.correct) {
            (Some(s), Some(c)) => s == c,
            _ => false,
        })
        .count() as f64
        * per_field
}

/// Whether a gradable auto-family question earned full credit. Used for the
/// correctness flag on result rows and for export correctness columns.
pub fn is_full_credit(qtype: QuestionType, marks: f64, payload: &AnswerPayload) -> bool {
    marks > 0.0 && score_question(qtype, marks, payload) + 1e-9 >= marks
}

/// Attempt percentage under the platform's fixed rounding rule:
/// `floor(score/total * 100 + 0.51)`.
///
/// The 0.51 constant is observed business behavior (49.5 rounds up to 50,
/// 49.3 stays 49, and 49.51 also reaches 50); downstream grade-band cutoffs
/// are calibrated against it, so it must not be "corrected" to conventional
/// rounding.
pub fn percentage(score: f64, total_marks: f64) -> i64 {
    if total_marks <= 0.0 {
        return 0;
    }
    ((score / total_marks) * 100.0 + 0.51).floor() as i64
}
