use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::EngineError;
use crate::materialize;
use crate::model::{ReducePolicy, ResultRecord};
use crate::reduce;

/// Questions are flagged as worst-performing above this incorrect ratio.
const WORST_QUESTION_THRESHOLD: f64 = 0.69;
const WORST_QUESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBundle {
    pub attendees: Vec<Attendee>,
    pub grade_distribution: Vec<GradeBandCount>,
    pub worst_questions: Vec<WorstQuestion>,
    pub duration: DurationStats,
    pub per_criteria: Vec<CriteriaAverage>,
    pub multi_takers: Vec<MultiTaker>,
}

/// One reconciled respondent: invited (with directory profile when matched)
/// or a walk-in that appears only in results. `external` is derived from the
/// directory, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub external: bool,
    pub invited: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBandCount {
    pub band: String,
    pub count: i64,
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorstQuestion {
    pub code: String,
    pub text: String,
    pub attempts: i64,
    pub correct: i64,
    pub incorrect_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationStats {
    pub count: i64,
    pub average: String,
    pub min: String,
    pub max: String,
    pub average_seconds: i64,
    pub min_seconds: i64,
    pub max_seconds: i64,
}

impl DurationStats {
    fn empty() -> Self {
        Self {
            count: 0,
            average: format_duration(0),
            min: format_duration(0),
            max: format_duration(0),
            average_seconds: 0,
            min_seconds: 0,
            max_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaAverage {
    pub band: String,
    pub average_percentage: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTaker {
    pub email: String,
    pub owner_count: i64,
}

/// Cross-assessment analytics over an arbitrary set of owner entities.
/// Read-only; every sub-computation tolerates an empty result set.
pub fn analyze(conn: &Connection, owner_ids: &[String]) -> Result<AnalyticsBundle, EngineError> {
    let mut ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for id in owner_ids {
        if seen.insert(id.clone()) {
            ids.push(id.clone());
        }
    }
    if ids.is_empty() {
        return Ok(AnalyticsBundle {
            attendees: Vec::new(),
            grade_distribution: Vec::new(),
            worst_questions: Vec::new(),
            duration: DurationStats::empty(),
            per_criteria: Vec::new(),
            multi_takers: Vec::new(),
        });
    }

    let results = materialize::load_results_for_owners(conn, &ids)?;
    let owner_names = load_owner_names(conn, &ids)?;
    tracing::debug!(owners = ids.len(), results = results.len(), "analyze");

    Ok(AnalyticsBundle {
        attendees: reconcile_attendees(conn, &ids, &results)?,
        grade_distribution: grade_distribution(&results, &owner_names),
        worst_questions: worst_questions(conn, &ids)?,
        duration: duration_stats(&results),
        per_criteria: per_criteria_average(&results),
        multi_takers: multi_takers(&results),
    })
}

/// Deduplicated multi-attempt leaderboard for one owner: reduce per
/// respondent by policy, then rank by percentage descending (ties keep
/// creation order).
pub fn leaderboard(
    conn: &Connection,
    owner_id: &str,
    policy: Option<ReducePolicy>,
) -> Result<Vec<ResultRecord>, EngineError> {
    let results = materialize::load_results_for_owners(conn, &[owner_id.to_string()])?;
    let mut ranked = reduce::reduce(&results, policy);
    ranked.sort_by(|a, b| {
        b.percentage
            .cmp(&a.percentage)
            .then_with(|| a.seq.cmp(&b.seq))
    });
    Ok(ranked)
}

/// Zero-padded `HH:MM:SS` by integer division; hours grow past 99 unclamped.
pub fn format_duration(seconds: i64) -> String {
    let s = seconds.max(0);
    format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

fn reconcile_attendees(
    conn: &Connection,
    owner_ids: &[String],
    results: &[ResultRecord],
) -> Result<Vec<Attendee>, EngineError> {
    let invited = load_invited_emails(conn, owner_ids)?;
    let invited_set: HashSet<&str> = invited.iter().map(|e| e.as_str()).collect();

    // Walk-ins: emails that produced results without appearing in any invite
    // list (self-registered respondents).
    let mut emails: Vec<String> = invited.clone();
    let mut email_seen: HashSet<String> = invited.iter().cloned().collect();
    for r in results {
        if email_seen.insert(r.respondent_email.clone()) {
            emails.push(r.respondent_email.clone());
        }
    }

    let directory = load_directory(conn, &emails)?;
    let mut attendees: Vec<Attendee> = emails
        .into_iter()
        .map(|email| {
            let profile = directory.get(&email);
            Attendee {
                invited: invited_set.contains(email.as_str()),
                external: profile.is_none(),
                display_name: profile.and_then(|p| p.0.clone()),
                phone: profile.and_then(|p| p.1.clone()),
                gender: profile.and_then(|p| p.2.clone()),
                email,
            }
        })
        .collect();
    attendees.sort_by(|a, b| a.email.cmp(&b.email));
    Ok(attendees)
}

fn grade_distribution(
    results: &[ResultRecord],
    owner_names: &HashMap<String, String>,
) -> Vec<GradeBandCount> {
    let mut by_band: HashMap<String, (i64, BTreeSet<String>)> = HashMap::new();
    for r in results {
        let band = r.grade_band.clone().unwrap_or_else(|| "Ungraded".to_string());
        let entry = by_band.entry(band).or_insert_with(|| (0, BTreeSet::new()));
        entry.0 += 1;
        if let Some(name) = owner_names.get(&r.owner_id) {
            entry.1.insert(name.clone());
        }
    }
    let mut out: Vec<GradeBandCount> = by_band
        .into_iter()
        .map(|(band, (count, owners))| GradeBandCount {
            band,
            count,
            owners: owners.into_iter().collect(),
        })
        .collect();
    out.sort_by(|a, b| a.band.cmp(&b.band));
    out
}

fn worst_questions(
    conn: &Connection,
    owner_ids: &[String],
) -> Result<Vec<WorstQuestion>, EngineError> {
    let placeholders = std::iter::repeat("?")
        .take(owner_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    // Only gradable auto-scored rows carry a correctness flag; structural
    // 0-mark rows and manual questions never enter the ratio.
    let sql = format!(
        "SELECT rq.code, rq.text, rq.correct
         FROM result_questions rq
         JOIN results r ON r.id = rq.result_id
         WHERE r.owner_id IN ({}) AND rq.marks > 0 AND rq.correct IS NOT NULL",
        placeholders
    );
    let values: Vec<Value> = owner_ids.iter().map(|id| Value::Text(id.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_question: HashMap<(String, String), (i64, i64)> = HashMap::new();
    for (code, text, correct) in rows {
        let entry = by_question.entry((code, text)).or_insert((0, 0));
        entry.0 += 1;
        if correct != 0 {
            entry.1 += 1;
        }
    }

    let mut flagged: Vec<WorstQuestion> = by_question
        .into_iter()
        .filter_map(|((code, text), (attempts, correct))| {
            let ratio = incorrect_ratio(attempts, correct);
            (ratio > WORST_QUESTION_THRESHOLD).then_some(WorstQuestion {
                code,
                text,
                attempts,
                correct,
                incorrect_ratio: ratio,
            })
        })
        .collect();
    flagged.sort_by(|a, b| {
        b.incorrect_ratio
            .partial_cmp(&a.incorrect_ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
    flagged.truncate(WORST_QUESTION_LIMIT);
    Ok(flagged)
}

fn incorrect_ratio(attempts: i64, correct: i64) -> f64 {
    if attempts <= 0 {
        return 0.0;
    }
    ((attempts - correct) as f64) / (attempts as f64)
}

fn duration_stats(results: &[ResultRecord]) -> DurationStats {
    if results.is_empty() {
        return DurationStats::empty();
    }
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    let mut sum = 0_i64;
    for r in results {
        let t = r.time_taken_seconds.max(0);
        min = min.min(t);
        max = max.max(t);
        sum += t;
    }
    let avg = sum / (results.len() as i64);
    DurationStats {
        count: results.len() as i64,
        average: format_duration(avg),
        min: format_duration(min),
        max: format_duration(max),
        average_seconds: avg,
        min_seconds: min,
        max_seconds: max,
    }
}

fn per_criteria_average(results: &[ResultRecord]) -> Vec<CriteriaAverage> {
    let mut by_band: HashMap<String, (i64, i64)> = HashMap::new();
    for r in results {
        let Some(band) = &r.grade_band else {
            continue;
        };
        let entry = by_band.entry(band.clone()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += r.percentage;
    }
    let mut out: Vec<CriteriaAverage> = by_band
        .into_iter()
        .map(|(band, (count, pct_sum))| CriteriaAverage {
            band,
            average_percentage: ((pct_sum as f64) / (count as f64)).round(),
            count,
        })
        .collect();
    out.sort_by(|a, b| a.band.cmp(&b.band));
    out
}

fn multi_takers(results: &[ResultRecord]) -> Vec<MultiTaker> {
    let mut owners_by_email: HashMap<String, HashSet<String>> = HashMap::new();
    for r in results {
        owners_by_email
            .entry(r.respondent_email.clone())
            .or_default()
            .insert(r.owner_id.clone());
    }
    let mut out: Vec<MultiTaker> = owners_by_email
        .into_iter()
        .filter_map(|(email, owners)| {
            (owners.len() > 1).then_some(MultiTaker {
                email,
                owner_count: owners.len() as i64,
            })
        })
        .collect();
    out.sort_by(|a, b| a.email.cmp(&b.email));
    out
}

fn load_owner_names(
    conn: &Connection,
    owner_ids: &[String],
) -> Result<HashMap<String, String>, EngineError> {
    let placeholders = std::iter::repeat("?")
        .take(owner_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("SELECT id, name FROM owners WHERE id IN ({})", placeholders);
    let values: Vec<Value> = owner_ids.iter().map(|id| Value::Text(id.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

fn load_invited_emails(
    conn: &Connection,
    owner_ids: &[String],
) -> Result<Vec<String>, EngineError> {
    let placeholders = std::iter::repeat("?")
        .take(owner_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT email FROM invites WHERE owner_id IN ({}) ORDER BY rowid",
        placeholders
    );
    let values: Vec<Value> = owner_ids.iter().map(|id| Value::Text(id.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for email in rows {
        let email = email.trim().to_ascii_lowercase();
        if !email.is_empty() && seen.insert(email.clone()) {
            out.push(email);
        }
    }
    Ok(out)
}

type DirectoryProfile = (Option<String>, Option<String>, Option<String>);

fn load_directory(
    conn: &Connection,
    emails: &[String],
) -> Result<HashMap<String, DirectoryProfile>, EngineError> {
    if emails.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(emails.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT email, display_name, phone, gender FROM directory_users WHERE email IN ({})",
        placeholders
    );
    let values: Vec<Value> = emails.iter().map(|e| Value::Text(e.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                (r.get(1)?, r.get(2)?, r.get(3)?),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats_with_integer_division() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(59), "00:00:59");
        assert_eq!(format_duration(61), "00:01:01");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_duration(360000), "100:00:00");
        assert_eq!(format_duration(-5), "00:00:00");
    }

    #[test]
    fn incorrect_ratio_guards_empty_groups() {
        assert_eq!(incorrect_ratio(0, 0), 0.0);
        assert!((incorrect_ratio(10, 3) - 0.7).abs() < 1e-9);
        assert_eq!(incorrect_ratio(4, 4), 0.0);
    }
}
