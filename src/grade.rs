use rusqlite::Connection;

use crate::error::EngineError;
use crate::model::CriteriaBand;

/// Resolve a percentage to a band title. Bands are scanned in stored order
/// and the first one containing the percentage wins, even when a later band
/// also covers it -- overlap handling is first-match by policy, not numeric
/// ordering. Both bounds are inclusive. No match means "ungraded".
pub fn resolve_band(percentage: i64, bands: &[CriteriaBand]) -> Option<&str> {
    let p = percentage as f64;
    bands
        .iter()
        .find(|b| b.from_pct <= p && p <= b.to_pct)
        .map(|b| b.title.as_str())
}

/// Criteria bands for an owner entity, in stored order.
pub fn load_bands(conn: &Connection, owner_id: &str) -> Result<Vec<CriteriaBand>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT from_pct, to_pct, title
         FROM criteria_bands
         WHERE owner_id = ?
         ORDER BY idx",
    )?;
    let bands = stmt
        .query_map([owner_id], |r| {
            Ok(CriteriaBand {
                from_pct: r.get(0)?,
                to_pct: r.get(1)?,
                title: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bands)
}
