use std::collections::HashMap;

use crate::model::{ReducePolicy, ResultRecord};

/// Collapse multiple results per respondent email into one, according to the
/// selection policy. With no policy the input passes through untouched --
/// callers decide whether dedup is wanted. Output preserves first-seen
/// respondent order.
pub fn reduce(results: &[ResultRecord], policy: Option<ReducePolicy>) -> Vec<ResultRecord> {
    let Some(policy) = policy else {
        return results.to_vec();
    };

    let mut picked: Vec<ResultRecord> = Vec::new();
    let mut slot_by_email: HashMap<String, usize> = HashMap::new();

    for r in results {
        match slot_by_email.get(&r.respondent_email) {
            None => {
                slot_by_email.insert(r.respondent_email.clone(), picked.len());
                picked.push(r.clone());
            }
            Some(&slot) => {
                if wins(policy, r, &picked[slot]) {
                    picked[slot] = r.clone();
                }
            }
        }
    }
    picked
}

// Strict comparisons keep the earlier-seq record on ties.
fn wins(policy: ReducePolicy, candidate: &ResultRecord, held: &ResultRecord) -> bool {
    match policy {
        ReducePolicy::Highest => candidate.percentage > held.percentage,
        ReducePolicy::Lowest => candidate.percentage < held.percentage,
        ReducePolicy::Latest => candidate.seq > held.seq,
        ReducePolicy::Earliest => candidate.seq < held.seq,
    }
}
