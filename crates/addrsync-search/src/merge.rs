//! Deduplication and ranking of autocomplete results
//!
//! Suggestions from every backend are grouped by lowercased address. Within
//! a group the winner has the higher `send_count`, then the more recent
//! `last_used`, then the higher source priority. Winners are
//! ordered by `send_count DESC, last_used DESC, email ASC`.

use std::cmp::Ordering;
use std::collections::HashMap;

use addrsync_core::domain::ContactSuggestion;

/// Merges result lists from several backends into one ranked list
pub fn merge_results<I>(lists: I, limit: usize) -> Vec<ContactSuggestion>
where
    I: IntoIterator<Item = Vec<ContactSuggestion>>,
{
    let mut best: HashMap<String, ContactSuggestion> = HashMap::new();

    for suggestion in lists.into_iter().flatten() {
        let key = suggestion.email.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        match best.get_mut(&key) {
            Some(current) => {
                if preferred(&suggestion, current) == Ordering::Greater {
                    *current = suggestion;
                }
            }
            None => {
                best.insert(key, suggestion);
            }
        }
    }

    let mut merged: Vec<ContactSuggestion> = best.into_values().collect();
    merged.sort_by(rank);
    merged.truncate(limit);
    merged
}

/// Which duplicate survives: Greater means `a` beats `b`
fn preferred(a: &ContactSuggestion, b: &ContactSuggestion) -> Ordering {
    a.send_count
        .cmp(&b.send_count)
        .then_with(|| a.last_used.cmp(&b.last_used))
        .then_with(|| a.source.priority().cmp(&b.source.priority()))
}

/// Final list order
fn rank(a: &ContactSuggestion, b: &ContactSuggestion) -> Ordering {
    b.send_count
        .cmp(&a.send_count)
        .then_with(|| b.last_used.cmp(&a.last_used))
        .then_with(|| a.email.cmp(&b.email))
}
