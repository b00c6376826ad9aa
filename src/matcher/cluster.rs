use crate::matcher::text::similarity;
use crate::types::{Market, MarketGroup};

/// Group listings whose titles look like the same event.
///
/// Greedy and seed-based: the first unassigned market seeds a group, and every
/// later unassigned market joins it when its title scores at least `threshold`
/// against the *seed* title. Members are never compared with each other, so
/// A~B and A~C does not imply B~C.
///
/// Every input market lands in exactly one group. Groups come back largest
/// first; equal sizes keep discovery order.
pub fn cluster(markets: &[Market], threshold: f64) -> Vec<MarketGroup> {
    // Assignment is tracked by position so repeated (platform, id) snapshots
    // are each placed once.
    let mut used = vec![false; markets.len()];
    let mut groups = Vec::new();

    for (i, seed) in markets.iter().enumerate() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut group = MarketGroup::seeded(seed.clone());

        for (j, other) in markets.iter().enumerate().skip(i + 1) {
            if used[j] {
                continue;
            }
            if similarity(&seed.title, &other.title) >= threshold {
                group.push(other.clone());
                used[j] = true;
            }
        }

        groups.push(group);
    }

    // sort_by is stable.
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}
