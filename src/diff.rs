//! Incremental feed diffing.
//!
//! Given the page just fetched and the page stored after the previous
//! cycle, decide which items are new.  An item is *not* new when some
//! previous item either
//!
//! 1. is equal to it field for field, or
//! 2. has the same unique key (`post.uri`), even if counters or viewer
//!    flags have drifted since.
//!
//! Everything here is pure; the caller does the emitting and storing.

use std::collections::HashSet;

use crate::bsky::{FeedItem, FeedSnapshot};

/// Outcome of comparing a fresh snapshot with the stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// The whole payload is identical; emit nothing, keep stored state.
    Unchanged,
    /// Something differs.  `fresh` holds the new items in source order
    /// (possibly none, e.g. when only counters moved) and the fetched
    /// snapshot must replace the stored one.
    Changed {
        fresh: Vec<FeedItem>,
        /// Per item of the new snapshot, whether a previous item matched
        /// it.  `None` on a cold start, when nothing was compared.
        matched: Option<Vec<bool>>,
    },
}

#[cfg(test)]
impl Diff {
    /// The fresh items; empty when unchanged.
    pub fn fresh(&self) -> &[FeedItem] {
        match self {
            Diff::Unchanged => &[],
            Diff::Changed { fresh, .. } => fresh,
        }
    }
}

/// Compare `new` against `previous`.
///
/// An absent or empty `previous` means every item in `new` is fresh.
/// Duplicate keys inside `new` are each checked against `previous` only,
/// never against each other.
pub fn diff(new: &FeedSnapshot, previous: Option<&FeedSnapshot>) -> Diff {
    if previous == Some(new) {
        return Diff::Unchanged;
    }

    let Some(prev) = previous.filter(|prev| !prev.is_empty()) else {
        return Diff::Changed {
            fresh: new.feed.clone(),
            matched: None,
        };
    };

    let seen = SeenIndex::new(&prev.feed);
    let matched: Vec<bool> = new.feed.iter().map(|item| seen.contains(item)).collect();
    let fresh = new
        .feed
        .iter()
        .zip(&matched)
        .filter(|(_, found)| !**found)
        .map(|(item, _)| item.clone())
        .collect();

    Diff::Changed {
        fresh,
        matched: Some(matched),
    }
}

/// Lookup over the previous page.
///
/// Keys go in a set so the key tier is O(1); the exact tier stays a scan
/// and only runs for items whose key was not found.
struct SeenIndex<'a> {
    keys: HashSet<&'a str>,
    items: &'a [FeedItem],
}

impl<'a> SeenIndex<'a> {
    fn new(items: &'a [FeedItem]) -> Self {
        Self {
            keys: items.iter().filter_map(FeedItem::key).collect(),
            items,
        }
    }

    fn contains(&self, item: &FeedItem) -> bool {
        // Keyless items never match on key.
        let key_match = item.key().is_some_and(|key| self.keys.contains(key));
        key_match || self.items.iter().any(|prev| prev == item)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(uri: &str, likes: u64) -> FeedItem {
        FeedItem::new(json!({"post": {"uri": uri, "likeCount": likes}}))
    }

    fn snapshot(items: &[FeedItem]) -> FeedSnapshot {
        FeedSnapshot::new(items.to_vec())
    }

    fn fresh_keys(d: &Diff) -> Vec<&str> {
        assert_ne!(*d, Diff::Unchanged, "expected Changed");
        d.fresh().iter().map(|i| i.key().unwrap()).collect()
    }

    fn matched(d: &Diff) -> Option<&[bool]> {
        match d {
            Diff::Unchanged => panic!("expected Changed"),
            Diff::Changed { matched, .. } => matched.as_deref(),
        }
    }

    #[test]
    fn identical_snapshot_is_unchanged() {
        let s = snapshot(&[post("A", 1), post("B", 2)]);
        assert_eq!(diff(&s, Some(&s.clone())), Diff::Unchanged);
    }

    #[test]
    fn cold_start_emits_everything_in_order() {
        let s = snapshot(&[post("C", 0), post("D", 0), post("E", 0)]);
        let d = diff(&s, None);
        assert_eq!(fresh_keys(&d), ["C", "D", "E"]);
        assert_eq!(matched(&d), None, "nothing is compared on a cold start");
    }

    #[test]
    fn empty_previous_is_treated_as_cold_start() {
        let prev = snapshot(&[]);
        let new = snapshot(&[post("C", 0), post("D", 0)]);
        assert_eq!(fresh_keys(&diff(&new, Some(&prev))), ["C", "D"]);
    }

    #[test]
    fn counter_drift_is_not_new() {
        let prev = snapshot(&[post("A", 0)]);
        let new = snapshot(&[post("A", 5)]);
        let d = diff(&new, Some(&prev));
        assert!(fresh_keys(&d).is_empty());
        assert_eq!(matched(&d), Some(&[true][..]));
    }

    #[test]
    fn genuinely_new_item_is_emitted() {
        let prev = snapshot(&[post("A", 0)]);
        let new = snapshot(&[post("A", 0), post("B", 0)]);
        let d = diff(&new, Some(&prev));
        assert_eq!(fresh_keys(&d), ["B"]);
        assert_eq!(matched(&d), Some(&[true, false][..]));
    }

    #[test]
    fn reordering_alone_emits_nothing() {
        let prev = snapshot(&[post("A", 0), post("B", 0)]);
        let new = snapshot(&[post("B", 0), post("A", 0)]);
        assert!(fresh_keys(&diff(&new, Some(&prev))).is_empty());
    }

    #[test]
    fn new_items_keep_source_order_wherever_they_appear() {
        let prev = snapshot(&[post("B", 0)]);
        let new = snapshot(&[post("Z", 0), post("B", 3), post("A", 0)]);
        assert_eq!(fresh_keys(&diff(&new, Some(&prev))), ["Z", "A"]);
    }

    #[test]
    fn metadata_only_change_is_changed_with_nothing_fresh() {
        let prev = snapshot(&[post("A", 0)]);
        let mut new = prev.clone();
        new.meta.insert("cursor".into(), json!("next"));
        assert!(fresh_keys(&diff(&new, Some(&prev))).is_empty());
    }

    #[test]
    fn keyless_items_match_only_exactly() {
        let keyless = FeedItem::new(json!({"reason": {"$type": "repost"}}));
        let other_keyless = FeedItem::new(json!({"reason": {"$type": "pin"}}));
        let prev = snapshot(&[keyless.clone(), post("A", 0)]);
        let new = snapshot(&[keyless, other_keyless.clone(), post("B", 0)]);

        let d = diff(&new, Some(&prev));
        assert_eq!(d.fresh(), [other_keyless, post("B", 0)]);
        assert_eq!(matched(&d), Some(&[true, false, false][..]));
    }

    #[test]
    fn duplicate_keys_in_new_snapshot_are_not_collapsed() {
        let prev = snapshot(&[post("A", 0)]);
        let new = snapshot(&[post("B", 0), post("B", 1)]);
        assert_eq!(fresh_keys(&diff(&new, Some(&prev))), ["B", "B"]);
    }

    #[test]
    fn three_cycle_scenario() {
        let first = snapshot(&[post("1", 0), post("2", 0), post("3", 0)]);
        assert_eq!(fresh_keys(&diff(&first, None)), ["1", "2", "3"]);

        assert_eq!(diff(&first.clone(), Some(&first)), Diff::Unchanged);

        let third = snapshot(&[post("1", 0), post("2", 0), post("3", 0), post("4", 0)]);
        assert_eq!(fresh_keys(&diff(&third, Some(&first))), ["4"]);
    }
}
