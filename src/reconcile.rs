//! Aligns a layout tree with the live window set of its space.
//!
//! Leaves whose window is gone are pruned by tree contraction; live windows
//! missing from the tree are inserted with the default insertion policy.
//! Nothing else is touched, so ratios of unaffected splits survive and a
//! tree that already matches the live set is left exactly as it was.

use crate::command::WindowId;
use crate::geometry::Rect;
use crate::tree::{LayoutTree, SplitPolicy};
use log::debug;
use std::collections::HashSet;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub pruned: Vec<WindowId>,
    pub inserted: Vec<WindowId>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.pruned.is_empty() && self.inserted.is_empty()
    }
}

/// Reconcile `tree` with `live`, the tileable windows reported for its space
/// in observed order.
///
/// The first new window is inserted next to `anchor` when that window is in
/// the tree, otherwise next to the last leaf; later new windows follow the
/// one inserted before them.
pub fn reconcile(
    tree: &mut LayoutTree,
    live: &[WindowId],
    anchor: Option<WindowId>,
    area: Rect,
    gap: f64,
    policy: &SplitPolicy,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let live_set: HashSet<WindowId> = live.iter().copied().collect();

    for window in tree.leaves() {
        if !live_set.contains(&window) && tree.remove(window).is_ok() {
            outcome.pruned.push(window);
        }
    }

    let mut anchor = anchor.filter(|a| tree.contains(*a));
    for window in live {
        if tree.contains(*window) {
            continue;
        }
        if tree.insert(*window, anchor, area, gap, policy).is_ok() {
            outcome.inserted.push(*window);
            anchor = Some(*window);
        }
    }

    if !outcome.is_noop() {
        debug!(
            "reconciled tree: pruned {:?}, inserted {:?}",
            outcome.pruned, outcome.inserted
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SplitMode;
    use crate::tree::Branch;

    fn area() -> Rect {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }

    fn ids(raw: &[u64]) -> Vec<WindowId> {
        raw.iter().map(|n| WindowId(*n)).collect()
    }

    #[test]
    fn consistent_tree_is_left_alone() {
        let policy = SplitPolicy::default();
        let live = ids(&[1, 2, 3]);
        let mut tree = LayoutTree::build(&live, area(), 0.0, &policy);
        tree.resize(&[Branch::Right], 0.8);
        let before = tree.clone();

        let outcome = reconcile(&mut tree, &live, Some(WindowId(2)), area(), 0.0, &policy);
        assert!(outcome.is_noop());
        assert_eq!(tree, before);
    }

    #[test]
    fn second_pass_is_a_noop() {
        let policy = SplitPolicy::default();
        let mut tree = LayoutTree::build(&ids(&[1, 2, 3]), area(), 0.0, &policy);
        let live = ids(&[3, 1, 4, 5]);

        let first = reconcile(&mut tree, &live, None, area(), 0.0, &policy);
        assert_eq!(first.pruned, ids(&[2]));
        assert_eq!(first.inserted, ids(&[4, 5]));
        let after_first = tree.clone();

        let second = reconcile(&mut tree, &live, None, area(), 0.0, &policy);
        assert!(second.is_noop());
        assert_eq!(tree, after_first);
    }

    #[test]
    fn no_orphan_leaves_after_reconcile() {
        let policy = SplitPolicy {
            mode: SplitMode::Alternate,
            ..SplitPolicy::default()
        };
        let mut tree = LayoutTree::build(&ids(&[1, 2, 3, 4]), area(), 8.0, &policy);
        let live = ids(&[2, 4, 6]);
        reconcile(&mut tree, &live, None, area(), 8.0, &policy);
        let mut leaves = tree.leaves();
        leaves.sort();
        assert_eq!(leaves, live);
    }

    #[test]
    fn pruning_keeps_unrelated_ratios() {
        let policy = SplitPolicy::default();
        // V{1, H{2, 3}}
        let mut tree = LayoutTree::build(&ids(&[1, 2, 3]), area(), 0.0, &policy);
        tree.resize(&[], 0.3);
        reconcile(&mut tree, &ids(&[1, 2]), None, area(), 0.0, &policy);
        assert_eq!(tree.to_string(), "Split(V 0.30){Leaf(1), Leaf(2)}");
    }

    #[test]
    fn new_windows_go_next_to_anchor() {
        let policy = SplitPolicy::default();
        let mut tree = LayoutTree::build(&ids(&[1, 2]), area(), 0.0, &policy);
        reconcile(&mut tree, &ids(&[1, 2, 3]), Some(WindowId(1)), area(), 0.0, &policy);
        assert_eq!(tree.leaves(), ids(&[1, 3, 2]));
    }

    #[test]
    fn empty_live_set_empties_tree() {
        let policy = SplitPolicy::default();
        let mut tree = LayoutTree::build(&ids(&[1, 2]), area(), 0.0, &policy);
        let outcome = reconcile(&mut tree, &[], None, area(), 0.0, &policy);
        assert_eq!(outcome.pruned.len(), 2);
        assert!(tree.is_empty());
    }
}
