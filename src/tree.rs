//! Binary layout trees.
//!
//! A [`LayoutTree`] recursively partitions a display's content rectangle.
//! Leaves hold exactly one window; every [`Split`] holds exactly two
//! children, an [`Orientation`] and the share of the first child as a ratio
//! kept inside `[MIN_RATIO, MAX_RATIO]`.
//!
//! Trees store no geometry.  Window frames are computed top-down from the
//! content rectangle on demand (see [`LayoutTree::frames`]), so a tree can
//! be copied out of the store and laid out without holding any lock.

use crate::command::{Direction, Rotation, SpaceId, WindowId};
use crate::geometry::{Orientation, Point, Rect};
use crate::settings::SplitMode;
use log::debug;
use std::fmt;

/// Smallest ratio a split may have.
pub const MIN_RATIO: f64 = 0.1;
/// Largest ratio a split may have.
pub const MAX_RATIO: f64 = 0.9;

/// Clamp a requested ratio into `[MIN_RATIO, MAX_RATIO]`.
///
/// Out-of-range ratios are not an error.  `NaN` resolves to an even split.
pub fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.5
    } else {
        ratio.clamp(MIN_RATIO, MAX_RATIO)
    }
}

/// Errors from tree and tree-store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("window {0} is not in the tree")]
    NotFound(WindowId),
    #[error("space {0} has no layout tree")]
    SpaceNotFound(SpaceId),
    #[error("window {0} is already tiled")]
    AlreadyTiled(WindowId),
    #[error("window {0} has no parent split")]
    NoSplit(WindowId),
}

/// Which child of a split to descend into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Left,
    Right,
}

impl Branch {
    fn other(self) -> Self {
        match self {
            Branch::Left => Branch::Right,
            Branch::Right => Branch::Left,
        }
    }
}

/// Address of a node: the branches taken from the root.
pub type NodePath = Vec<Branch>;

/// A tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(WindowId),
    Split(Box<Split>),
}

/// An internal node with exactly two children.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub orientation: Orientation,
    /// Share of `left` (the left or top child).
    pub ratio: f64,
    pub left: Node,
    pub right: Node,
}

impl Split {
    fn child(&self, branch: Branch) -> &Node {
        match branch {
            Branch::Left => &self.left,
            Branch::Right => &self.right,
        }
    }

    fn child_mut(&mut self, branch: Branch) -> &mut Node {
        match branch {
            Branch::Left => &mut self.left,
            Branch::Right => &mut self.right,
        }
    }

    /// Exchange the two children while keeping each child's area.
    fn swap_children(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
        self.ratio = clamp_ratio(1.0 - self.ratio);
    }
}

/// Parameters that decide the shape of a new split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPolicy {
    pub mode: SplitMode,
    pub ratio: f64,
    pub optimal_ratio: f64,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            mode: SplitMode::Optimal,
            ratio: 0.5,
            optimal_ratio: 1.618,
        }
    }
}

impl SplitPolicy {
    /// Orientation for splitting a leaf occupying `frame` at `depth`.
    pub fn orientation(&self, frame: &Rect, depth: usize) -> Orientation {
        match self.mode {
            SplitMode::Vertical => Orientation::Vertical,
            SplitMode::Horizontal => Orientation::Horizontal,
            SplitMode::Alternate if depth % 2 == 0 => Orientation::Vertical,
            SplitMode::Alternate => Orientation::Horizontal,
            SplitMode::Optimal if frame.aspect_ratio() >= self.optimal_ratio => {
                Orientation::Vertical
            }
            SplitMode::Optimal => Orientation::Horizontal,
        }
    }
}

/// The layout of one (display, space) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutTree {
    root: Option<Node>,
}

impl LayoutTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree by inserting `windows` one at a time in order, each
    /// next to the previously inserted one.
    pub fn build(windows: &[WindowId], area: Rect, gap: f64, policy: &SplitPolicy) -> Self {
        let mut tree = Self::new();
        for window in windows {
            match tree.insert(*window, None, area, gap, policy) {
                Ok(()) => {}
                Err(TreeError::AlreadyTiled(_)) => debug!("duplicate window {} skipped", window),
                Err(e) => debug!("cannot place {}: {}", window, e),
            }
        }
        tree
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    /// Windows in left-to-right (in-order) leaf order.
    pub fn leaves(&self) -> Vec<WindowId> {
        fn walk(node: &Node, out: &mut Vec<WindowId>) {
            match node {
                Node::Leaf(id) => out.push(*id),
                Node::Split(split) => {
                    walk(&split.left, out);
                    walk(&split.right, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            walk(root, &mut out);
        }
        out
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.path_of(window).is_some()
    }

    pub fn first_leaf(&self) -> Option<WindowId> {
        self.leaves().first().copied()
    }

    pub fn last_leaf(&self) -> Option<WindowId> {
        self.leaves().last().copied()
    }

    /// Path from the root to the leaf holding `window`.
    pub fn path_of(&self, window: WindowId) -> Option<NodePath> {
        fn find(node: &Node, window: WindowId, path: &mut NodePath) -> bool {
            match node {
                Node::Leaf(id) => *id == window,
                Node::Split(split) => {
                    for branch in [Branch::Left, Branch::Right] {
                        path.push(branch);
                        if find(split.child(branch), window, path) {
                            return true;
                        }
                        path.pop();
                    }
                    false
                }
            }
        }
        let mut path = NodePath::new();
        let root = self.root.as_ref()?;
        find(root, window, &mut path).then_some(path)
    }

    /// Path of the split directly above `window`'s leaf.
    pub fn parent_path(&self, window: WindowId) -> Result<NodePath, TreeError> {
        let mut path = self.path_of(window).ok_or(TreeError::NotFound(window))?;
        if path.pop().is_none() {
            return Err(TreeError::NoSplit(window));
        }
        Ok(path)
    }

    pub fn node_at(&self, path: &[Branch]) -> Option<&Node> {
        let mut node = self.root.as_ref()?;
        for branch in path {
            node = match node {
                Node::Split(split) => split.child(*branch),
                Node::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    fn node_at_mut(&mut self, path: &[Branch]) -> Option<&mut Node> {
        let mut node = self.root.as_mut()?;
        for branch in path {
            node = match node {
                Node::Split(split) => split.child_mut(*branch),
                Node::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    fn split_at_mut(&mut self, path: &[Branch]) -> Option<&mut Split> {
        match self.node_at_mut(path)? {
            Node::Split(split) => Some(split),
            Node::Leaf(_) => None,
        }
    }

    //  Mutation

    /// Insert `window` by splitting the leaf of `anchor`.
    ///
    /// The anchor keeps the left/top position and `window` becomes the
    /// right/bottom child.  Without an anchor the last leaf is used, and an
    /// empty tree simply becomes a single leaf.
    pub fn insert(
        &mut self,
        window: WindowId,
        anchor: Option<WindowId>,
        area: Rect,
        gap: f64,
        policy: &SplitPolicy,
    ) -> Result<(), TreeError> {
        if self.contains(window) {
            return Err(TreeError::AlreadyTiled(window));
        }
        let anchor = match anchor.or_else(|| self.last_leaf()) {
            Some(anchor) => anchor,
            None => {
                self.root = Some(Node::Leaf(window));
                return Ok(());
            }
        };
        let path = self.path_of(anchor).ok_or(TreeError::NotFound(anchor))?;
        let frame = self
            .frame_at(&path, area, gap)
            .ok_or(TreeError::NotFound(anchor))?;
        let orientation = policy.orientation(&frame, path.len());
        let slot = self.node_at_mut(&path).ok_or(TreeError::NotFound(anchor))?;
        *slot = Node::Split(Box::new(Split {
            orientation,
            ratio: clamp_ratio(policy.ratio),
            left: Node::Leaf(anchor),
            right: Node::Leaf(window),
        }));
        Ok(())
    }

    /// Remove `window`'s leaf; its sibling subtree takes the parent's place.
    pub fn remove(&mut self, window: WindowId) -> Result<(), TreeError> {
        let mut path = self.path_of(window).ok_or(TreeError::NotFound(window))?;
        let branch = match path.pop() {
            Some(branch) => branch,
            None => {
                self.root = None;
                return Ok(());
            }
        };
        let parent = self
            .node_at_mut(&path)
            .ok_or(TreeError::NotFound(window))?;
        if let Node::Split(split) = std::mem::replace(parent, Node::Leaf(window)) {
            let split = *split;
            *parent = match branch.other() {
                Branch::Left => split.left,
                Branch::Right => split.right,
            };
        }
        Ok(())
    }

    /// Set the ratio of the split at `path`, returning the clamped value.
    pub fn resize(&mut self, path: &[Branch], ratio: f64) -> Option<f64> {
        let split = self.split_at_mut(path)?;
        split.ratio = clamp_ratio(ratio);
        Some(split.ratio)
    }

    /// Ratio of the split at `path`.
    pub fn ratio_at(&self, path: &[Branch]) -> Option<f64> {
        match self.node_at(path)? {
            Node::Split(split) => Some(split.ratio),
            Node::Leaf(_) => None,
        }
    }

    /// Exchange the windows of two leaves without changing the shape.
    pub fn swap(&mut self, a: WindowId, b: WindowId) -> Result<(), TreeError> {
        for id in [a, b] {
            if !self.contains(id) {
                return Err(TreeError::NotFound(id));
            }
        }
        self.for_each_leaf_mut(|id| {
            if *id == a {
                *id = b;
            } else if *id == b {
                *id = a;
            }
        });
        Ok(())
    }

    /// Put `new` in the leaf currently holding `old`.
    pub fn replace(&mut self, old: WindowId, new: WindowId) -> Result<(), TreeError> {
        if self.contains(new) {
            return Err(TreeError::AlreadyTiled(new));
        }
        let path = self.path_of(old).ok_or(TreeError::NotFound(old))?;
        if let Some(slot) = self.node_at_mut(&path) {
            *slot = Node::Leaf(new);
        }
        Ok(())
    }

    /// Exchange the children of the split at `path`.
    pub fn flip(&mut self, path: &[Branch]) -> bool {
        match self.split_at_mut(path) {
            Some(split) => {
                split.swap_children();
                true
            }
            None => false,
        }
    }

    /// Switch the orientation of the split at `path`.
    pub fn toggle_orientation(&mut self, path: &[Branch]) -> bool {
        match self.split_at_mut(path) {
            Some(split) => {
                split.orientation = split.orientation.flipped();
                true
            }
            None => false,
        }
    }

    /// Rotate the whole tree clockwise.
    pub fn rotate(&mut self, rotation: Rotation) {
        fn walk(node: &mut Node, rotation: Rotation) {
            if let Node::Split(split) = node {
                match (rotation, split.orientation) {
                    (Rotation::Half, _) => split.swap_children(),
                    // A stack turned clockwise puts the top child on the right.
                    (Rotation::Quarter, Orientation::Horizontal)
                    | (Rotation::ThreeQuarter, Orientation::Vertical) => split.swap_children(),
                    _ => {}
                }
                if rotation != Rotation::Half {
                    split.orientation = split.orientation.flipped();
                }
                walk(&mut split.left, rotation);
                walk(&mut split.right, rotation);
            }
        }
        if let Some(root) = &mut self.root {
            walk(root, rotation);
        }
    }

    fn for_each_leaf_mut(&mut self, mut f: impl FnMut(&mut WindowId)) {
        fn walk(node: &mut Node, f: &mut impl FnMut(&mut WindowId)) {
            match node {
                Node::Leaf(id) => f(id),
                Node::Split(split) => {
                    walk(&mut split.left, f);
                    walk(&mut split.right, f);
                }
            }
        }
        if let Some(root) = &mut self.root {
            walk(root, &mut f);
        }
    }

    //  Geometry

    /// Frame of every window, computed top-down from `area`.
    pub fn frames(&self, area: Rect, gap: f64) -> Vec<(WindowId, Rect)> {
        fn walk(node: &Node, rect: Rect, gap: f64, out: &mut Vec<(WindowId, Rect)>) {
            match node {
                Node::Leaf(id) => out.push((*id, rect)),
                Node::Split(split) => {
                    let (left, right) = rect.split(split.orientation, split.ratio, gap);
                    walk(&split.left, left, gap, out);
                    walk(&split.right, right, gap, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            walk(root, area, gap, &mut out);
        }
        out
    }

    /// Rectangle of the node at `path`.
    pub fn frame_at(&self, path: &[Branch], area: Rect, gap: f64) -> Option<Rect> {
        let mut node = self.root.as_ref()?;
        let mut rect = area;
        for branch in path {
            let split = match node {
                Node::Split(split) => split,
                Node::Leaf(_) => return None,
            };
            let (left, right) = rect.split(split.orientation, split.ratio, gap);
            rect = match branch {
                Branch::Left => left,
                Branch::Right => right,
            };
            node = split.child(*branch);
        }
        Some(rect)
    }

    pub fn frame_of(&self, window: WindowId, area: Rect, gap: f64) -> Option<Rect> {
        let path = self.path_of(window)?;
        self.frame_at(&path, area, gap)
    }

    /// The window whose leaf lies at `point`.
    pub fn window_at(&self, point: Point, area: Rect, gap: f64) -> Option<WindowId> {
        self.frames(area, gap)
            .into_iter()
            .find(|(_, frame)| frame.contains(point))
            .map(|(id, _)| id)
    }

    /// Closest window in `direction` from `window`, by frame geometry.
    ///
    /// Candidates must lie entirely on that side.  Windows overlapping on
    /// the other axis win over windows that do not; ties go to the
    /// smallest edge distance and then the smallest centre offset.
    pub fn neighbor(
        &self,
        window: WindowId,
        direction: Direction,
        area: Rect,
        gap: f64,
    ) -> Option<WindowId> {
        let frames = self.frames(area, gap);
        let origin = frames.iter().find(|(id, _)| *id == window)?.1;
        frames
            .iter()
            .filter(|(id, _)| *id != window)
            .filter_map(|(id, frame)| {
                let distance = edge_distance(&origin, frame, direction)?;
                let overlap = overlaps(&origin, frame, direction);
                let offset = centre_offset(&origin, frame, direction);
                Some((*id, !overlap, distance, offset))
            })
            .min_by(|a, b| {
                a.1.cmp(&b.1)
                    .then(a.2.total_cmp(&b.2))
                    .then(a.3.total_cmp(&b.3))
            })
            .map(|(id, ..)| id)
    }

    /// The window farthest away in the opposite of `direction`, used when
    /// focus wraps around an edge.
    pub fn wrap_target(
        &self,
        window: WindowId,
        direction: Direction,
        area: Rect,
        gap: f64,
    ) -> Option<WindowId> {
        let frames = self.frames(area, gap);
        let origin = frames.iter().find(|(id, _)| *id == window)?.1;
        let back = direction.opposite();
        frames
            .iter()
            .filter(|(id, _)| *id != window)
            .filter_map(|(id, frame)| {
                let distance = edge_distance(&origin, frame, back)?;
                let overlap = overlaps(&origin, frame, back);
                let offset = centre_offset(&origin, frame, back);
                Some((*id, !overlap, distance, offset))
            })
            .min_by(|a, b| {
                a.1.cmp(&b.1)
                    .then(b.2.total_cmp(&a.2))
                    .then(a.3.total_cmp(&b.3))
            })
            .map(|(id, ..)| id)
    }

    /// Leaf after `window` in in-order traversal.
    pub fn next_leaf(&self, window: WindowId) -> Option<WindowId> {
        let leaves = self.leaves();
        let index = leaves.iter().position(|id| *id == window)?;
        leaves.get(index + 1).copied()
    }

    /// Leaf before `window` in in-order traversal.
    pub fn prev_leaf(&self, window: WindowId) -> Option<WindowId> {
        let leaves = self.leaves();
        let index = leaves.iter().position(|id| *id == window)?;
        index.checked_sub(1).and_then(|i| leaves.get(i)).copied()
    }
}

/// Distance between the facing edges of `from` and `to` when `to` lies
/// entirely in `direction`.
fn edge_distance(from: &Rect, to: &Rect, direction: Direction) -> Option<f64> {
    const EPS: f64 = 0.5;
    let d = match direction {
        Direction::Left => from.x - (to.x + to.width),
        Direction::Right => to.x - (from.x + from.width),
        Direction::Up => from.y - (to.y + to.height),
        Direction::Down => to.y - (from.y + from.height),
    };
    (d > -EPS).then_some(d.max(0.0))
}

fn overlaps(a: &Rect, b: &Rect, direction: Direction) -> bool {
    match direction {
        Direction::Left | Direction::Right => a.y < b.y + b.height && b.y < a.y + a.height,
        Direction::Up | Direction::Down => a.x < b.x + b.width && b.x < a.x + a.width,
    }
}

fn centre_offset(a: &Rect, b: &Rect, direction: Direction) -> f64 {
    let (ca, cb) = (a.center(), b.center());
    match direction {
        Direction::Left | Direction::Right => (ca.y - cb.y).abs(),
        Direction::Up | Direction::Down => (ca.x - cb.x).abs(),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(id) => write!(f, "Leaf({})", id),
            Node::Split(split) => {
                let o = match split.orientation {
                    Orientation::Vertical => 'V',
                    Orientation::Horizontal => 'H',
                };
                write!(
                    f,
                    "Split({} {:.2}){{{}, {}}}",
                    o, split.ratio, split.left, split.right
                )
            }
        }
    }
}

impl fmt::Display for LayoutTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => write!(f, "{}", root),
            None => write!(f, "Empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: WindowId = WindowId(1);
    const B: WindowId = WindowId(2);
    const C: WindowId = WindowId(3);
    const D: WindowId = WindowId(4);

    fn area() -> Rect {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }

    fn policy(mode: SplitMode) -> SplitPolicy {
        SplitPolicy {
            mode,
            ..SplitPolicy::default()
        }
    }

    fn tree_of(windows: &[WindowId]) -> LayoutTree {
        LayoutTree::build(windows, area(), 0.0, &SplitPolicy::default())
    }

    #[test]
    fn build_two_windows_side_by_side() {
        let tree = tree_of(&[A, B]);
        assert_eq!(tree.to_string(), "Split(V 0.50){Leaf(1), Leaf(2)}");
        let frames = tree.frames(area(), 0.0);
        assert_eq!(frames[0], (A, Rect::new(0.0, 0.0, 960.0, 1080.0)));
        assert_eq!(frames[1], (B, Rect::new(960.0, 0.0, 960.0, 1080.0)));
    }

    #[test]
    fn build_skips_duplicate_windows() {
        let tree = tree_of(&[A, B, A]);
        assert_eq!(tree.leaves(), vec![A, B]);
        assert_eq!(tree.to_string(), "Split(V 0.50){Leaf(1), Leaf(2)}");
    }

    #[test]
    fn insert_then_remove_scenario() {
        let mut tree = tree_of(&[A, B]);
        tree.insert(C, Some(B), area(), 0.0, &SplitPolicy::default())
            .unwrap();
        // B's leaf is taller than the optimal ratio, so it is stacked.
        assert_eq!(
            tree.to_string(),
            "Split(V 0.50){Leaf(1), Split(H 0.50){Leaf(2), Leaf(3)}}"
        );
        tree.remove(B).unwrap();
        assert_eq!(tree.to_string(), "Split(V 0.50){Leaf(1), Leaf(3)}");
    }

    #[test]
    fn insert_with_missing_anchor_fails() {
        let mut tree = tree_of(&[A]);
        let err = tree
            .insert(B, Some(C), area(), 0.0, &SplitPolicy::default())
            .unwrap_err();
        assert_eq!(err, TreeError::NotFound(C));
        assert_eq!(tree.leaves(), vec![A]);
    }

    #[test]
    fn insert_duplicate_fails() {
        let mut tree = tree_of(&[A, B]);
        assert_eq!(
            tree.insert(A, Some(B), area(), 0.0, &SplitPolicy::default()),
            Err(TreeError::AlreadyTiled(A))
        );
    }

    #[test]
    fn remove_last_window_empties_tree() {
        let mut tree = tree_of(&[A]);
        tree.remove(A).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.remove(A), Err(TreeError::NotFound(A)));
    }

    #[test]
    fn remove_keeps_unrelated_ratios() {
        let mut tree = tree_of(&[A, B, C]);
        tree.resize(&[], 0.7).unwrap();
        tree.resize(&[Branch::Right], 0.3).unwrap();
        tree.insert(D, Some(A), area(), 0.0, &SplitPolicy::default())
            .unwrap();
        tree.remove(D).unwrap();
        assert_eq!(tree.ratio_at(&[]), Some(0.7));
        assert_eq!(tree.ratio_at(&[Branch::Right]), Some(0.3));
    }

    #[test]
    fn insert_then_remove_restores_shape() {
        let mut tree = tree_of(&[A, B, C]);
        tree.resize(&[Branch::Right], 0.35).unwrap();
        let before = tree.clone();
        for anchor in [A, B, C] {
            tree.insert(D, Some(anchor), area(), 0.0, &SplitPolicy::default())
                .unwrap();
            tree.remove(D).unwrap();
            assert_eq!(tree, before);
        }
    }

    #[test]
    fn resize_clamps_to_bounds() {
        let mut tree = tree_of(&[A, B]);
        assert_eq!(tree.resize(&[], 1.5), Some(MAX_RATIO));
        assert_eq!(tree.ratio_at(&[]), Some(0.9));
        assert_eq!(tree.resize(&[], -1.0), Some(MIN_RATIO));
        assert_eq!(tree.ratio_at(&[]), Some(0.1));
        assert_eq!(tree.resize(&[], f64::NAN), Some(0.5));
        // A leaf has no ratio.
        assert_eq!(tree.resize(&[Branch::Left], 0.3), None);
    }

    #[test]
    fn resize_recomputes_frames() {
        let mut tree = tree_of(&[A, B]);
        tree.resize(&[], 0.25).unwrap();
        assert_eq!(
            tree.frame_of(A, area(), 0.0),
            Some(Rect::new(0.0, 0.0, 480.0, 1080.0))
        );
        assert_eq!(
            tree.frame_of(B, area(), 0.0),
            Some(Rect::new(480.0, 0.0, 1440.0, 1080.0))
        );
    }

    #[test]
    fn leaf_count_tracks_inserts_and_removes() {
        let mut tree = LayoutTree::new();
        let mut live: Vec<WindowId> = Vec::new();
        let mut seed: u64 = 0x2545_f491;
        for step in 0..200u64 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if live.is_empty() || seed % 3 != 0 {
                let window = WindowId(100 + step);
                let anchor = live.get((seed >> 33) as usize % live.len().max(1)).copied();
                tree.insert(window, anchor, area(), 4.0, &policy(SplitMode::Alternate))
                    .unwrap();
                live.push(window);
            } else {
                let victim = live.remove((seed >> 33) as usize % live.len());
                tree.remove(victim).unwrap();
            }
            assert_eq!(tree.len(), live.len());
            let mut leaves = tree.leaves();
            leaves.sort();
            let mut expected = live.clone();
            expected.sort();
            assert_eq!(leaves, expected);
        }
    }

    #[test]
    fn alternate_mode_follows_depth() {
        let tree = LayoutTree::build(&[A, B, C, D], area(), 0.0, &policy(SplitMode::Alternate));
        assert_eq!(
            tree.to_string(),
            "Split(V 0.50){Leaf(1), Split(H 0.50){Leaf(2), Split(V 0.50){Leaf(3), Leaf(4)}}}"
        );
    }

    #[test]
    fn fixed_orientation_modes() {
        let tree = LayoutTree::build(&[A, B], area(), 0.0, &policy(SplitMode::Horizontal));
        assert_eq!(tree.to_string(), "Split(H 0.50){Leaf(1), Leaf(2)}");
    }

    #[test]
    fn swap_exchanges_payloads_only() {
        let mut tree = tree_of(&[A, B, C]);
        let shape = tree.to_string();
        tree.swap(A, C).unwrap();
        assert_eq!(tree.leaves(), vec![C, B, A]);
        assert_eq!(shape, "Split(V 0.50){Leaf(1), Split(H 0.50){Leaf(2), Leaf(3)}}");
        assert_eq!(
            tree.to_string(),
            "Split(V 0.50){Leaf(3), Split(H 0.50){Leaf(2), Leaf(1)}}"
        );
        assert_eq!(tree.swap(A, D), Err(TreeError::NotFound(D)));
    }

    #[test]
    fn replace_puts_new_window_in_old_leaf() {
        let mut tree = tree_of(&[A, B]);
        tree.replace(B, D).unwrap();
        assert_eq!(tree.leaves(), vec![A, D]);
        assert_eq!(tree.replace(A, D), Err(TreeError::AlreadyTiled(D)));
        assert_eq!(tree.replace(C, WindowId(9)), Err(TreeError::NotFound(C)));
    }

    #[test]
    fn flip_swaps_children_and_keeps_areas() {
        let mut tree = tree_of(&[A, B]);
        tree.resize(&[], 0.3).unwrap();
        assert!(tree.flip(&[]));
        assert_eq!(tree.leaves(), vec![B, A]);
        let ratio = tree.ratio_at(&[]).unwrap();
        assert!((ratio - 0.7).abs() < 1e-9);
        assert!(!tree.flip(&[Branch::Left]));
    }

    #[test]
    fn toggle_orientation() {
        let mut tree = tree_of(&[A, B]);
        assert!(tree.toggle_orientation(&[]));
        assert_eq!(tree.to_string(), "Split(H 0.50){Leaf(1), Leaf(2)}");
    }

    #[test]
    fn rotate_quarter_turns() {
        let mut tree = tree_of(&[A, B]);
        tree.rotate(Rotation::Quarter);
        // Left child moves to the top.
        assert_eq!(tree.to_string(), "Split(H 0.50){Leaf(1), Leaf(2)}");
        tree.rotate(Rotation::Quarter);
        // Top child moves to the right.
        assert_eq!(tree.to_string(), "Split(V 0.50){Leaf(2), Leaf(1)}");
        tree.rotate(Rotation::Half);
        assert_eq!(tree.to_string(), "Split(V 0.50){Leaf(1), Leaf(2)}");
        tree.rotate(Rotation::ThreeQuarter);
        assert_eq!(tree.to_string(), "Split(H 0.50){Leaf(2), Leaf(1)}");
    }

    #[test]
    fn neighbours_by_geometry() {
        // A | B
        //   | C
        let mut tree = tree_of(&[A, B]);
        tree.insert(C, Some(B), area(), 0.0, &SplitPolicy::default())
            .unwrap();
        assert_eq!(tree.neighbor(A, Direction::Right, area(), 0.0), Some(B));
        assert_eq!(tree.neighbor(C, Direction::Left, area(), 0.0), Some(A));
        assert_eq!(tree.neighbor(B, Direction::Down, area(), 0.0), Some(C));
        assert_eq!(tree.neighbor(C, Direction::Up, area(), 0.0), Some(B));
        assert_eq!(tree.neighbor(A, Direction::Left, area(), 0.0), None);
        assert_eq!(tree.neighbor(D, Direction::Left, area(), 0.0), None);
    }

    #[test]
    fn neighbours_respect_gaps() {
        let tree = LayoutTree::build(&[A, B], area(), 20.0, &SplitPolicy::default());
        assert_eq!(tree.neighbor(A, Direction::Right, area(), 20.0), Some(B));
    }

    #[test]
    fn wrap_target_is_farthest_opposite() {
        let tree = LayoutTree::build(&[A, B, C], area(), 0.0, &policy(SplitMode::Vertical));
        assert_eq!(tree.leaves(), vec![A, B, C]);
        assert_eq!(tree.wrap_target(A, Direction::Left, area(), 0.0), Some(C));
        assert_eq!(tree.wrap_target(C, Direction::Right, area(), 0.0), Some(A));
    }

    #[test]
    fn in_order_traversal() {
        let tree = tree_of(&[A, B, C]);
        assert_eq!(tree.next_leaf(A), Some(B));
        assert_eq!(tree.next_leaf(C), None);
        assert_eq!(tree.prev_leaf(B), Some(A));
        assert_eq!(tree.prev_leaf(A), None);
    }

    #[test]
    fn window_at_point() {
        let tree = tree_of(&[A, B]);
        let p = Point::new(1500.0, 500.0);
        assert_eq!(tree.window_at(p, area(), 0.0), Some(B));
    }

    #[test]
    fn parent_path_of_root_leaf() {
        let tree = tree_of(&[A]);
        assert_eq!(tree.parent_path(A), Err(TreeError::NoSplit(A)));
        assert_eq!(tree.parent_path(B), Err(TreeError::NotFound(B)));
        let tree = tree_of(&[A, B]);
        assert_eq!(tree.parent_path(B), Ok(vec![]));
    }
}
