//! Budget-bounded tree traversal.
//!
//! Accessibility reads are expensive IPC round-trips and the target tree is
//! effectively unbounded, so every traversal in this crate is capped by a
//! [`Budget`]: one unit per node visited, stop dead when it runs out and
//! keep whatever was collected so far.

use crate::node::UiNode;

/// Non-negative visit counter shared by one extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    initial: u32,
    remaining: u32,
}

impl Budget {
    pub fn new(limit: u32) -> Self {
        Self {
            initial: limit,
            remaining: limit,
        }
    }

    /// Pay for one node visit. Returns `false` (and charges nothing) once
    /// the budget is exhausted.
    pub fn charge(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Units consumed so far; this is what extraction metadata reports as
    /// `nodesVisited`.
    pub fn spent(&self) -> u32 {
        self.initial - self.remaining
    }
}

/// Visitor verdict for [`walk_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Descend into this node's children.
    Continue,
    /// Keep walking siblings but do not descend here.
    SkipChildren,
    /// Abort the whole walk.
    Stop,
}

/// Depth-first walk over `root`, charging `budget` once per visited node and
/// never descending past `max_depth` (root is depth 0).
///
/// The walk stops silently when the budget runs out; partial results
/// accumulated by the visitor are always preferred to total failure.
pub fn walk_bounded<F>(root: &UiNode, max_depth: usize, budget: &mut Budget, visit: &mut F)
where
    F: FnMut(&UiNode, usize) -> Step,
{
    walk_inner(root, 0, max_depth, budget, visit);
}

fn walk_inner<F>(
    node: &UiNode,
    depth: usize,
    max_depth: usize,
    budget: &mut Budget,
    visit: &mut F,
) -> bool
where
    F: FnMut(&UiNode, usize) -> Step,
{
    if !budget.charge() {
        return false;
    }
    match visit(node, depth) {
        Step::Stop => false,
        Step::SkipChildren => true,
        Step::Continue => {
            if depth >= max_depth {
                return true;
            }
            for child in node.children() {
                if budget.is_exhausted() {
                    return false;
                }
                if !walk_inner(&child, depth + 1, max_depth, budget, visit) {
                    return false;
                }
            }
            true
        }
    }
}
