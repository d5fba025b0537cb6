use super::body::{Axis, Body};
use super::{PhysicsEngine, MAX_SEPARATION_PASSES, OVERLAP_EPSILON};
use crate::attach::AttachmentGraph;
use glam::DVec2;
use std::collections::HashSet;

impl PhysicsEngine {
    /// Push apart overlapping blocking pairs until stable or out of passes.
    /// Rolled-back trees do not move, and a tree pushed off one is held in
    /// place for the rest of the call. Returns the number of pushes applied.
    pub(super) fn separate(&mut self, graph: &AttachmentGraph, rolled_back: &mut Vec<String>) -> usize {
        let mut held: HashSet<String> = rolled_back.iter().cloned().collect();
        let mut pushes = 0;
        for _ in 0..MAX_SEPARATION_PASSES {
            let mut changed = false;
            for i in 0..self.bodies.len() {
                for j in (i + 1)..self.bodies.len() {
                    if !self.pair_blocks(i, j, graph) {
                        continue;
                    }
                    let overlap = self.bodies[i].overlap(&self.bodies[j]);
                    if overlap.x <= OVERLAP_EPSILON || overlap.y <= OVERLAP_EPSILON {
                        continue;
                    }
                    if self.push_apart(i, j, overlap, graph, rolled_back, &mut held) {
                        pushes += 1;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        pushes
    }

    fn pair_blocks(&self, i: usize, j: usize, graph: &AttachmentGraph) -> bool {
        let (a, b) = (&self.bodies[i], &self.bodies[j]);
        a.is_solid() && b.is_solid() && a.masks_block(b) && !graph.directly_attached(&a.uid, &b.uid)
    }

    /// Returns false when neither side can move.
    fn push_apart(
        &mut self,
        i: usize,
        j: usize,
        overlap: DVec2,
        graph: &AttachmentGraph,
        rolled_back: &mut Vec<String>,
        held: &mut HashSet<String>,
    ) -> bool {
        let axis = if overlap.x <= overlap.y { Axis::X } else { Axis::Y };
        let depth = axis.of(overlap);
        let (a, b) = (&self.bodies[i], &self.bodies[j]);
        let dir = push_direction(a, b, axis);

        let tree_a = graph.tree_of(&a.uid);
        let tree_b = graph.tree_of(&b.uid);
        let pinned_a = tree_a.iter().any(|u| held.contains(u));
        let pinned_b = tree_b.iter().any(|u| held.contains(u));
        let moved_a = axis.of(a.moved()).abs();
        let moved_b = axis.of(b.moved()).abs();
        let (share_a, share_b) = if pinned_a && pinned_b {
            return false;
        } else if pinned_a {
            (0.0, 1.0)
        } else if pinned_b {
            (1.0, 0.0)
        } else if moved_a + moved_b > OVERLAP_EPSILON {
            let total = moved_a + moved_b;
            (moved_a / total, moved_b / total)
        } else {
            match (a.config.dynamic, b.config.dynamic) {
                (true, false) => (1.0, 0.0),
                (false, true) => (0.0, 1.0),
                _ => (0.5, 0.5),
            }
        };

        let (uid_a, uid_b) = (a.uid.clone(), b.uid.clone());
        if share_a > 0.0 {
            self.shift_tree(&uid_a, axis, -dir * depth * share_a, graph, rolled_back);
        }
        if share_b > 0.0 {
            self.shift_tree(&uid_b, axis, dir * depth * share_b, graph, rolled_back);
        }
        if pinned_a {
            held.extend(tree_b);
        } else if pinned_b {
            held.extend(tree_a);
        }
        held.extend(rolled_back.iter().cloned());

        let a = &mut self.bodies[i];
        if axis.of(a.vel) * dir > 0.0 {
            axis.set(&mut a.vel, 0.0);
        }
        let b = &mut self.bodies[j];
        if axis.of(b.vel) * dir < 0.0 {
            axis.set(&mut b.vel, 0.0);
        }
        true
    }

    /// Move the attachment tree containing `uid` by `amount`. A tree whose
    /// root is moving against the push is rolled back instead.
    fn shift_tree(&mut self, uid: &str, axis: Axis, amount: f64, graph: &AttachmentGraph, rolled_back: &mut Vec<String>) {
        let root = graph.root_of(uid).unwrap_or(uid).to_string();
        let tree = graph.subtree(&root);

        if tree.len() > 1 {
            let root_motion = self.body(&root).map_or(0.0, |b| axis.of(b.moved()));
            if root_motion * amount < 0.0 {
                for member in &tree {
                    self.roll_back(member, rolled_back);
                }
                return;
            }
        }

        for member in &tree {
            if let Some(body) = self.body_mut(member) {
                let shifted = axis.of(body.pos) + amount;
                axis.set(&mut body.pos, shifted);
            }
        }
    }
}

/// +1 pushes `b` towards positive `axis` and `a` the other way. Decided by
/// current centres, then pre-tick centres, then uid order.
fn push_direction(a: &Body, b: &Body, axis: Axis) -> f64 {
    let now = axis.of(b.pos - a.pos);
    if now.abs() > OVERLAP_EPSILON {
        return now.signum();
    }
    let before = axis.of(b.prev_pos - a.prev_pos);
    if before.abs() > OVERLAP_EPSILON {
        return before.signum();
    }
    if a.uid <= b.uid {
        1.0
    } else {
        -1.0
    }
}
