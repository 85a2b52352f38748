use std::collections::{HashMap, HashSet};

use super::rendering::{ObjectId, Ray, RayIntersector, SceneGraph};
use super::tree::{Capabilities, ComponentTree, FlatTree, NodePhase};

struct Candidate<'a> {
    name: &'a str,
    depth: usize,
    order: usize,
    root: ObjectId,
}

/// Resolves which node a pointer ray targets for a gesture.
#[derive(Debug, Default)]
pub struct PickIndex {
    membership: HashMap<String, HashSet<ObjectId>>,
    generation: Option<u64>,
}

impl PickIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.membership.clear();
        self.generation = None;
    }

    /// Nearest hit among nodes offering `required`. When several nodes contain
    /// the hit object the deepest wins, then the last registered.
    pub fn query(
        &mut self,
        ray: &Ray,
        required: Capabilities,
        tree: &ComponentTree,
        flat: &FlatTree,
        graph: &SceneGraph,
        intersector: &dyn RayIntersector,
    ) -> Option<String> {
        let candidates: Vec<Candidate<'_>> = flat
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(order, entry)| {
                let node = tree.node(&entry.path)?;
                if node.phase() != NodePhase::Mounted
                    || !node.active_capabilities().intersects(required)
                {
                    return None;
                }
                Some(Candidate {
                    name: &entry.name,
                    depth: entry.depth,
                    order,
                    root: node.composed_root()?,
                })
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let roots: Vec<ObjectId> = candidates.iter().map(|candidate| candidate.root).collect();
        let hit = intersector.intersect(ray, &roots, graph).into_iter().next()?;

        if self.generation != Some(graph.generation()) {
            self.membership.clear();
            self.generation = Some(graph.generation());
        }

        let mut best: Option<&Candidate<'_>> = None;
        for candidate in &candidates {
            let members = self
                .membership
                .entry(candidate.name.to_string())
                .or_insert_with(|| graph.descendants(candidate.root).into_iter().collect());
            if !members.contains(&hit.object) {
                continue;
            }
            let better = best.map_or(true, |current| {
                (candidate.depth, candidate.order) > (current.depth, current.order)
            });
            if better {
                best = Some(candidate);
            }
        }
        best.map(|candidate| candidate.name.to_string())
    }
}
