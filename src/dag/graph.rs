//! StepGraph - dependency structure of a plan, indexed by step position
//!
//! - FxHashSet for visited sets
//! - SmallVec for edge lists (most steps have 0-4 dependencies)
//!
//! Built from an already-validated plan: every dependency points at a smaller
//! index, so the graph is acyclic by construction.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::ast::Plan;

/// Stack-allocated edge list
pub type EdgeVec = SmallVec<[usize; 4]>;

/// Graph of step dependencies
#[derive(Debug, Clone)]
pub struct StepGraph {
    /// step -> steps it depends on (deduplicated)
    predecessors: Vec<EdgeVec>,
    /// step -> steps depending on it
    successors: Vec<EdgeVec>,
}

impl StepGraph {
    pub fn from_plan(plan: &Plan) -> Self {
        let len = plan.steps.len();
        let mut predecessors = vec![EdgeVec::new(); len];
        let mut successors = vec![EdgeVec::new(); len];

        for (index, step) in plan.steps.iter().enumerate() {
            for &dep in &step.depends_on {
                if dep >= len || predecessors[index].contains(&dep) {
                    continue;
                }
                predecessors[index].push(dep);
                successors[dep].push(index);
            }
        }

        Self {
            predecessors,
            successors,
        }
    }

    pub fn len(&self) -> usize {
        self.predecessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predecessors.is_empty()
    }

    #[inline]
    pub fn dependencies(&self, step: usize) -> &[usize] {
        self.predecessors.get(step).map_or(&[], SmallVec::as_slice)
    }

    #[inline]
    pub fn successors(&self, step: usize) -> &[usize] {
        self.successors.get(step).map_or(&[], SmallVec::as_slice)
    }

    /// Every step that directly or indirectly depends on `step`, ascending
    pub fn transitive_dependents(&self, step: usize) -> Vec<usize> {
        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(step);

        while let Some(current) = queue.pop_front() {
            for &next in self.successors(current) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let mut out: Vec<usize> = visited.into_iter().collect();
        out.sort_unstable();
        out
    }
}
