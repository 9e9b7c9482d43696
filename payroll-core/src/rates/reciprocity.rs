use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::StateCode;

/// Directed reciprocity agreements.
///
/// An edge `work -> home` means the work state does not tax residents of
/// the home state. Edges are never mirrored: `VA -> MD` says nothing about
/// `MD -> VA`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReciprocityGraph {
    edges: BTreeMap<StateCode, BTreeSet<StateCode>>,
}

impl ReciprocityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(
        &mut self,
        work_state: StateCode,
        home_state: StateCode,
    ) {
        self.edges.entry(work_state).or_default().insert(home_state);
    }

    /// `true` if `work_state` yields to `home_state` for its residents.
    pub fn exempts(
        &self,
        work_state: &StateCode,
        home_state: &StateCode,
    ) -> bool {
        self.edges
            .get(work_state)
            .is_some_and(|homes| homes.contains(home_state))
    }

    /// Home states whose residents `work_state` does not tax, sorted.
    pub fn home_states(
        &self,
        work_state: &StateCode,
    ) -> Vec<&StateCode> {
        self.edges
            .get(work_state)
            .map(|homes| homes.iter().collect())
            .unwrap_or_default()
    }

    /// Every `(work, home)` edge, ordered by work then home state.
    pub fn edges(&self) -> impl Iterator<Item = (&StateCode, &StateCode)> {
        self.edges
            .iter()
            .flat_map(|(work, homes)| homes.iter().map(move |home| (work, home)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }
}
