//! The set of traits a trajectory currently holds.

use std::collections::HashSet;

use super::lineage::TraitId;

/// Ordered, duplicate-free collection of active traits.
#[derive(Debug, Clone, Default)]
pub struct Population {
    members: Vec<TraitId>,
    present: HashSet<TraitId>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ids, dropping repeats.
    pub fn from_ids(ids: impl IntoIterator<Item = TraitId>) -> Self {
        let mut population = Self::new();
        for id in ids {
            population.push(id);
        }
        population
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: TraitId) -> bool {
        self.present.contains(&id)
    }

    #[inline]
    pub fn as_slice(&self) -> &[TraitId] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = TraitId> + '_ {
        self.members.iter().copied()
    }

    /// Member at `index` in insertion order.
    #[inline]
    pub fn get(&self, index: usize) -> TraitId {
        self.members[index]
    }

    /// Append a trait. Returns false if it was already present.
    pub fn push(&mut self, id: TraitId) -> bool {
        if !self.present.insert(id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Remove the member at `index`, keeping the order of the rest.
    pub fn remove_at(&mut self, index: usize) -> TraitId {
        let id = self.members.remove(index);
        self.present.remove(&id);
        id
    }
}
