//! Criteria matching: resolve ordered cluster tag-sets plus a command tag-set
//! into a (cluster, command) pair.
//!
//! Cluster criteria are tried in order. The first criteria whose eligible,
//! superset-matching clusters yield at least one command match ends the
//! search; later criteria are only consulted when every candidate cluster of
//! the current one has been tried without success.
//!
//! When several clusters qualify, the matcher reports all of them as
//! [`MatchResult::Ambiguous`]. Which one runs is left to a
//! [`SelectionPolicy`]; no ordering between clusters is promised.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::core::model::{Cluster, Command, TagSet};
use crate::infra::store::TagStore;

/// A cluster together with the highest-priority matching command linked to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    /// Selected cluster.
    pub cluster: Cluster,
    /// Selected command.
    pub command: Command,
    /// Index of the cluster criteria that matched.
    pub criteria_index: usize,
}

/// Outcome of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// Exactly one cluster qualified.
    Unique(MatchedPair),
    /// Several clusters qualified under the same criteria.
    Ambiguous(Vec<MatchedPair>),
    /// Nothing qualified under any criteria.
    None,
}

impl MatchResult {
    /// Collapse the result to a single pair using `policy` for ambiguous matches.
    pub fn resolve(self, policy: &dyn SelectionPolicy) -> Option<MatchedPair> {
        match self {
            Self::Unique(pair) => Some(pair),
            Self::Ambiguous(candidates) => policy.select(candidates),
            Self::None => None,
        }
    }
}

/// Picks one pair out of an ambiguous match.
pub trait SelectionPolicy: Send + Sync {
    /// Choose among `candidates`, which is never empty when called by the matcher.
    fn select(&self, candidates: Vec<MatchedPair>) -> Option<MatchedPair>;
}

/// Takes the first candidate in the order the store produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFound;

impl SelectionPolicy for FirstFound {
    fn select(&self, candidates: Vec<MatchedPair>) -> Option<MatchedPair> {
        candidates.into_iter().next()
    }
}

/// Picks uniformly at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelection;

impl SelectionPolicy for RandomSelection {
    fn select(&self, candidates: Vec<MatchedPair>) -> Option<MatchedPair> {
        candidates.choose(&mut rand::rng()).cloned()
    }
}

/// `criteria` is fully contained in `tags`. An empty criteria matches everything.
#[must_use]
pub fn satisfies(tags: &TagSet, criteria: &TagSet) -> bool {
    criteria.is_subset(tags)
}

/// Resolves criteria against a [`TagStore`].
#[derive(Clone)]
pub struct CriteriaMatcher {
    store: Arc<dyn TagStore>,
}

impl CriteriaMatcher {
    /// Create a matcher over `store`.
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self { store }
    }

    /// Match cluster criteria, in order, and a command criteria.
    #[must_use]
    pub fn find(&self, cluster_criterias: &[TagSet], command_criteria: &TagSet) -> MatchResult {
        let clusters = self.store.clusters();

        for (index, criteria) in cluster_criterias.iter().enumerate() {
            let candidates: Vec<&Cluster> = clusters
                .iter()
                .filter(|c| c.status.is_eligible() && satisfies(&c.tags, criteria))
                .collect();

            if candidates.is_empty() {
                tracing::debug!(criteria_index = index, "no cluster matched, falling back");
                continue;
            }

            let mut pairs: Vec<MatchedPair> = candidates
                .into_iter()
                .filter_map(|cluster| {
                    self.first_command(&cluster.id, command_criteria)
                        .map(|command| MatchedPair {
                            cluster: cluster.clone(),
                            command,
                            criteria_index: index,
                        })
                })
                .collect();

            match pairs.len() {
                0 => {
                    tracing::debug!(
                        criteria_index = index,
                        "matched clusters have no matching command, falling back"
                    );
                }
                1 => return pairs.pop().map_or(MatchResult::None, MatchResult::Unique),
                _ => return MatchResult::Ambiguous(pairs),
            }
        }
        MatchResult::None
    }

    /// Match and resolve ambiguity with `policy`.
    pub fn find_one(
        &self,
        cluster_criterias: &[TagSet],
        command_criteria: &TagSet,
        policy: &dyn SelectionPolicy,
    ) -> Option<MatchedPair> {
        self.find(cluster_criterias, command_criteria).resolve(policy)
    }

    fn first_command(&self, cluster_id: &str, criteria: &TagSet) -> Option<Command> {
        self.store
            .commands_for_cluster(cluster_id)
            .into_iter()
            .find(|cmd| cmd.status.is_eligible() && satisfies(&cmd.tags, criteria))
    }
}
