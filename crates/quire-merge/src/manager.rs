use std::sync::{Arc, Mutex, Weak};

use quire_graph::CommitGraph;
use quire_types::Clock;

use crate::last_one_wins::LastOneWinsStrategy;
use crate::resolver::MergeResolver;
use crate::strategy::{MergeStrategy, MergeStrategyFactory};

/// Owns the merge policy of a ledger and the per-page resolvers.
///
/// The manager holds the strategy factory and hands each page a resolver
/// wired with a fresh strategy instance. Replacing the factory propagates a
/// fresh strategy to every live resolver. Resolvers keep working as long as
/// the pages holding them do, so the manager must outlive them; it tracks
/// them weakly and never keeps a page alive by itself.
pub struct MergeManager {
    factory: Mutex<Option<Arc<dyn MergeStrategyFactory>>>,
    resolvers: Mutex<Vec<Weak<MergeResolver>>>,
}

impl MergeManager {
    /// A manager with the default last-one-wins policy.
    pub fn new() -> Self {
        let factory: Arc<dyn MergeStrategyFactory> =
            Arc::new(|| Arc::new(LastOneWinsStrategy::new()) as Arc<dyn MergeStrategy>);
        Self::with_factory(Some(factory))
    }

    /// A manager with an explicit policy (or none, leaving conflicts alone).
    pub fn with_factory(factory: Option<Arc<dyn MergeStrategyFactory>>) -> Self {
        Self {
            factory: Mutex::new(factory),
            resolvers: Mutex::new(Vec::new()),
        }
    }

    /// Replace the merge policy and propagate it to live resolvers.
    ///
    /// Resolvers with a merge in flight cancel it and switch once it winds
    /// down.
    pub fn set_factory(&self, factory: Option<Arc<dyn MergeStrategyFactory>>) {
        *self.factory.lock().expect("lock poisoned") = factory.clone();
        let live: Vec<Arc<MergeResolver>> = {
            let mut resolvers = self.resolvers.lock().expect("lock poisoned");
            resolvers.retain(|r| r.strong_count() > 0);
            resolvers.iter().filter_map(Weak::upgrade).collect()
        };
        for resolver in live {
            resolver.set_strategy(factory.as_ref().map(|f| f.make_strategy()));
        }
    }

    /// Create a resolver for one page, carrying the current policy.
    pub fn resolver_for_page(
        &self,
        graph: Arc<CommitGraph>,
        clock: Arc<dyn Clock>,
        max_entries_per_node: usize,
    ) -> Arc<MergeResolver> {
        let resolver = MergeResolver::register(graph, clock, max_entries_per_node);
        let strategy = self
            .factory
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|f| f.make_strategy());
        resolver.set_strategy(strategy);
        self.resolvers
            .lock()
            .expect("lock poisoned")
            .push(Arc::downgrade(&resolver));
        resolver
    }
}

impl Default for MergeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MergeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolvers = self.resolvers.lock().expect("lock poisoned");
        f.debug_struct("MergeManager")
            .field("resolvers", &resolvers.len())
            .finish()
    }
}
