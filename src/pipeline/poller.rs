// src/pipeline/poller.rs

use crate::{
    config::SubgraphConfig,
    data_pipeline::{Pool, PoolSource},
    error::SubgraphError,
    graph_engine::{FlowGraph, GraphBuildOptions, build_flow_graph},
    identity::IdentityResolver,
    state::{NodePosition, PositionStore, SnapshotCache, has_changes, merge},
};
use arc_swap::ArcSwap;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Le fetch n'apporte rien de nouveau : ni fusion, ni reconstruction.
    Unchanged,
    /// Fusion, sauvegarde et reconstruction effectuées.
    Updated { pool_count: usize },
    /// Un autre cycle était déjà en cours.
    Skipped,
}

/// Orchestration d'un cycle : fetch -> fusion -> sauvegarde -> reconstruction du graphe.
///
/// La collection de pools fait autorité et n'est modifiée que sous le verrou ;
/// le graphe publié est lisible à tout moment sans verrou via `graph()`.
/// Toute publication (reconstruction, positions du rendu) passe par `publish`.
pub struct FlowPoller {
    config: SubgraphConfig,
    source: Arc<dyn PoolSource>,
    resolver: Arc<dyn IdentityResolver>,
    snapshots: SnapshotCache,
    positions: PositionStore,
    options: GraphBuildOptions,
    pools: Mutex<Vec<Pool>>,
    graph: ArcSwap<FlowGraph>,
    publish: StdMutex<()>,
}

impl FlowPoller {
    pub fn new(
        config: SubgraphConfig,
        source: Arc<dyn PoolSource>,
        resolver: Arc<dyn IdentityResolver>,
        snapshots: SnapshotCache,
        positions: PositionStore,
        options: GraphBuildOptions,
    ) -> Self {
        Self {
            config,
            source,
            resolver,
            snapshots,
            positions,
            options,
            pools: Mutex::new(Vec::new()),
            graph: ArcSwap::from_pointee(FlowGraph::default()),
            publish: StdMutex::new(()),
        }
    }

    /// Le graphe courant.
    pub fn graph(&self) -> Arc<FlowGraph> {
        self.graph.load_full()
    }

    /// Copie de la collection de pools faisant autorité.
    pub async fn pools(&self) -> Vec<Pool> {
        self.pools.lock().await.clone()
    }

    /// Charge le snapshot en cache (s'il correspond à la configuration) et construit
    /// un premier graphe avant tout appel réseau. Renvoie vrai si un snapshot a été utilisé.
    pub async fn bootstrap(&self) -> bool {
        let mut pools = self.pools.lock().await;
        let Some(snapshot) = self.snapshots.load_cached_snapshot(&self.config) else {
            info!("[Poller] Aucun snapshot exploitable, démarrage à vide.");
            return false;
        };
        info!(pool_count = snapshot.pools.len(), cached_at = snapshot.cached_at, "[Poller] Démarrage depuis le snapshot.");
        *pools = merge(&pools, &snapshot.pools);
        self.rebuild(&pools).await;
        true
    }

    /// Un cycle complet. Seules les erreurs du subgraph remontent ; l'état
    /// existant n'est pas touché en cas d'échec.
    #[instrument(skip(self), fields(token = %self.config.token_address))]
    pub async fn poll_once(&self) -> Result<PollOutcome, SubgraphError> {
        let Ok(mut pools) = self.pools.try_lock() else {
            debug!("[Poller] Cycle précédent en cours, cycle sauté.");
            return Ok(PollOutcome::Skipped);
        };

        let incoming = self.source.fetch_pools(&self.config).await?;

        if !has_changes(&pools, &incoming) {
            debug!(pool_count = pools.len(), "[Poller] Aucun changement.");
            return Ok(PollOutcome::Unchanged);
        }

        let merged = merge(&pools, &incoming);
        self.snapshots.save_snapshot(&merged, &self.config);
        *pools = merged;
        self.rebuild(&pools).await;

        info!(pool_count = pools.len(), "[Poller] Pools fusionnés, graphe reconstruit.");
        Ok(PollOutcome::Updated { pool_count: pools.len() })
    }

    async fn rebuild(&self, pools: &[Pool]) {
        let saved = self.positions.load();
        let mut built = build_flow_graph(pools, &self.resolver, &saved, &self.options).await;

        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        // Des positions ont pu être enregistrées pendant la construction : la carte persistée prime.
        let persisted = self.positions.upsert(&built.new_positions);
        apply_positions(&mut built.graph, &persisted);
        self.graph.store(Arc::new(built.graph));
    }

    /// Enregistre des positions venant du rendu (nœuds déplacés) et les applique
    /// au graphe publié.
    pub fn record_positions(&self, positions: &HashMap<String, NodePosition>) {
        let positions: HashMap<String, NodePosition> =
            positions.iter().map(|(address, p)| (address.to_lowercase(), *p)).collect();

        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        self.positions.upsert(&positions);
        self.graph.rcu(|current| {
            let mut graph = (**current).clone();
            apply_positions(&mut graph, &positions);
            graph
        });
    }

    /// Boucle de polling. `on_update` est appelé après chaque reconstruction.
    /// Les erreurs de fetch sont journalisées et le cycle suivant réessaie.
    pub async fn run<F>(&self, interval: Duration, mut on_update: F)
    where
        F: FnMut(&FlowGraph),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(PollOutcome::Updated { .. }) => on_update(&*self.graph()),
                Ok(_) => {}
                Err(e) => error!(error = %e, "[Poller] Échec du cycle, état conservé."),
            }
        }
    }
}

fn apply_positions(graph: &mut FlowGraph, positions: &HashMap<String, NodePosition>) {
    for node in &mut graph.nodes {
        if let Some(p) = positions.get(&node.id) {
            node.x = p.x;
            node.y = p.y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_pipeline::{Account, PoolDistributor, PoolMember};
    use crate::identity::{IdentityProfile, NoIdentity};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";
    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    /// Source qui rejoue une suite de réponses ; la dernière est répétée.
    struct ScriptedSource {
        responses: StdMutex<Vec<Result<Vec<Pool>, SubgraphError>>>,
        last: StdMutex<Option<Vec<Pool>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<Pool>, SubgraphError>>) -> Self {
            Self { responses: StdMutex::new(responses), last: StdMutex::new(None) }
        }
    }

    #[async_trait]
    impl PoolSource for ScriptedSource {
        async fn fetch_pools(&self, _config: &SubgraphConfig) -> Result<Vec<Pool>, SubgraphError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(self.last.lock().unwrap().clone().unwrap_or_default());
            }
            let next = responses.remove(0);
            if let Ok(pools) = &next {
                *self.last.lock().unwrap() = Some(pools.clone());
            }
            next
        }
    }

    fn pool(id: &str, flow_rate: &str) -> Pool {
        Pool {
            id: id.to_string(),
            admin: None,
            total_units: Some("10".to_string()),
            flow_rate: Some(flow_rate.to_string()),
            per_unit_flow_rate: None,
            pool_members: vec![PoolMember {
                id: format!("{}-m", id),
                account: Account::new(B),
                units: "10".to_string(),
                is_connected: None,
            }],
            pool_distributors: Some(vec![PoolDistributor {
                id: format!("{}-d", id),
                account: Account::new(A),
                flow_rate: flow_rate.to_string(),
            }]),
        }
    }

    fn poller(source: ScriptedSource, store: Arc<MemoryStore>) -> FlowPoller {
        FlowPoller::new(
            SubgraphConfig::new("https://subgraph.example", TOKEN),
            Arc::new(source),
            Arc::new(NoIdentity),
            SnapshotCache::new(store.clone()),
            PositionStore::new(store),
            GraphBuildOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_cycle_updates_then_stays_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let poller = poller(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")])]), store.clone());

        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Updated { pool_count: 1 });
        let first_graph = poller.graph();
        assert_eq!(first_graph.edges.len(), 1);

        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Unchanged);
        assert!(Arc::ptr_eq(&first_graph, &poller.graph()));

        // Positions des nouveaux nœuds persistées.
        assert_eq!(PositionStore::new(store).load().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_existing_state() {
        let store = Arc::new(MemoryStore::new());
        let poller = poller(
            ScriptedSource::new(vec![
                Ok(vec![pool("0xp1", "100")]),
                Err(SubgraphError::EmptyResponse),
                Ok(vec![pool("0xp2", "50")]),
            ]),
            store,
        );

        poller.poll_once().await.unwrap();
        assert!(matches!(poller.poll_once().await, Err(SubgraphError::EmptyResponse)));
        assert_eq!(poller.pools().await.len(), 1);

        // p1 a disparu du fetch mais reste dans la collection.
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Updated { pool_count: 2 });
        assert_eq!(poller.graph().edges.len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_from_snapshot_keeps_positions_stable() {
        let store = Arc::new(MemoryStore::new());
        let first = poller(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")])]), store.clone());
        first.poll_once().await.unwrap();
        let before = first.graph();

        let second = poller(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")])]), store);
        assert!(second.bootstrap().await);
        let after = second.graph();
        assert_eq!(after.nodes.len(), 2);
        for node in &after.nodes {
            let old = before.node(&node.id).unwrap();
            assert_eq!((node.x, node.y), (old.x, old.y));
        }
        assert_eq!(second.poll_once().await.unwrap(), PollOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let poller = poller(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")])]), store);
        let _guard = poller.pools.lock().await;
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_record_positions_updates_published_graph() {
        let store = Arc::new(MemoryStore::new());
        let poller = poller(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")])]), store);
        poller.poll_once().await.unwrap();

        let mut moved = HashMap::new();
        moved.insert(A.to_string(), NodePosition { x: 5.0, y: 6.0 });
        poller.record_positions(&moved);

        let node = poller.graph().node(A).cloned().unwrap();
        assert_eq!((node.x, node.y), (5.0, 6.0));
    }

    /// Résolveur qui, une fois armé, se bloque jusqu'à `release`.
    #[derive(Default)]
    struct GatedResolver {
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl IdentityResolver for GatedResolver {
        async fn resolve(&self, _addresses: &[String]) -> HashMap<String, IdentityProfile> {
            if self.armed.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            HashMap::new()
        }
    }

    #[tokio::test]
    async fn test_positions_recorded_during_rebuild_survive_publication() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(GatedResolver::default());
        let poller = Arc::new(FlowPoller::new(
            SubgraphConfig::new("https://subgraph.example", TOKEN),
            Arc::new(ScriptedSource::new(vec![Ok(vec![pool("0xp1", "100")]), Ok(vec![pool("0xp1", "200")])])),
            resolver.clone(),
            SnapshotCache::new(store.clone()),
            PositionStore::new(store.clone()),
            GraphBuildOptions::default(),
        ));
        poller.poll_once().await.unwrap();

        resolver.armed.store(true, Ordering::SeqCst);
        let cycle = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll_once().await }
        });
        resolver.entered.notified().await;

        // Le rendu déplace un nœud pendant que la reconstruction attend les identités.
        let mut moved = HashMap::new();
        moved.insert(A.to_uppercase().replace("0X", "0x"), NodePosition { x: -42.0, y: 17.0 });
        poller.record_positions(&moved);

        resolver.release.notify_one();
        assert_eq!(cycle.await.unwrap().unwrap(), PollOutcome::Updated { pool_count: 1 });

        let graph = poller.graph();
        assert_eq!(graph.edges[0].flow_rate, crate::math::U256::from(200u64));
        let node = graph.node(A).unwrap();
        assert_eq!((node.x, node.y), (-42.0, 17.0));
        assert_eq!(PositionStore::new(store).load()[A], NodePosition { x: -42.0, y: 17.0 });
    }
}
