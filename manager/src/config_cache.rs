//! Time-bounded cache of cluster policy, blockchain node metadata and the
//! templates delivered with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::model::{BlockchainInfo, BlockchainNodeInfo, InstanceType, PolicyInfo};
use crate::repository::Repository;
use crate::template::{ManifestTemplate, TemplateStore};

pub const DEFAULT_BLOCKCHAIN: &str = "zcash";
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// Minimum gap between load attempts after a failed one.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// One fully-built view of the configuration. Never mutated once published.
#[derive(Debug)]
pub struct ConfigSnapshot {
    policy: PolicyInfo,
    blockchain: BlockchainInfo,
    nodes: HashMap<String, BlockchainNodeInfo>,
    templates: TemplateStore,
    loaded_at: Instant,
}

impl ConfigSnapshot {
    pub fn new(policy: PolicyInfo, blockchain: BlockchainInfo) -> ManagerResult<Self> {
        let templates = TemplateStore::from_payloads(&blockchain.templates)?;
        let nodes = blockchain
            .nodes
            .iter()
            .map(|node| (node.node_type.clone(), node.clone()))
            .collect();

        Ok(Self {
            policy,
            blockchain,
            nodes,
            templates,
            loaded_at: Instant::now(),
        })
    }

    pub fn policy(&self) -> &PolicyInfo {
        &self.policy
    }

    pub fn blockchain(&self) -> &BlockchainInfo {
        &self.blockchain
    }

    pub fn node_info(&self, instance_type: InstanceType) -> ManagerResult<&BlockchainNodeInfo> {
        self.nodes.get(instance_type.as_str()).ok_or_else(|| {
            ManagerError::NotFound(format!(
                "blockchain node {} in {}",
                instance_type, self.blockchain.name
            ))
        })
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

pub struct ConfigCache {
    repository: Arc<dyn Repository>,
    blockchain: String,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<ConfigSnapshot>>>,
    refresh_lock: Mutex<()>,
    last_failure: StdMutex<Option<Instant>>,
}

impl ConfigCache {
    pub fn new(repository: Arc<dyn Repository>, blockchain: &str, ttl: Duration) -> Self {
        Self {
            repository,
            blockchain: blockchain.to_string(),
            ttl,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            last_failure: StdMutex::new(None),
        }
    }

    pub fn with_defaults(repository: Arc<dyn Repository>) -> Self {
        Self::new(repository, DEFAULT_BLOCKCHAIN, DEFAULT_TTL)
    }

    pub fn blockchain(&self) -> &str {
        &self.blockchain
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    /// Current snapshot, loading it first when missing or expired.
    ///
    /// Readers never wait behind a reload when a stale snapshot exists: the
    /// caller that wins the refresh lock reloads, everyone else gets the
    /// stale value. After a failed load no new attempt is made for
    /// `RETRY_BACKOFF`. If nothing was ever loaded the error is
    /// `ConfigUnavailable`.
    pub async fn snapshot(&self) -> ManagerResult<Arc<ConfigSnapshot>> {
        let current = self.snapshot.read().await.clone();
        match current {
            Some(current) if current.is_fresh(self.ttl) => Ok(current),
            Some(stale) => Ok(self.reload_or_stale(stale).await),
            None => self.first_load().await,
        }
    }

    async fn reload_or_stale(&self, stale: Arc<ConfigSnapshot>) -> Arc<ConfigSnapshot> {
        if self.in_backoff() {
            return stale;
        }
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            return stale;
        };

        match self.load_and_publish().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(blockchain = %self.blockchain, "Config reload failed, serving stale snapshot: {}", e);
                stale
            }
        }
    }

    async fn first_load(&self) -> ManagerResult<Arc<ConfigSnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have loaded or failed while we waited.
        if let Some(current) = self.snapshot.read().await.clone() {
            return Ok(current);
        }
        if self.in_backoff() {
            return Err(ManagerError::ConfigUnavailable(format!(
                "{} configuration has not been loaded yet",
                self.blockchain
            )));
        }

        self.load_and_publish().await.map_err(|e| {
            error!(blockchain = %self.blockchain, "Config load failed: {}", e);
            ManagerError::ConfigUnavailable(e.to_string())
        })
    }

    /// Force a reload. On failure the previous snapshot stays in place; a
    /// cache that never loaded reports `ConfigUnavailable`.
    pub async fn refresh(&self) -> ManagerResult<()> {
        let _guard = self.refresh_lock.lock().await;

        if let Err(e) = self.load_and_publish().await {
            warn!(blockchain = %self.blockchain, "Config refresh failed: {}", e);
            if !self.is_loaded().await {
                return Err(ManagerError::ConfigUnavailable(e.to_string()));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Periodically refresh the cache until the task is aborted.
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting config refresh task");

            loop {
                tokio::time::sleep(interval).await;

                if let Err(e) = self.refresh().await {
                    error!("Config refresh task error: {}", e);
                }
            }
        })
    }

    pub async fn get_policy(&self) -> ManagerResult<PolicyInfo> {
        Ok(self.snapshot().await?.policy().clone())
    }

    pub async fn get_blockchain_node_info(
        &self,
        instance_type: InstanceType,
    ) -> ManagerResult<BlockchainNodeInfo> {
        Ok(self.snapshot().await?.node_info(instance_type)?.clone())
    }

    pub async fn get_instance_template(
        &self,
        instance_type: InstanceType,
    ) -> ManagerResult<ManifestTemplate> {
        self.snapshot()
            .await?
            .templates()
            .get_instance_template(instance_type)
    }

    pub async fn get_app_template(&self) -> ManagerResult<ManifestTemplate> {
        self.snapshot().await?.templates().get_app_template()
    }

    pub async fn get_project_template(&self) -> ManagerResult<ManifestTemplate> {
        self.snapshot().await?.templates().get_project_template()
    }

    fn in_backoff(&self) -> bool {
        self.last_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|at| at.elapsed() < RETRY_BACKOFF)
    }

    /// Load and publish a snapshot. Callers hold `refresh_lock`.
    async fn load_and_publish(&self) -> ManagerResult<Arc<ConfigSnapshot>> {
        let result = self.load().await;
        {
            let mut last_failure = self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
            *last_failure = result.is_err().then(Instant::now);
        }
        Ok(self.publish(result?).await)
    }

    async fn load(&self) -> ManagerResult<ConfigSnapshot> {
        info!("Retrieving policy information");
        let policy = self
            .repository
            .get_policy_info()
            .await
            .context("Failed to get policy")?;

        info!(blockchain = %self.blockchain, "Retrieving blockchain information");
        let blockchain = self
            .repository
            .get_blockchain_info(&self.blockchain)
            .await
            .with_context(|| format!("Failed to get {} blockchain", self.blockchain))?;

        ConfigSnapshot::new(policy, blockchain)
    }

    async fn publish(&self, loaded: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        let loaded = Arc::new(loaded);
        *self.snapshot.write().await = Some(loaded.clone());
        info!(
            blockchain = %self.blockchain,
            nodes = loaded.nodes.len(),
            "Cached blockchain configuration"
        );
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_blockchain, sample_policy, StubRepository};

    fn cache(repo: &Arc<StubRepository>, ttl: Duration) -> ConfigCache {
        ConfigCache::new(repo.clone(), DEFAULT_BLOCKCHAIN, ttl)
    }

    #[tokio::test]
    async fn test_lazy_load_on_first_read() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        let cache = cache(&repo, DEFAULT_TTL);

        assert!(!cache.is_loaded().await);
        let policy = cache.get_policy().await.unwrap();
        assert_eq!(policy.storage_class, "csi");
        assert!(cache.is_loaded().await);

        cache.get_blockchain_node_info(InstanceType::Lwd).await.unwrap();
        assert_eq!(repo.config_fetches(), 1);
    }

    #[tokio::test]
    async fn test_never_loaded_is_unavailable() {
        let repo = Arc::new(StubRepository::new());
        let cache = cache(&repo, DEFAULT_TTL);

        let err = cache.get_policy().await.unwrap_err();
        assert!(matches!(err, ManagerError::ConfigUnavailable(_)));
        assert!(!cache.is_loaded().await);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refetched() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        let cache = cache(&repo, Duration::ZERO);

        cache.get_policy().await.unwrap();
        cache.get_policy().await.unwrap();
        assert_eq!(repo.config_fetches(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_serves_stale_values() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        let cache = cache(&repo, Duration::ZERO);

        cache.get_policy().await.unwrap();
        repo.set_failing(true);

        let policy = cache.get_policy().await.unwrap();
        assert_eq!(policy.domain_name, "zbi.io");
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.get_policy().await.unwrap().domain_name, "zbi.io");
    }

    #[tokio::test]
    async fn test_refresh_swaps_snapshot() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        let cache = cache(&repo, DEFAULT_TTL);

        cache.get_policy().await.unwrap();

        let mut policy = sample_policy();
        policy.domain_name = "example.org".to_string();
        repo.set_policy(policy);

        assert_eq!(cache.get_policy().await.unwrap().domain_name, "zbi.io");
        cache.refresh().await.unwrap();
        assert_eq!(cache.get_policy().await.unwrap().domain_name, "example.org");
    }

    #[tokio::test]
    async fn test_unknown_node_type_not_found() {
        let mut blockchain = sample_blockchain();
        blockchain.nodes.retain(|n| n.node_type != "lwd");
        let repo = Arc::new(StubRepository::with_config(sample_policy(), blockchain));
        let cache = cache(&repo, DEFAULT_TTL);

        let err = cache
            .get_blockchain_node_info(InstanceType::Lwd)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_stale_readers_fetch_once() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        let cache = Arc::new(cache(&repo, DEFAULT_TTL));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_policy().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(repo.config_fetches(), 1);
    }

    #[tokio::test]
    async fn test_stale_readers_skip_slow_failing_reload() {
        let repo = Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()));
        repo.set_latency(Duration::from_millis(200));
        let cache = Arc::new(cache(&repo, Duration::from_millis(100)));

        cache.get_policy().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        repo.set_failing(true);

        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_policy().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().domain_name, "zbi.io");
        }

        // One reload attempt, overlapped by the other readers
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(repo.config_fetches(), 2);

        // Backing off: the next stale read does not hit the repository
        cache.get_policy().await.unwrap();
        assert_eq!(repo.config_fetches(), 2);
    }

    #[tokio::test]
    async fn test_refresh_before_load_is_unavailable() {
        let repo = Arc::new(StubRepository::new());
        let cache = cache(&repo, DEFAULT_TTL);

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, ManagerError::ConfigUnavailable(_)));

        // A failed first load is not retried inside the backoff window
        let err = cache.get_policy().await.unwrap_err();
        assert!(matches!(err, ManagerError::ConfigUnavailable(_)));
        assert_eq!(repo.config_fetches(), 1);
    }
}
