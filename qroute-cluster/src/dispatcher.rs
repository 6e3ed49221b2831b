//! Cluster-wide job dispatch
//!
//! Locates, moves and reorders jobs across the instances of a cluster. A job
//! may live on any instance and may be relocated between instances while an
//! operation is in flight, so multi-instance operations fan out round-robin
//! from the instance the [`LocationHint`] remembers:
//!
//! ```text
//! start = hint(job) or 0
//! for each of the N instances, wrapping, skipping instances marked down:
//!     locate:       first non-empty answer wins
//!     move / order: success wins, "unknown job id" tries the next
//!                   instance, any other error is returned as is
//! ```

use crate::config::DispatchConfig;
use crate::cycle::CyclicIndices;
use crate::error::{DispatchError, Result};
use crate::hint::LocationHint;
use crate::instance::ServerInstance;
use crate::metrics::{record_hint_lookup, record_relocation};
use crate::transport::{self, Unreachable};
use crate::types::Operation;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered set of server instances. A cluster of one is a plain instance
/// handle and never fans out.
#[derive(Debug)]
pub struct Cluster {
    instances: Vec<Arc<ServerInstance>>,
}

impl Cluster {
    /// Build a cluster from instances in their fixed cluster order
    pub fn new(instances: Vec<ServerInstance>) -> Result<Self> {
        if instances.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "cluster has no server instances".to_string(),
            ));
        }
        Ok(Self {
            instances: instances.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn single(instance: ServerInstance) -> Self {
        Self {
            instances: vec![Arc::new(instance)],
        }
    }

    /// Connect to every configured server.
    ///
    /// Unreachable servers keep their slot (so hint indices stay stable) but
    /// start out marked down. Fails only when no server could be reached.
    pub async fn connect(config: &DispatchConfig) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "no servers configured".to_string(),
            ));
        }

        let mut instances = Vec::with_capacity(config.servers.len());
        let mut reachable = 0;
        for addr in &config.servers {
            match transport::connect(addr, config.connect_timeout()).await {
                Ok(conn) => {
                    info!("Connected to server instance {}", addr);
                    reachable += 1;
                    instances.push(ServerInstance::new(addr.clone(), conn));
                }
                Err(e) => {
                    warn!("Server instance {} unreachable: {}", addr, e);
                    let instance = ServerInstance::new(addr.clone(), Unreachable);
                    instance.mark_down();
                    instances.push(instance);
                }
            }
        }

        if reachable == 0 {
            return Err(DispatchError::Protocol(format!(
                "cannot connect to any of {} server(s)",
                config.servers.len()
            )));
        }
        Self::new(instances)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instance(&self, index: usize) -> Option<&Arc<ServerInstance>> {
        self.instances.get(index)
    }

    fn is_aggregate(&self) -> bool {
        self.instances.len() > 1
    }
}

/// Client-facing locate / move / order operations over a cluster
pub struct ClusterDispatcher {
    cluster: Arc<Cluster>,
    hints: Arc<LocationHint>,
    user: String,
    extension: Option<String>,
}

impl ClusterDispatcher {
    pub fn new(cluster: Arc<Cluster>, config: &DispatchConfig) -> Self {
        Self {
            cluster,
            hints: Arc::new(LocationHint::with_capacity(config.hint_capacity)),
            user: config.user.clone(),
            extension: config.extension.clone(),
        }
    }

    /// Share a location cache with other dispatchers in the process
    pub fn with_hints(mut self, hints: Arc<LocationHint>) -> Self {
        self.hints = hints;
        self
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn hints(&self) -> &Arc<LocationHint> {
        &self.hints
    }

    /// Find where a job currently lives. `Ok(None)` means no instance knows it.
    pub async fn locate_job(&self, job_id: &str) -> Result<Option<String>> {
        require_id(job_id)?;
        let extension = self.extension.as_deref();

        if !self.cluster.is_aggregate() {
            return self.cluster.instances[0]
                .locate_job(&self.user, job_id, extension)
                .await;
        }

        let start = self.start_index(job_id);
        for index in CyclicIndices::new(start, self.cluster.len()) {
            let instance = &self.cluster.instances[index];
            if !instance.is_up() {
                continue;
            }
            match instance.locate_job(&self.user, job_id, extension).await {
                Ok(Some(location)) => {
                    self.remember(job_id, index, start);
                    return Ok(Some(location));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(job_id, instance = instance.name(), error = %e, "Locate miss");
                }
            }
        }
        Ok(None)
    }

    /// Move a job to `destination`, following it across instances
    pub async fn move_job(&self, job_id: &str, destination: &str) -> Result<()> {
        require_id(job_id)?;
        let user = self.user.as_str();
        let extension = self.extension.as_deref();

        self.fan_out(Operation::MoveJob, job_id, |instance| async move {
            instance.move_job(user, job_id, destination, extension).await
        })
        .await
    }

    /// Swap the queue positions of two jobs.
    ///
    /// Both jobs must live on the same instance; callers validate that before
    /// calling. Reordering across instances is not supported.
    pub async fn order_job(&self, first: &str, second: &str) -> Result<()> {
        require_id(first)?;
        require_id(second)?;
        let user = self.user.as_str();
        let extension = self.extension.as_deref();

        self.fan_out(Operation::OrderJob, first, |instance| async move {
            instance.order_job(user, first, second, extension).await
        })
        .await
    }

    async fn fan_out<F, Fut>(&self, operation: Operation, job_id: &str, mut call: F) -> Result<()>
    where
        F: FnMut(Arc<ServerInstance>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !self.cluster.is_aggregate() {
            return call(Arc::clone(&self.cluster.instances[0])).await;
        }

        let start = self.start_index(job_id);
        let mut last_error = None;
        for index in CyclicIndices::new(start, self.cluster.len()) {
            let instance = &self.cluster.instances[index];
            if !instance.is_up() {
                continue;
            }
            match call(Arc::clone(instance)).await {
                Ok(()) => {
                    self.remember(job_id, index, start);
                    return Ok(());
                }
                Err(e) if e.is_unknown_job() => {
                    debug!(
                        job_id,
                        instance = instance.name(),
                        op = operation.as_str(),
                        "Job not on instance, trying next"
                    );
                    record_relocation(operation.as_str());
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DispatchError::Protocol("no server instance available".to_string())
        }))
    }

    fn start_index(&self, job_id: &str) -> usize {
        self.hints.get(job_id).unwrap_or(0)
    }

    fn remember(&self, job_id: &str, index: usize, start: usize) {
        record_hint_lookup(index == start);
        self.hints.set(job_id, index);
    }
}

fn require_id(job_id: &str) -> Result<()> {
    if job_id.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "job identifier is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::testing::{RequestLog, ScriptedTransport};
    use crate::types::BatchReply;

    type Script = Vec<std::result::Result<BatchReply, crate::transport::TransportError>>;

    fn cluster(scripts: Vec<Script>) -> (Arc<Cluster>, RequestLog) {
        let log = RequestLog::new();
        let instances = scripts
            .into_iter()
            .enumerate()
            .map(|(i, replies)| {
                let label = format!("svr{}", i);
                ServerInstance::new(
                    label.clone(),
                    ScriptedTransport::labeled(&label, replies, log.clone()),
                )
            })
            .collect();
        (Arc::new(Cluster::new(instances).unwrap()), log)
    }

    fn dispatcher(cluster: Arc<Cluster>) -> ClusterDispatcher {
        let config = DispatchConfig {
            user: "alice".into(),
            ..Default::default()
        };
        ClusterDispatcher::new(cluster, &config)
    }

    fn unknown() -> std::result::Result<BatchReply, crate::transport::TransportError> {
        Ok(BatchReply::error(StatusCode::UnknownJobId, None))
    }

    #[tokio::test]
    async fn test_empty_job_id_is_invalid() {
        let (cluster, log) = cluster(vec![vec![], vec![]]);
        let dispatcher = dispatcher(cluster);

        let err = dispatcher.move_job("", "workq").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
        let err = dispatcher.order_job("1.svr", "").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
        let err = dispatcher.locate_job("").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
        assert!(log.visits().is_empty());
    }

    #[tokio::test]
    async fn test_move_relocates_on_unknown_job() {
        let (cluster, log) = cluster(vec![
            vec![unknown()],
            vec![Ok(BatchReply::ok())],
            vec![],
        ]);
        let dispatcher = dispatcher(cluster);

        dispatcher.move_job("7.svr", "workq").await.unwrap();
        assert_eq!(log.visits(), vec!["svr0", "svr1"]);
        assert_eq!(dispatcher.hints().get("7.svr"), Some(1));
    }

    #[tokio::test]
    async fn test_move_stops_on_other_error() {
        let (cluster, log) = cluster(vec![
            vec![Ok(BatchReply::error(StatusCode::UnknownQueue, None))],
            vec![Ok(BatchReply::ok())],
        ]);
        let dispatcher = dispatcher(cluster);

        let err = dispatcher.move_job("7.svr", "nosuchq").await.unwrap_err();
        assert_eq!(err.code(), StatusCode::UnknownQueue);
        assert_eq!(log.visits(), vec!["svr0"]);
    }

    #[tokio::test]
    async fn test_move_starts_at_hint_and_wraps() {
        let (cluster, log) = cluster(vec![
            vec![Ok(BatchReply::ok())],
            vec![],
            vec![unknown()],
        ]);
        let dispatcher = dispatcher(cluster);
        dispatcher.hints().set("7.svr", 2);

        dispatcher.move_job("7.svr", "workq").await.unwrap();
        assert_eq!(log.visits(), vec!["svr2", "svr0"]);
        assert_eq!(dispatcher.hints().get("7.svr"), Some(0));
    }

    #[tokio::test]
    async fn test_move_skips_down_instances() {
        let (cluster, log) = cluster(vec![vec![], vec![Ok(BatchReply::ok())]]);
        cluster.instance(0).unwrap().mark_down();
        let dispatcher = dispatcher(cluster);

        dispatcher.move_job("7.svr", "workq").await.unwrap();
        assert_eq!(log.visits(), vec!["svr1"]);
    }

    #[tokio::test]
    async fn test_move_unknown_everywhere_returns_unknown() {
        let (cluster, log) = cluster(vec![vec![unknown()], vec![unknown()], vec![unknown()]]);
        let dispatcher = dispatcher(cluster);

        let err = dispatcher.move_job("7.svr", "workq").await.unwrap_err();
        assert!(err.is_unknown_job());
        assert_eq!(log.visits().len(), 3);
        assert_eq!(dispatcher.hints().get("7.svr"), None);
    }

    #[tokio::test]
    async fn test_all_instances_down() {
        let (cluster, _) = cluster(vec![vec![], vec![]]);
        cluster.instance(0).unwrap().mark_down();
        cluster.instance(1).unwrap().mark_down();
        let dispatcher = dispatcher(cluster);

        let err = dispatcher.order_job("1.svr", "2.svr").await.unwrap_err();
        assert!(matches!(err, DispatchError::Protocol(_)));
        assert_eq!(dispatcher.locate_job("1.svr").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_locate_first_non_empty_wins() {
        let (cluster, log) = cluster(vec![
            vec![unknown()],
            vec![Ok(BatchReply::located("svr1.example.com"))],
            vec![Ok(BatchReply::located("svr2.example.com"))],
        ]);
        let dispatcher = dispatcher(cluster);

        let location = dispatcher.locate_job("9.svr").await.unwrap();
        assert_eq!(location.as_deref(), Some("svr1.example.com"));
        assert_eq!(log.visits(), vec!["svr0", "svr1"]);
    }

    #[tokio::test]
    async fn test_locate_not_found_visits_each_once() {
        let (cluster, log) = cluster(vec![vec![unknown()], vec![unknown()], vec![unknown()]]);
        let dispatcher = dispatcher(cluster);
        dispatcher.hints().set("9.svr", 1);

        assert_eq!(dispatcher.locate_job("9.svr").await.unwrap(), None);
        assert_eq!(log.visits(), vec!["svr1", "svr2", "svr0"]);
    }

    #[tokio::test]
    async fn test_single_instance_returns_error_directly() {
        let (transport, _) = ScriptedTransport::new(vec![unknown()]);
        let cluster = Arc::new(Cluster::single(ServerInstance::new("only", transport)));
        let dispatcher = dispatcher(cluster);

        let err = dispatcher.locate_job("9.svr").await.unwrap_err();
        assert!(err.is_unknown_job());
    }

    #[tokio::test]
    async fn test_order_encodes_pair_and_extension() {
        let log = RequestLog::new();
        let transport = ScriptedTransport::labeled("svr0", vec![Ok(BatchReply::ok())], log.clone());
        let cluster = Arc::new(Cluster::single(ServerInstance::new("svr0", transport)));
        let config = DispatchConfig {
            user: "bob".into(),
            extension: Some("ext=1".into()),
            ..Default::default()
        };
        let dispatcher = ClusterDispatcher::new(cluster, &config);

        dispatcher.order_job("1.svr", "2.svr").await.unwrap();

        let request = &log.requests()[0];
        assert_eq!(request.header.operation, Operation::OrderJob);
        assert_eq!(request.extension.as_deref(), Some("ext=1"));
        assert_eq!(
            request.body,
            crate::types::RequestBody::MovePair {
                first: "1.svr".into(),
                second: "2.svr".into()
            }
        );
    }

    #[test]
    fn test_empty_cluster_rejected() {
        assert!(Cluster::new(Vec::new()).is_err());
    }
}
