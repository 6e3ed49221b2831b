//! Routing sweeps that move jobs through a live cluster.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use qroute::{
    DispatchMover, JobState, QueueSettings, RouteEngine, RouteError, RouteMessages, RouteQueue,
};
use qroute_cluster::{
    BatchHandler, Cluster, ClusterDispatcher, DispatchConfig, DispatchError, InstanceServer,
    StatusCode,
};
use std::collections::HashMap;
use std::sync::Arc;

const BUSY: u32 = 15046;

/// Instance holding jobs by id. Queue "busyq" always refuses with a
/// retryable code; queues not listed are unknown.
struct Instance {
    jobs: Mutex<HashMap<String, String>>,
}

impl Instance {
    fn new(jobs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(
                jobs.iter()
                    .map(|id| (id.to_string(), "routeq".to_string()))
                    .collect(),
            ),
        })
    }

    fn queue_of(&self, job_id: &str) -> Option<String> {
        self.jobs.lock().get(job_id).cloned()
    }
}

#[async_trait]
impl BatchHandler for Instance {
    async fn locate_job(&self, _user: &str, job_id: &str) -> qroute_cluster::Result<String> {
        self.queue_of(job_id)
            .ok_or_else(|| DispatchError::server(StatusCode::UnknownJobId, None))
    }

    async fn move_job(
        &self,
        _user: &str,
        job_id: &str,
        destination: &str,
    ) -> qroute_cluster::Result<()> {
        let mut jobs = self.jobs.lock();
        let Some(queue) = jobs.get_mut(job_id) else {
            return Err(DispatchError::server(StatusCode::UnknownJobId, None));
        };
        match destination {
            "workq" => {
                *queue = destination.to_string();
                Ok(())
            }
            "busyq" => Err(DispatchError::server(StatusCode::Other(BUSY), None)),
            _ => Err(DispatchError::server(StatusCode::UnknownQueue, None)),
        }
    }

    async fn order_job(
        &self,
        _user: &str,
        _first: &str,
        _second: &str,
    ) -> qroute_cluster::Result<()> {
        Ok(())
    }
}

async fn engine(instances: &[Arc<Instance>]) -> RouteEngine {
    let mut servers = Vec::new();
    for instance in instances {
        let handler: Arc<dyn BatchHandler> = instance.clone();
        let server = InstanceServer::bind("127.0.0.1:0", handler).await.unwrap();
        servers.push(server.local_addr().unwrap().to_string());
        tokio::spawn(server.serve());
    }
    let config = DispatchConfig {
        user: "tester".into(),
        servers,
        connect_timeout_ms: 1000,
        ..Default::default()
    };
    let cluster = Arc::new(Cluster::connect(&config).await.unwrap());
    let dispatcher = Arc::new(ClusterDispatcher::new(cluster, &config));
    RouteEngine::new(
        Arc::new(DispatchMover::new(dispatcher)),
        RouteMessages::default(),
    )
}

fn queue(destinations: &[&str]) -> RouteQueue {
    RouteQueue::new(QueueSettings::new(
        "routeq",
        destinations.iter().map(|d| d.to_string()).collect(),
    ))
}

#[tokio::test]
async fn sweep_moves_job_past_unknown_queue() {
    let instances = vec![Instance::new(&[]), Instance::new(&["1.svr"])];
    let engine = engine(&instances).await;
    let mut queue = queue(&["nosuchq", "workq"]);
    let now = Utc::now();
    queue.enqueue("1.svr", now);

    let report = engine.queue_route(&mut queue, now).await;

    assert_eq!(report.examined, 1);
    assert_eq!(report.dispatched, 1);
    assert!(report.aborted.is_empty());
    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.moved[0].state, JobState::Moved);
    assert_eq!(report.moved[0].rejected_destinations(), &["nosuchq"]);
    assert!(queue.is_empty());
    assert_eq!(instances[1].queue_of("1.svr").as_deref(), Some("workq"));
}

#[tokio::test]
async fn sweep_aborts_job_no_destination_accepts() {
    let instances = vec![Instance::new(&["1.svr", "2.svr"])];
    let engine = engine(&instances).await;
    let mut queue = queue(&["nosuchq", "otherq"]);
    let now = Utc::now();
    queue.enqueue("1.svr", now);
    queue.enqueue("2.svr", now);

    let report = engine.queue_route(&mut queue, now).await;

    assert_eq!(report.aborted.len(), 2);
    for aborted in &report.aborted {
        assert!(matches!(aborted.error, RouteError::Rejected { .. }));
        assert_eq!(aborted.message, RouteMessages::default().rejected);
    }
    assert!(queue.is_empty());
}

#[tokio::test]
async fn busy_destination_is_retried_after_interval() {
    let instances = vec![Instance::new(&["1.svr"])];
    let engine = engine(&instances).await;
    let mut queue = queue(&["busyq"]);
    queue.settings_mut().route_retry_secs = Some(10);
    let now = Utc::now();
    queue.enqueue("1.svr", now);

    let report = engine.queue_route(&mut queue, now).await;
    assert_eq!(report.retry_scheduled, 1);
    let job = queue.job("1.svr").unwrap();
    assert_eq!(job.retry_at, now + Duration::seconds(10));

    // Not due yet: the sweep leaves it alone
    let report = engine.queue_route(&mut queue, now + Duration::seconds(5)).await;
    assert_eq!(report.examined, 0);

    // Still busy: another retry is scheduled
    let report = engine.queue_route(&mut queue, now + Duration::seconds(10)).await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.retry_scheduled, 1);
    assert!(queue.job("1.svr").is_some());
}

#[tokio::test]
async fn expired_job_is_aborted_without_move_attempt() {
    let instances = vec![Instance::new(&["1.svr"])];
    let engine = engine(&instances).await;
    let mut queue = queue(&["workq"]);
    queue.settings_mut().route_lifetime_secs = 60;
    let queued_at = Utc::now();
    queue.enqueue("1.svr", queued_at);

    let report = engine
        .queue_route(&mut queue, queued_at + Duration::seconds(120))
        .await;

    assert_eq!(report.aborted.len(), 1);
    assert!(matches!(report.aborted[0].error, RouteError::Expired { .. }));
    assert_eq!(instances[0].queue_of("1.svr").as_deref(), Some("routeq"));
}
