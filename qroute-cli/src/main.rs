mod jobid;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qroute_cluster::{Cluster, ClusterDispatcher, DispatchConfig, DispatchError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobid::{common_server, parse_job_id, with_default_port, JobIdent};

#[derive(Parser, Debug)]
#[command(name = "qroute")]
#[command(about = "Locate, move and reorder jobs across a server cluster")]
#[command(version)]
struct Cli {
    /// Cluster member (host:port); repeat for every instance
    #[arg(short, long = "server", global = true)]
    servers: Vec<String>,

    /// Acting user
    #[arg(short, long, global = true, env = "QROUTE_USER")]
    user: Option<String>,

    /// TOML file with dispatch settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the instance holding a job
    Locate { job_id: String },

    /// Move jobs to a destination queue
    Move {
        /// Destination (queue, queue@server or @server)
        destination: String,

        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Swap the queue positions of two jobs
    Order { first: String, second: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DispatchConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DispatchConfig::default(),
    };
    if !cli.servers.is_empty() {
        config.servers = cli.servers.iter().map(|s| with_default_port(s)).collect();
    }
    if let Some(user) = cli.user {
        config.user = user;
    }

    let code = match cli.command {
        Commands::Locate { job_id } => locate(&config, &job_id).await?,
        Commands::Move {
            destination,
            job_ids,
        } => move_jobs(&config, &destination, &job_ids).await?,
        Commands::Order { first, second } => order(&config, &first, &second).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn locate(config: &DispatchConfig, job_id: &str) -> Result<i32> {
    let job = parse_job_id(job_id)?;
    let dispatcher = connect(config, job.server.as_deref()).await?;

    let (code, line) = locate_status(&job.id, dispatcher.locate_job(&job.id).await);
    if code == 0 {
        println!("{}", line);
    } else {
        eprintln!("{}", line);
    }
    Ok(code)
}

/// Exit code and output line for a locate answer
fn locate_status(
    job_id: &str,
    result: std::result::Result<Option<String>, DispatchError>,
) -> (i32, String) {
    match result {
        Ok(Some(location)) => (0, location),
        Ok(None) => (1, format!("qroute locate: Unknown Job Id {}", job_id)),
        Err(e) => (e.exit_code(), error_line("locate", job_id, &e)),
    }
}

/// Moves every job, connecting once per server the job ids name; the exit
/// code is that of the last failure
async fn move_jobs(
    config: &DispatchConfig,
    destination: &str,
    job_ids: &[String],
) -> Result<i32> {
    let jobs = job_ids
        .iter()
        .map(|id| parse_job_id(id))
        .collect::<Result<Vec<JobIdent>, _>>()?;

    let mut code = 0;
    for (server, group) in move_groups(!config.servers.is_empty(), jobs) {
        let dispatcher = match connect(config, server.as_deref()).await {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                for job in &group {
                    eprintln!("qroute move: {:#} {}", e, job.id);
                }
                code = 1;
                continue;
            }
        };
        for job in &group {
            if let Err(e) = dispatcher.move_job(&job.id, destination).await {
                eprintln!("{}", error_line("move", &job.id, &e));
                code = e.exit_code();
            }
        }
    }
    Ok(code)
}

/// Split jobs by the server their ids name, keeping first-seen order.
///
/// With configured servers every job goes to the one cluster, which finds
/// each job itself.
fn move_groups(configured: bool, jobs: Vec<JobIdent>) -> Vec<(Option<String>, Vec<JobIdent>)> {
    if configured {
        return vec![(None, jobs)];
    }
    let mut groups: Vec<(Option<String>, Vec<JobIdent>)> = Vec::new();
    for job in jobs {
        let server = job.server.as_deref().map(with_default_port);
        match groups.iter_mut().find(|(s, _)| *s == server) {
            Some((_, members)) => members.push(job),
            None => groups.push((server, vec![job])),
        }
    }
    groups
}

async fn order(config: &DispatchConfig, first: &str, second: &str) -> Result<i32> {
    let first = parse_job_id(first)?;
    let second = parse_job_id(second)?;
    let server = common_server(&first, &second)?;
    let dispatcher = connect(config, server.as_deref()).await?;

    match dispatcher.order_job(&first.id, &second.id).await {
        Ok(()) => Ok(0),
        Err(e) => {
            let both = format!("{} or {}", first.id, second.id);
            eprintln!("{}", error_line("order", &both, &e));
            Ok(e.exit_code())
        }
    }
}

/// Configured servers win; otherwise the server a job id names
fn cluster_servers(configured: &[String], job_server: Option<&str>) -> Result<Vec<String>> {
    if !configured.is_empty() {
        return Ok(configured.to_vec());
    }
    match job_server {
        Some(server) => Ok(vec![with_default_port(server)]),
        None => bail!("no server given; use --server or a config file"),
    }
}

async fn connect(
    config: &DispatchConfig,
    job_server: Option<&str>,
) -> Result<ClusterDispatcher> {
    let config = DispatchConfig {
        servers: cluster_servers(&config.servers, job_server)?,
        ..config.clone()
    };
    tracing::debug!(servers = ?config.servers, user = %config.user, "Connecting");

    let cluster = Cluster::connect(&config)
        .await
        .context("cannot connect to any server")?;
    Ok(ClusterDispatcher::new(Arc::new(cluster), &config))
}

/// Message printed for a failed operation: server text when there is one
fn error_line(command: &str, job_id: &str, err: &DispatchError) -> String {
    match err.server_text() {
        Some(text) => format!("qroute {}: {} {}", command, text, job_id),
        None => format!("qroute {}: {} {}", command, err, job_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qroute_cluster::StatusCode;

    fn ids(texts: &[&str]) -> Vec<JobIdent> {
        texts.iter().map(|t| parse_job_id(t).unwrap()).collect()
    }

    #[test]
    fn test_move_groups_by_named_server() {
        let groups = move_groups(false, ids(&["1.svrA", "2.svrB", "3.svrA:15001", "4"]));

        let servers: Vec<Option<&str>> = groups.iter().map(|(s, _)| s.as_deref()).collect();
        assert_eq!(servers, vec![Some("svrA:15001"), Some("svrB:15001"), None]);

        let first: Vec<&str> = groups[0].1.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(first, vec!["1.svrA", "3.svrA:15001"]);
        assert_eq!(groups[1].1[0].id, "2.svrB");
        assert_eq!(groups[2].1[0].id, "4");
    }

    #[test]
    fn test_move_groups_single_cluster_when_configured() {
        let groups = move_groups(true, ids(&["1.svrA", "2.svrB"]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, None);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_cluster_servers() {
        let configured = vec!["a:1".to_string(), "b:2".to_string()];
        assert_eq!(cluster_servers(&configured, Some("c")).unwrap(), configured);
        assert_eq!(
            cluster_servers(&[], Some("svrA")).unwrap(),
            vec!["svrA:15001".to_string()]
        );
        assert!(cluster_servers(&[], None).is_err());
    }

    #[test]
    fn test_error_line_prefers_server_text() {
        let err = DispatchError::server(StatusCode::UnknownQueue, Some("Unknown queue".into()));
        assert_eq!(
            error_line("move", "1.svr", &err),
            "qroute move: Unknown queue 1.svr"
        );

        let err = DispatchError::Protocol("connection closed".into());
        assert_eq!(
            error_line("order", "1.svr or 2.svr", &err),
            "qroute order: Protocol error: connection closed 1.svr or 2.svr"
        );
    }

    #[test]
    fn test_locate_status_exit_codes() {
        assert_eq!(
            locate_status("1.svr", Ok(Some("svrA".into()))),
            (0, "svrA".to_string())
        );

        let (code, line) = locate_status("1.svr", Ok(None));
        assert_eq!(code, 1);
        assert_eq!(line, "qroute locate: Unknown Job Id 1.svr");

        let err = DispatchError::server(StatusCode::Permission, None);
        let (code, line) = locate_status("1.svr", Err(err.clone()));
        assert_eq!(code, err.exit_code());
        assert_ne!(code, 0);
        assert_eq!(line, "qroute locate: Unauthorized Request (15007) 1.svr");
    }
}
