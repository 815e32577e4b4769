//! Deployment hypervisor scenario runner
//!
//! Seeds an in-memory store from a JSON scenario file (organizations, users,
//! clusters, deployments with dependencies by name) and runs scheduler
//! ticks over it, printing one JSON report per tick and the final deployment
//! states. With `--ticks 0` it instead starts the background scheduler
//! worker at the configured interval and runs until killed, which is the
//! standalone-scheduler deployment mode.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use deployment_hypervisor_core::models::{ClusterId, DeploymentId, DeploymentPriority, UserId};
use deployment_hypervisor_core::scheduler::{Scheduler, SchedulerWorker};
use deployment_hypervisor_core::service::{ClusterCreate, DeploymentCreate, DeploymentView};
use deployment_hypervisor_core::{Config, Supervisor};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "deployment-hypervisor",
    about = "Run scheduler ticks over a seeded deployment scenario"
)]
struct Args {
    /// Path to a JSON scenario file
    #[arg(long)]
    scenario: PathBuf,

    /// Number of scheduler ticks to run; 0 starts the background worker and
    /// runs until killed
    #[arg(long, default_value_t = 1)]
    ticks: u32,

    /// Override the scheduler interval from the environment
    #[arg(long)]
    interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    organizations: Vec<OrganizationSpec>,
    #[serde(default)]
    users: Vec<UserSpec>,
    #[serde(default)]
    clusters: Vec<ClusterSpec>,
    #[serde(default)]
    deployments: Vec<DeploymentSpec>,
}

#[derive(Debug, Deserialize)]
struct OrganizationSpec {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserSpec {
    username: String,
    /// Organization names this user belongs to
    #[serde(default)]
    organizations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterSpec {
    name: String,
    organization: String,
    creator: String,
    total_ram: f64,
    total_cpu: f64,
    #[serde(default)]
    total_gpu: f64,
}

#[derive(Debug, Deserialize)]
struct DeploymentSpec {
    name: String,
    #[serde(default = "default_image")]
    docker_image: String,
    cluster: String,
    user: String,
    required_ram: f64,
    required_cpu: f64,
    #[serde(default)]
    required_gpu: f64,
    /// 1 = LOW, 2 = MEDIUM, 3 = HIGH
    #[serde(default = "default_priority")]
    priority: u8,
    /// Names of deployments that must complete first (earlier in the file)
    #[serde(default)]
    depends_on: Vec<String>,
    /// Start immediately after creation instead of waiting for a tick
    #[serde(default)]
    started: bool,
}

fn default_image() -> String {
    "registry.local/job:latest".to_string()
}

fn default_priority() -> u8 {
    2
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env();
    // The runner drives ticks itself; the supervisor must boot quiescent
    config.testing = true;
    if let Some(secs) = args.interval_seconds {
        config.scheduler_interval = Duration::from_secs(secs.max(1));
    }

    let raw = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario: Scenario =
        serde_json::from_str(&raw).context("parsing scenario JSON")?;

    let supervisor = Supervisor::boot(config.clone());
    seed(&supervisor, &scenario)?;

    if args.ticks == 0 {
        info!(
            interval_secs = config.scheduler_interval.as_secs(),
            "running scheduler worker until killed"
        );
        let _worker = SchedulerWorker::start(
            Arc::clone(supervisor.store()),
            config.scheduler_interval,
        );
        loop {
            std::thread::park();
        }
    }

    let scheduler = Scheduler::new(Arc::clone(supervisor.store()));
    for tick in 1..=args.ticks {
        let reports = scheduler.schedule_all(Utc::now());
        for (cluster_id, report) in &reports {
            println!(
                "{}",
                json!({
                    "tick": tick,
                    "cluster_id": cluster_id,
                    "scheduled": report.scheduled,
                    "preempted": report.preempted,
                    "unschedulable": report.unschedulable,
                })
            );
        }
    }

    let final_states: Vec<DeploymentView> = supervisor
        .store()
        .all_deployments()
        .iter()
        .map(DeploymentView::from)
        .collect();
    println!("{}", serde_json::to_string_pretty(&final_states)?);

    supervisor.shutdown();
    Ok(())
}

/// Populate the store from the scenario, resolving names to issued ids
fn seed(supervisor: &Supervisor, scenario: &Scenario) -> Result<()> {
    let store = supervisor.store();
    let service = supervisor.service();
    let now = Utc::now();

    if scenario.users.is_empty() {
        bail!("scenario needs at least one user");
    }

    let mut users: BTreeMap<String, UserId> = BTreeMap::new();
    for spec in &scenario.users {
        let user = store.add_user(spec.username.clone(), now);
        users.insert(spec.username.clone(), user.id());
    }

    let mut organizations = BTreeMap::new();
    for spec in &scenario.organizations {
        // The first user listing this organization becomes its creator
        let creator = scenario
            .users
            .iter()
            .find(|u| u.organizations.contains(&spec.name))
            .map(|u| users[&u.username])
            .or_else(|| users.values().next().copied())
            .context("scenario needs at least one user")?;
        let org = store.add_organization(spec.name.clone(), creator, now);
        organizations.insert(spec.name.clone(), org.id());
    }

    for spec in &scenario.users {
        for org_name in &spec.organizations {
            let org_id = *organizations
                .get(org_name)
                .with_context(|| format!("user {} references unknown organization {}", spec.username, org_name))?;
            store.add_membership(users[&spec.username], org_id);
        }
    }

    let mut clusters: BTreeMap<String, ClusterId> = BTreeMap::new();
    for spec in &scenario.clusters {
        let organization_id = *organizations
            .get(&spec.organization)
            .with_context(|| format!("cluster {} references unknown organization {}", spec.name, spec.organization))?;
        let creator = *users
            .get(&spec.creator)
            .with_context(|| format!("cluster {} references unknown user {}", spec.name, spec.creator))?;
        let view = service
            .create_cluster(
                creator,
                ClusterCreate {
                    name: spec.name.clone(),
                    total_ram: spec.total_ram,
                    total_cpu: spec.total_cpu,
                    total_gpu: spec.total_gpu,
                    organization_id,
                },
            )
            .map_err(|err| anyhow::anyhow!("creating cluster {}: {}", spec.name, err))?;
        clusters.insert(spec.name.clone(), view.id);
    }

    let mut deployments: BTreeMap<String, DeploymentId> = BTreeMap::new();
    for spec in &scenario.deployments {
        let cluster_id = *clusters
            .get(&spec.cluster)
            .with_context(|| format!("deployment {} references unknown cluster {}", spec.name, spec.cluster))?;
        let user = *users
            .get(&spec.user)
            .with_context(|| format!("deployment {} references unknown user {}", spec.name, spec.user))?;
        let dependency_ids = spec
            .depends_on
            .iter()
            .map(|dep| {
                deployments.get(dep).copied().with_context(|| {
                    format!("deployment {} depends on unknown deployment {}", spec.name, dep)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let priority = DeploymentPriority::try_from(spec.priority)
            .map_err(|err| anyhow::anyhow!("deployment {}: {}", spec.name, err))?;

        let view = service
            .create_deployment(
                user,
                DeploymentCreate {
                    name: spec.name.clone(),
                    docker_image: spec.docker_image.clone(),
                    required_ram: spec.required_ram,
                    required_cpu: spec.required_cpu,
                    required_gpu: spec.required_gpu,
                    priority,
                    cluster_id,
                    dependency_ids,
                },
            )
            .map_err(|err| anyhow::anyhow!("creating deployment {}: {}", spec.name, err))?;
        deployments.insert(spec.name.clone(), view.id);

        if spec.started {
            service
                .start_deployment(user, view.id)
                .map_err(|err| anyhow::anyhow!("starting deployment {}: {}", spec.name, err))?;
        }
    }

    info!(
        users = users.len(),
        organizations = organizations.len(),
        clusters = clusters.len(),
        deployments = deployments.len(),
        "scenario seeded"
    );
    Ok(())
}
