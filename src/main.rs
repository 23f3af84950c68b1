//! `tdp` — CLI front-end for the TDP-lib control plane.
//!
//! Wires the collection loader, DAG engine, variables store, status engine,
//! and deployment planner/runner together behind a small `clap` surface.
//! Configuration is read from `TDP_*` environment variables (optionally
//! loaded from a `.env` file), the way the teacher's CLI layers `dotenvy` +
//! `tracing_subscriber` + `clap` ahead of its core logic.

use std::path::PathBuf;
use std::process::Command;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use tdp_lib::aggregator::Collections;
use tdp_lib::collection::Collection;
use tdp_lib::dag::DagEngine;
use tdp_lib::deployment::runner::{DeploymentRunner, Executor, ExecutorResult};
use tdp_lib::deployment::{planner, DeploymentModel};
use tdp_lib::entities::ServiceComponentName;
use tdp_lib::status::StatusLog;
use tdp_lib::store::DeploymentStore;
use tdp_lib::variables::ClusterVariables;
use tdp_lib::{FixSuggestion, TdpError};

#[derive(Parser)]
#[command(name = "tdp")]
#[command(about = "TDP-lib: control plane for a Hadoop-style cluster deployment")]
#[command(version)]
struct Cli {
    /// Collection directories, in override order. Defaults to `$TDP_COLLECTION_PATH`
    /// (colon-separated).
    #[arg(long, global = true)]
    collection_path: Option<String>,

    /// Root of the variables store. Defaults to `$TDP_VARS`.
    #[arg(long, global = true)]
    vars: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the deterministic operation DAG.
    Dag {
        /// Restrict output to the ancestor closure of these operation names.
        #[arg(long)]
        target: Vec<String>,
    },
    /// Plan a deployment.
    Plan {
        #[command(subcommand)]
        plan: PlanCommands,
    },
    /// Inspect or regenerate cluster status.
    Status {
        #[command(subcommand)]
        status: StatusCommands,
    },
    /// Validate service variables against their schema.
    Vars {
        #[command(subcommand)]
        vars: VarsCommands,
    },
    /// Flip a stuck RUNNING deployment to FAILURE without executor interaction.
    DangerFixRunning,
    /// Run the last PLANNED deployment against the system executor.
    Deploy,
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Plan from a DAG slice.
    Dag {
        #[arg(long)]
        target: Vec<String>,
        #[arg(long)]
        source: Vec<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        restart: bool,
        #[arg(long)]
        stop: bool,
        #[arg(long)]
        reverse: bool,
        #[arg(long)]
        rolling_interval: Option<u64>,
    },
    /// Plan from an explicit operation list.
    Ops {
        names: Vec<String>,
        #[arg(long)]
        host: Vec<String>,
        #[arg(long)]
        extra_var: Vec<String>,
        #[arg(long)]
        rolling_interval: Option<u64>,
    },
    /// Plan a RECONFIGURE deployment from currently-stale entities.
    Reconfigure {
        #[arg(long)]
        rolling_interval: Option<u64>,
    },
    /// Resume the most recent FAILURE deployment.
    Resume,
}

#[derive(Subcommand)]
enum StatusCommands {
    /// Print the current reduced status table.
    Show {
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        stale: Option<bool>,
    },
    /// Detect stale entities from variable edits and append STALE events.
    GenerateStales,
}

#[derive(Subcommand)]
enum VarsCommands {
    /// Validate every service's merged variables against its schema.
    Validate,
}

fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

struct Config {
    collections: Vec<Collection>,
    vars_root: PathBuf,
    state_path: PathBuf,
}

fn load_config(cli: &Cli) -> Result<Config, TdpError> {
    let collection_path = cli
        .collection_path
        .clone()
        .or_else(|| std::env::var("TDP_COLLECTION_PATH").ok())
        .ok_or_else(|| TdpError::other("TDP_COLLECTION_PATH is not set and --collection-path was not given"))?;

    let collections = collection_path
        .split(':')
        .filter(|s| !s.is_empty())
        .map(Collection::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    let vars_root = cli
        .vars
        .clone()
        .or_else(|| std::env::var("TDP_VARS").ok().map(PathBuf::from))
        .ok_or_else(|| TdpError::other("TDP_VARS is not set and --vars was not given"))?;

    // No database crate backs this crate's deployment store; `TDP_DATABASE_DSN`
    // names a flat JSON snapshot file instead of a connection string.
    let state_path = std::env::var("TDP_DATABASE_DSN")
        .map(PathBuf::from)
        .unwrap_or_else(|_| vars_root.join(".tdp-deployments.json"));

    Ok(Config { collections, vars_root, state_path })
}

fn rolling_interval_default() -> Option<u64> {
    std::env::var("TDP_ROLLING_INTERVAL").ok().and_then(|v| v.parse().ok())
}

fn run(cli: Cli) -> Result<(), TdpError> {
    match &cli.command {
        Commands::Dag { target } => cmd_dag(&cli, target),
        Commands::Plan { plan } => cmd_plan(&cli, plan),
        Commands::Status { status } => cmd_status(&cli, status),
        Commands::Vars { vars } => cmd_vars(&cli, vars),
        Commands::DangerFixRunning => cmd_danger_fix_running(&cli),
        Commands::Deploy => cmd_deploy(&cli),
    }
}

fn cmd_dag(cli: &Cli, target: &[String]) -> Result<(), TdpError> {
    let config = load_config(cli)?;
    let collections = Collections::from_collections(&config.collections)?;
    let dag = DagEngine::build(collections.dag_operations())?;

    let targets = if target.is_empty() { None } else { Some(target) };
    let operations = dag.get_operations(None, targets, false, false);
    for op in operations {
        println!("{}", op.name.as_str());
    }
    Ok(())
}

fn cmd_plan(cli: &Cli, plan: &PlanCommands) -> Result<(), TdpError> {
    let config = load_config(cli)?;
    let collections = Collections::from_collections(&config.collections)?;
    let dag = DagEngine::build(collections.dag_operations())?;
    let store = DeploymentStore::load_snapshot(&config.state_path)?;
    let plan_id = store.next_plan_id();

    let deployment = match plan {
        PlanCommands::Dag {
            target,
            source,
            filter,
            regex,
            restart,
            stop,
            reverse,
            rolling_interval,
        } => {
            let targets = if target.is_empty() { None } else { Some(target.as_slice()) };
            let sources = if source.is_empty() { None } else { Some(source.as_slice()) };
            let filter_spec = filter.as_deref().map(|p| (p, *regex));
            planner::from_dag(
                &dag,
                sources,
                targets,
                filter_spec,
                *restart,
                *reverse,
                *stop,
                rolling_interval.or_else(rolling_interval_default),
                plan_id,
            )
            .map_err(TdpError::from)?
        }
        PlanCommands::Ops {
            names,
            host,
            extra_var,
            rolling_interval,
        } => planner::from_operations(
            &collections,
            names,
            host,
            extra_var,
            rolling_interval.or_else(rolling_interval_default),
            plan_id,
        )
        .map_err(TdpError::from)?,
        PlanCommands::Reconfigure { rolling_interval } => {
            let cluster_variables = ClusterVariables::load(&config.vars_root)?;
            let status_log = StatusLog::new();
            status_log.generate_stale_sch_logs(&cluster_variables, &[]);
            let stale = collect_stale(&status_log);
            planner::from_stale_hosted_entities(
                &collections,
                &dag,
                &stale,
                rolling_interval.or_else(rolling_interval_default),
                plan_id,
            )
            .map_err(TdpError::from)?
        }
        PlanCommands::Resume => {
            let failed = store.last_failed().ok_or_else(|| {
                TdpError::other("no FAILURE deployment to resume")
            })?;
            planner::from_failed_deployment(&collections, &failed, plan_id).map_err(TdpError::from)?
        }
    };

    println!(
        "planned deployment {} ({}) with {} operations",
        deployment.id,
        deployment.deployment_type,
        deployment.operations.len()
    );
    for op in &deployment.operations {
        println!(
            "  {:>3}. {}{}",
            op.operation_order,
            op.operation,
            op.host.as_deref().map(|h| format!("@{h}")).unwrap_or_default()
        );
    }
    store.save_plan(deployment);
    store.save_snapshot(&config.state_path)?;
    Ok(())
}

fn collect_stale(
    status_log: &StatusLog,
) -> Vec<(ServiceComponentName, Option<String>, planner::SCHStatusLogEventLike)> {
    status_log
        .find_statuses(None, None, None, Some(true), None)
        .into_iter()
        .map(|(entity, status)| (entity.name, entity.host, (&status).into()))
        .collect()
}

fn cmd_status(cli: &Cli, status: &StatusCommands) -> Result<(), TdpError> {
    let _config = load_config(cli)?;
    let status_log = StatusLog::new();
    match status {
        StatusCommands::Show { service, stale } => {
            for (entity, s) in status_log.find_statuses(service.as_deref(), None, None, *stale, None) {
                println!(
                    "{:<40} configured={:<10} running={:<10} to_config={} to_restart={}",
                    entity.to_string(),
                    s.configured_version.as_deref().unwrap_or("-"),
                    s.running_version.as_deref().unwrap_or("-"),
                    s.to_config,
                    s.to_restart
                );
            }
        }
        StatusCommands::GenerateStales => {
            let config = load_config(cli)?;
            let cluster_variables = ClusterVariables::load(&config.vars_root)?;
            let emitted = status_log.generate_stale_sch_logs(&cluster_variables, &[]);
            info!(count = emitted.len(), "generated stale events");
            println!("generated {} stale event(s)", emitted.len());
        }
    }
    Ok(())
}

fn cmd_vars(cli: &Cli, vars: &VarsCommands) -> Result<(), TdpError> {
    let config = load_config(cli)?;
    let collections = Collections::from_collections(&config.collections)?;
    match vars {
        VarsCommands::Validate => {
            let cluster_variables = ClusterVariables::load(&config.vars_root)?;
            for schema in collections.schemas() {
                let Some(service) = cluster_variables.get(&schema.service_name) else {
                    continue;
                };
                let Some(merged) = service.get_variables(&schema.service_name)? else {
                    continue;
                };
                let instance: serde_json::Value = serde_json::to_value(&merged).unwrap_or_default();
                let compiled = jsonschema::JSONSchema::compile(&schema.schema)
                    .map_err(|e| TdpError::other(format!("invalid schema for {}: {e}", schema.service_name)))?;
                if let Err(errors) = compiled.validate(&instance) {
                    for error in errors {
                        eprintln!("{}: {}", schema.service_name.red(), error);
                    }
                    return Err(TdpError::other(format!(
                        "{} failed schema validation",
                        schema.service_name
                    )));
                }
                println!("{} {}", "ok".green(), schema.service_name);
            }
        }
    }
    Ok(())
}

fn cmd_danger_fix_running(cli: &Cli) -> Result<(), TdpError> {
    let config = load_config(cli)?;
    let store = DeploymentStore::load_snapshot(&config.state_path)?;
    let mut running = store
        .running()
        .ok_or_else(|| TdpError::other("no RUNNING deployment to fix"))?;
    tdp_lib::deployment::runner::force_fail_running(&mut running, now())?;
    store.update(running)?;
    store.save_snapshot(&config.state_path)?;
    println!("{}", "running deployment marked FAILURE".yellow());
    Ok(())
}

fn cmd_deploy(cli: &Cli) -> Result<(), TdpError> {
    let config = load_config(cli)?;
    let collections = Collections::from_collections(&config.collections)?;
    let store = DeploymentStore::load_snapshot(&config.state_path)?;
    let mut deployment: DeploymentModel = store
        .last_planned()
        .ok_or_else(|| TdpError::other("no PLANNED deployment; run `tdp plan` first"))?;
    store.begin_run(deployment.id)?;

    let status_log = StatusLog::new();
    let playbooks = collections.playbooks().clone();
    let playbook_lookup = move |name: &str| playbooks.get(name).map(|p| p.path.display().to_string());
    let cluster_variables = ClusterVariables::load(&config.vars_root)?;
    let version_lookup = move |service: &str| {
        cluster_variables
            .get(service)
            .and_then(|v| v.version())
            .map(|v| v.as_str().to_string())
    };
    let mut runner =
        DeploymentRunner::new(&mut deployment, &status_log, playbook_lookup, version_lookup)?;
    let mut executor = ProcessExecutor;

    let mut tick = 0u64;
    while let Some(outcome) = runner.step(&mut executor, tick) {
        tick += 1;
        println!("operation {} -> {}", outcome.operation_order, outcome.state);
    }
    store.update(deployment)?;
    store.save_snapshot(&config.state_path)?;
    Ok(())
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Shells out to the playbook path as an external process. A stand-in for
/// the original's Ansible runner invocation, since no Ansible crate exists
/// in this dependency stack (see [`tdp_lib::inventory`]); real deployments
/// would point `playbook_path` at an `ansible-playbook`-compatible wrapper
/// script.
struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&mut self, playbook_path: Option<&str>, host: Option<&str>, extra_vars: &[String]) -> ExecutorResult {
        let Some(path) = playbook_path else {
            return ExecutorResult { success: true, log_bytes: Vec::new() };
        };
        let mut command = Command::new(path);
        if let Some(host) = host {
            command.env("TDP_TARGET_HOST", host);
        }
        if !extra_vars.is_empty() {
            command.env("TDP_EXTRA_VARS", extra_vars.join(","));
        }
        match command.output() {
            Ok(output) => {
                let mut log_bytes = output.stdout;
                log_bytes.extend(output.stderr);
                ExecutorResult { success: output.status.success(), log_bytes }
            }
            Err(e) => ExecutorResult {
                success: false,
                log_bytes: format!("failed to spawn {path}: {e}").into_bytes(),
            },
        }
    }
}
