use clap::Parser;
use commands::Commands;
use config_file::TaskConfigFile;
use engine_config::TaskValidator;
use engine_core::progress::{ProgressService, ProgressStage};
use engine_core::state::SledStateStore;
use engine_core::StateStore;
use error::CliError;
use lifecycle::{LifecycleController, TaskRuntime};
use logging_sink::LoggingProgressSink;
use model::connector::ConnectorVariant;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use variable_store::StaticGlobalVariableStore;

mod commands;
mod config_file;
mod error;
mod logging_sink;
mod shutdown;
mod variable_store;

#[derive(Parser)]
#[command(name = "dtaas", version = "0.1.0", about = "Data transfer task runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let exit_code = match run_cli().await {
        Ok(()) => 0,
        Err(CliError::ShutdownRequested) => {
            info!("task stopped by shutdown request, progress has been checkpointed");
            130
        }
        Err(err) => {
            error!("{err}");
            1
        }
    };

    process::exit(exit_code);
}

async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Run { config, state_dir } => run_task(&config, state_dir).await,
        Commands::TestConn { connector } => test_conn(&connector).await,
        Commands::Status {
            state_dir,
            execution,
            table,
            json,
        } => show_status(state_dir, &execution, &table, json).await,
    }
}

fn validate(config_path: &str) -> Result<(), CliError> {
    let config = TaskConfigFile::load(config_path)?;
    let (_, report) =
        TaskValidator::validate(&config.task, &config.source_connector, &config.destination_connector)?;
    if report.is_clean() {
        println!("task '{}' is valid", config.task.name);
    } else {
        println!("task '{}' is valid, with warnings:", config.task.name);
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

async fn run_task(config_path: &str, state_dir: Option<String>) -> Result<(), CliError> {
    let config = TaskConfigFile::load(config_path)?;
    let (validated, report) =
        TaskValidator::validate(&config.task, &config.source_connector, &config.destination_connector)?;
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }

    let state = open_state_store(state_dir)?;

    let source_variant = match &validated.source_connector.variant {
        ConnectorVariant::Source(v) => *v,
        ConnectorVariant::Destination(_) => unreachable!("validated by TaskValidator"),
    };
    let destination_variant = match &validated.destination_connector.variant {
        ConnectorVariant::Destination(v) => *v,
        ConnectorVariant::Source(_) => unreachable!("validated by TaskValidator"),
    };

    let mut source = connectors::source_adapter_for(source_variant);
    source.connect(&validated.source_connector).await?;
    let source: Arc<dyn connectors::source::SourceAdapter> = Arc::from(source);
    let mut destination = connectors::destination_adapter_for(destination_variant);
    destination.connect(&validated.destination_connector).await?;

    let runtime = TaskRuntime {
        task: Mutex::new(validated.task.clone()),
        source: source.clone(),
        destination,
        source_connector: validated.source_connector.clone(),
        destination_connector: validated.destination_connector.clone(),
        variable_store: Box::new(StaticGlobalVariableStore::new(
            config.global_variables,
            source,
            source_variant,
        )),
        state,
        metrics: Arc::new(engine_core::Metrics::default()),
        sink: Arc::new(LoggingProgressSink),
        cancel: Mutex::new(CancellationToken::new()),
    };

    let controller = LifecycleController::new(validated.task.parallel_tables.max(1));
    controller.register(validated.task.id.clone(), runtime);

    let cancel = CancellationToken::new();
    let coordinator = shutdown::ShutdownCoordinator::new(cancel.clone());
    coordinator.register_handlers();

    controller.start(&validated.task.id).await?;

    loop {
        if cancel.is_cancelled() {
            controller.stop(&validated.task.id).await?;
        }
        let status = controller.status(&validated.task.id)?;
        match status {
            model::task::TaskStatus::Completed => {
                info!("task completed");
                return Ok(());
            }
            model::task::TaskStatus::Failed => {
                return Err(CliError::StateStore("task run failed, see logs".to_string()));
            }
            model::task::TaskStatus::Stopped => {
                return Err(CliError::ShutdownRequested);
            }
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn test_conn(connector_path: &str) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(connector_path)?;
    let connector: model::connector::Connector =
        serde_json::from_str(&raw).map_err(CliError::ConfigDeserialize)?;

    match &connector.variant {
        ConnectorVariant::Source(variant) => {
            let mut adapter = connectors::source_adapter_for(*variant);
            adapter.connect(&connector).await?;
            adapter.disconnect().await?;
        }
        ConnectorVariant::Destination(variant) => {
            let mut adapter = connectors::destination_adapter_for(*variant);
            adapter.connect(&connector).await?;
            adapter.disconnect().await?;
        }
    }

    println!("connector '{}' is reachable", connector.name);
    Ok(())
}

async fn show_status(
    state_dir: Option<String>,
    execution: &str,
    table: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let store = open_state_store(state_dir)?;
    let table_execution = store
        .load_table_execution(execution, table)
        .await
        .map_err(|err| CliError::StateStore(err.to_string()))?;
    let service = ProgressService::new(store);
    let status = service
        .table_status(execution, table)
        .await
        .map_err(|err| CliError::StateStore(err.to_string()))?;

    if as_json {
        let stage = match status.stage {
            ProgressStage::NotStarted => "not_started",
            ProgressStage::Running => "running",
            ProgressStage::Done => "done",
        };
        let mut json = serde_json::json!({
            "execution_id": execution,
            "table": table,
            "stage": stage,
            "rows_done": status.rows_done,
        });
        if let Some(execution) = &table_execution {
            json["status"] = serde_json::json!(format!("{:?}", execution.status));
            json["total_rows"] = serde_json::json!(execution.total_rows);
            json["retry_count"] = serde_json::json!(execution.retry_count);
            json["error_message"] = serde_json::json!(execution.error_message);
        }
        println!("{}", serde_json::to_string_pretty(&json).map_err(CliError::JsonSerialize)?);
    } else {
        println!("execution: {execution}");
        println!("table:     {table}");
        println!("stage:     {:?}", status.stage);
        println!("rows done: {}", status.rows_done);
        if let Some(execution) = &table_execution {
            println!("status:    {:?}", execution.status);
            println!("total rows:{}", execution.total_rows);
            println!("retries:   {}", execution.retry_count);
            if let Some(message) = &execution.error_message {
                println!("error:     {message}");
            }
        }
    }
    Ok(())
}

fn open_state_store(state_dir: Option<String>) -> Result<Arc<dyn engine_core::StateStore>, CliError> {
    let path = match state_dir {
        Some(dir) => std::path::PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or(CliError::NoHomeDirectory)?
            .join(".dtaas/state"),
    };
    let store = SledStateStore::open(&path)
        .map_err(|err| CliError::StateStore(format!("failed to open state store at {}: {err}", path.display())))?;
    Ok(Arc::new(store))
}
