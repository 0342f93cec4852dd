/*!
 * controller - Operation Controller CLI
 *
 * Thin wiring around the `controller-*` crates (spec §1, §6: CLI,
 * config loading, and logging setup are explicitly excluded from the
 * controller's own scope). This binary loads a `ControllerSpec`,
 * initializes logging, and either validates a config file or runs a
 * `Prepare` against in-memory `Master`/`Scheduler` doubles so the
 * wiring can be exercised without a real cluster (the Master, Scheduler
 * and node agents are all external collaborators per spec §1/§6).
 *
 * Version: 0.2.0
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use controller_chunkpool::UnorderedChunkPool;
use controller_core::OperationController;
use controller_model::{CellTag, EdgeId, OperationId, OutputTable, OutputTableId, PoolId, TaskGroupId, TaskId};
use controller_proto::testing::{FakeMaster, FakeScheduler};
use controller_task::{EdgeDescriptor, Task, TaskGroup, TaskTemplate};

use controller::config::ControllerSpec;

fn cli() -> Command {
    Command::new("controller")
        .version("0.2.0")
        .about("Operation Controller for a distributed MapReduce-class compute platform")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("print-default-config")
                .about("Print the built-in default ControllerSpec as TOML"),
        )
        .subcommand(
            Command::new("validate")
                .about("Load and validate a ControllerSpec TOML file")
                .arg(
                    Arg::new("config")
                        .value_name("CONFIG")
                        .help("Path to a controller.toml file")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Prepare an operation against in-memory collaborator doubles")
                .arg(
                    Arg::new("config")
                        .value_name("CONFIG")
                        .help("Path to a controller.toml file")
                        .required(true),
                )
                .arg(
                    Arg::new("operation-id")
                        .long("operation-id")
                        .value_name("ID")
                        .help("Operation id to tag logs/spans with")
                        .default_value("local-dry-run"),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .help("Force debug-level logging regardless of config")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("print-default-config", _)) => print_default_config(),
        Some(("validate", sub)) => validate(sub),
        Some(("run", sub)) => run(sub),
        _ => unreachable!("subcommand_required(true) guarantees a match above"),
    }
}

fn print_default_config() -> Result<()> {
    let spec = ControllerSpec::default();
    let text = toml::to_string_pretty(&spec).context("failed to serialize default config")?;
    print!("{text}");
    Ok(())
}

fn validate(sub: &ArgMatches) -> Result<()> {
    let config_path = PathBuf::from(sub.get_one::<String>("config").unwrap());
    let spec = ControllerSpec::load(&config_path)
        .with_context(|| format!("failed to load {config_path:?}"))?;
    spec.validate().context("config failed validation")?;
    println!("{config_path:?} is valid");
    Ok(())
}

fn run(sub: &ArgMatches) -> Result<()> {
    let config_path = PathBuf::from(sub.get_one::<String>("config").unwrap());
    let operation_id = sub.get_one::<String>("operation-id").unwrap().clone();
    let verbose = sub.get_flag("verbose");

    let spec = ControllerSpec::load(&config_path)
        .with_context(|| format!("failed to load {config_path:?}"))?;
    spec.validate().context("config failed validation")?;
    controller::logging::init_logging(&spec, verbose).context("failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    runtime.block_on(async move {
        let master = Arc::new(FakeMaster::new());
        let scheduler = Arc::new(FakeScheduler::new());

        let user_txn = master
            .start_transaction(None, Duration::from_secs(60))
            .await
            .context("failed to open the ambient user transaction")?;

        let output_table = OutputTable::new("//tmp/controller-dry-run", CellTag("cell-1".into()));
        let operation_spec = spec.to_operation_spec();

        let mut controller = OperationController::new(
            OperationId(operation_id.clone()),
            operation_spec.clone(),
            master,
            scheduler,
            user_txn,
            vec![output_table],
        );

        controller
            .prepare()
            .await
            .context("Prepare failed against the in-memory collaborator doubles")?;

        // Materialize a single map task over an empty pool and signal
        // it has no predecessors left to wait on, so `check_completed`
        // is true without ever scheduling a job (spec §8 boundary
        // behavior: zero input chunks completes immediately after
        // Materialize with no jobs).
        let table_id = OutputTableId(0);
        let pool_id = PoolId(1);
        let pool = UnorderedChunkPool::new(16 * 1024 * 1024, 1000);
        let edge = EdgeDescriptor::to_sink(EdgeId(1), table_id, table_id);
        let mut task = Task::new(
            TaskId(1),
            pool_id,
            TaskTemplate {
                job_type: "map".into(),
                input_format: "yson".into(),
                output_format: "yson".into(),
                user_job_spec: None,
                stripe_slice_count: 1,
                resource_template: controller_model::ResourceLimits {
                    cpu: 1.0,
                    memory_bytes: 0,
                    network: 0.0,
                    user_slots: 1,
                },
                interruptible: false,
                sorted_output: false,
                memory_reserve_quantile: spec.memory_reserve_quantile,
                failed_job_limit: operation_spec.max_failed_job_count,
                destination_cells: vec![],
            },
            Box::new(pool),
            vec![edge],
            Default::default(),
        );
        task.finish_input(TaskId(1));

        let group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        controller.register_task_group(group);
        controller.register_task(task, TaskGroupId(1));

        tracing::info!(
            operation_id = %operation_id,
            state = ?controller.state(),
            "prepared operation with an empty input pool; completing immediately"
        );

        controller
            .complete(vec![Default::default()])
            .await
            .context("commit pipeline failed")?;

        println!("operation {operation_id} finished: {:?}", controller.state());
        anyhow::Ok(())
    })
}
