//! Flame ping.
//!
//! Opens one session against an application and runs a batch of tasks in it
//! concurrently, printing each task as it completes.
//!
//! Run against a frontend: cargo run -p flmping -- --endpoint http://127.0.0.1:8080
//!
//! Run against an in-process echo service: cargo run -p flmping -- --local

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use flame_client::{
    ApplicationAttributes, ConnectionRegistry, FlameContext, FlameError, SessionAttributes, Shim,
    Task, TaskInformer,
};
use flame_transport::MemoryFrontend;
use futures::future::try_join_all;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flmping", version, about = "Flame Ping", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.flame/flame-conf.yaml)
    #[arg(long)]
    flame_conf: Option<PathBuf>,
    /// Frontend endpoint, overriding the configuration
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Application the session is bound to
    #[arg(short, long, default_value = "flmping")]
    app: String,
    #[arg(short, long, default_value_t = 1)]
    slots: i32,
    #[arg(short, long, default_value_t = 10)]
    task_num: usize,
    /// Use an in-process echo service instead of a frontend
    #[arg(long)]
    local: bool,
}

/// Prints every task once it completes.
struct OutputInformer;

impl OutputInformer {
    fn new() -> Self {
        println!("{:<38}{:<8}{:<10}Output", "Session", "Task", "State");
        Self
    }
}

impl TaskInformer for OutputInformer {
    fn on_update(&mut self, task: &Task) {
        if task.is_completed() {
            let output = task
                .output
                .as_ref()
                .map(|out| String::from_utf8_lossy(out).into_owned())
                .unwrap_or_default();
            let state = format!("{:?}", task.state);
            println!(
                "{:<38}{:<8}{state:<10}{output}",
                task.session_id, task.id
            );
        }
    }

    fn on_error(&mut self, error: &FlameError) {
        tracing::error!("Task failed: {error}");
    }
}

fn load_context(cli: &Cli) -> anyhow::Result<FlameContext> {
    let mut ctx = match &cli.flame_conf {
        Some(path) => FlameContext::from_file(Some(path.clone()))?,
        None => FlameContext::from_file(None).unwrap_or_else(|e| {
            tracing::debug!("No configuration file, using environment: {e}");
            FlameContext::from_env()
        }),
    };
    if let Some(endpoint) = &cli.endpoint {
        ctx.endpoint.clone_from(endpoint);
    }
    Ok(ctx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let ctx = load_context(&cli)?;

    let registry = if cli.local {
        ConnectionRegistry::new(Arc::new(MemoryFrontend::echo()), Some(ctx.endpoint.clone()))
    } else {
        ConnectionRegistry::from_context(&ctx)
    };
    let conn = registry
        .instance()
        .await
        .with_context(|| format!("failed to connect to <{}>", ctx.endpoint))?;

    if cli.local && cli.app != "echo" {
        conn.register_application(&cli.app, &ApplicationAttributes::new(Shim::Log))
            .await?;
    }

    let started = Instant::now();
    let mut ssn = conn
        .create_session(&SessionAttributes::new(cli.app.as_str(), cli.slots))
        .await?;
    println!(
        "Session <{}> was created in <{} ms>, start to run <{}> tasks in the session:\n",
        ssn.id(),
        started.elapsed().as_millis(),
        cli.task_num
    );

    let informer = Arc::new(Mutex::new(OutputInformer::new()));
    let started = Instant::now();
    let session = &ssn;
    let tasks = (0..cli.task_num).map(|i| {
        let mut informer = Arc::clone(&informer);
        async move {
            let input = Bytes::from(format!("ping-{i}"));
            session.run_task(Some(input), &mut informer).await
        }
    });
    try_join_all(tasks).await?;

    println!(
        "\n<{}> tasks were completed in <{} ms>.\n",
        cli.task_num,
        started.elapsed().as_millis()
    );

    let info = ssn.close().await?;
    tracing::info!(
        "Session <{}> closed: {} succeed, {} failed",
        info.id,
        info.succeed,
        info.failed
    );
    registry.close().await;

    Ok(())
}
