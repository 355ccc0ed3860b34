use crate::dispatcher::DispatchEngine;
use crate::echo::demo_registry;
use crate::runtime_config::EngineConfig;
use crate::scheduler::Scheduler;
use crate::server::LocalConnector;
use crate::worker_pool::WorkerPool;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Built-in scenarios: name, context path, raw request.
const SCENARIOS: [(&str, &str, &str); 3] = [
    ("simple", "", "GET /servletPath HTTP/1.1"),
    ("dispatch", "", "GET /servletPath?dispatch=true HTTP/1.1"),
    (
        "dispatch-with-context",
        "/foo",
        "GET /foo/servletPath?dispatch=true HTTP/1.1",
    ),
];

/// Command-line interface for the continuation engine
#[derive(Parser, Debug)]
#[command(name = "continuum")]
#[command(about = "Request continuation and dispatch engine", long_about = None)]
pub struct Cli {
    /// YAML engine configuration; the environment is used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one request through the demo handlers
    Request {
        /// Request line, e.g. "GET /servletPath HTTP/1.1"
        request_line: String,

        /// Context path the demo handlers are mounted under
        #[arg(long, default_value = "")]
        context_path: String,

        /// Extra request header as "Name: value"
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Run the built-in scenarios and print each response
    Scenarios,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_yaml_file(path),
        None => Ok(EngineConfig::from_env()),
    }
}

fn build_engine(config: &EngineConfig) -> Arc<DispatchEngine> {
    let scheduler: Arc<dyn Scheduler> = Arc::new(WorkerPool::from_engine_config(config));
    DispatchEngine::new(demo_registry(), scheduler, config)
}

fn raw_request(request_line: &str, headers: &[String]) -> String {
    let mut raw = String::from(request_line.trim());
    raw.push_str("\r\n");
    for header in headers {
        raw.push_str(header.trim());
        raw.push_str("\r\n");
    }
    raw.push_str("\r\n");
    raw
}

/// Execute `cli`, writing rendered responses to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let engine = build_engine(&config);

    match &cli.command {
        Commands::Request {
            request_line,
            context_path,
            headers,
        } => {
            let connector = LocalConnector::new(Arc::clone(&engine), context_path, &config);
            let response = connector.get_response(&raw_request(request_line, headers));
            info!(status = response.status, "Request finished");
            out.write_all(response.text.as_bytes())
                .context("failed to write response")?;
        }
        Commands::Scenarios => {
            for (name, context_path, request_line) in SCENARIOS {
                let connector = LocalConnector::new(Arc::clone(&engine), context_path, &config);
                let response = connector.get_response(&raw_request(request_line, &[]));
                writeln!(out, "=== {name} (context {context_path:?}) ===")?;
                out.write_all(response.text.as_bytes())?;
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Parse the process arguments and run against stdout.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&cli, &mut out)
}
