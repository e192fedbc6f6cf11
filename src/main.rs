#![deny(unused)]
//! cellbox - run untrusted commands in a throwaway container.
//!
//! Every one-shot subcommand provisions a sandbox from the loaded
//! configuration, performs a single operation and tears the sandbox down
//! again, also on failure or Ctrl-C.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cellbox_core::config::AppConfig;
use cellbox_core::telemetry::configure_tracing;
use cellbox_core::traits::ToolRegistry;
use cellbox_sandbox::{
    reap_orphans, ContainerEngine, DockerEngine, ResourceLimits, SandboxClient, VolumeBinding,
    VolumeBindingResolver,
};
use cellbox_skills::{register_sandbox_tools, DefaultToolRegistry, ToolSettings};

#[derive(Parser, Debug)]
#[command(name = "cellbox", author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over `config/`
    #[arg(short, long, env = "CELLBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the sandbox image
    #[arg(long, global = true)]
    image: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a shell command and exit with its exit code
    Run {
        /// Timeout in seconds (capped by `sandbox.max_timeout_secs`)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Command line, passed to `sh -c`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Print a file from the sandbox work dir to stdout
    Read { path: String },
    /// Write a file into the sandbox and report the stored size
    Write { path: String, content: String },
    /// Check the engine and validate the configured limits and bindings
    Doctor,
    /// Remove leftover cellbox containers
    Reap,
    /// Print the configured tool definitions as JSON
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(image) = cli.image {
        config.sandbox.image = image;
    }

    if let Err(e) = configure_tracing(&config.logging) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting cellbox");

    match dispatch(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command, config: &AppConfig) -> anyhow::Result<ExitCode> {
    match command {
        Command::Run { timeout, command } => {
            let secs = timeout
                .unwrap_or(config.sandbox.default_timeout_secs)
                .clamp(1, config.sandbox.max_timeout_secs.max(1));
            let command = command.join(" ");
            with_sandbox(config, |client| async move {
                let out = client
                    .run_command(&command, Duration::from_secs(secs))
                    .await?;
                print!("{}", out.stdout);
                eprint!("{}", out.stderr);
                Ok(ExitCode::from(exit_status(out.exit_code)))
            })
            .await
        }
        Command::Read { path } => {
            with_sandbox(config, |client| async move {
                let content = client.read_file(&path).await?;
                std::io::stdout().write_all(&content)?;
                Ok(ExitCode::SUCCESS)
            })
            .await
        }
        Command::Write { path, content } => {
            with_sandbox(config, |client| async move {
                client.write_file(&path, content.as_bytes()).await?;
                let target = client.read_file(&path).await?;
                println!("{} ({} bytes)", path, target.len());
                Ok(ExitCode::SUCCESS)
            })
            .await
        }
        Command::Doctor => doctor(config).await,
        Command::Reap => {
            let engine = DockerEngine::new()?;
            let removed = reap_orphans(&engine).await?;
            println!("removed {} container(s)", removed);
            Ok(ExitCode::SUCCESS)
        }
        Command::Tools => {
            // Definitions do not need a live sandbox or daemon.
            let client = Arc::new(SandboxClient::new(Arc::new(DockerEngine::new()?)));
            let registry = DefaultToolRegistry::new();
            register_sandbox_tools(
                &registry,
                client,
                &ToolSettings::from(&config.sandbox),
                &config.sandbox.tools,
            )
            .await?;
            let definitions = registry.list().await?;
            println!("{}", serde_json::to_string_pretty(&definitions)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Create a sandbox, run `op`, and clean up whatever happened.
async fn with_sandbox<F, Fut>(config: &AppConfig, op: F) -> anyhow::Result<ExitCode>
where
    F: FnOnce(Arc<SandboxClient>) -> Fut,
    Fut: Future<Output = anyhow::Result<ExitCode>>,
{
    let limits = ResourceLimits::try_from(&config.sandbox)?;
    let bindings = configured_bindings(config);

    let engine: Arc<dyn ContainerEngine> =
        Arc::new(DockerEngine::new().context("failed to connect to the container engine")?);
    let client = Arc::new(SandboxClient::new(engine));

    client
        .create(limits, bindings)
        .await
        .context("failed to create sandbox")?;

    let result = tokio::select! {
        result = op(client.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; tearing down sandbox");
            Ok(ExitCode::from(130))
        }
    };

    client.cleanup().await;
    result
}

fn configured_bindings(config: &AppConfig) -> Vec<VolumeBinding> {
    config.sandbox.bindings.iter().map(VolumeBinding::from).collect()
}

async fn doctor(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let mut healthy = true;

    match ResourceLimits::try_from(&config.sandbox) {
        Ok(limits) => {
            let (quota, period) = limits.cpu_quota();
            println!(
                "limits   ok    image={} memory={}B cpu={}/{}us pids={} network={}",
                limits.image,
                limits.memory_limit_bytes,
                quota,
                period,
                limits.pids_limit,
                limits.network_mode()
            );
            match VolumeBindingResolver::resolve(&configured_bindings(config), &limits.work_dir) {
                Ok(bindings) => println!("bindings ok    {} mount(s)", bindings.len()),
                Err(e) => {
                    healthy = false;
                    println!("bindings FAIL  {}", e);
                }
            }
        }
        Err(e) => {
            healthy = false;
            println!("limits   FAIL  {}", e);
        }
    }

    match DockerEngine::new() {
        Ok(engine) => {
            if engine.ping().await {
                println!("engine   ok");
                match engine.list_managed().await {
                    Ok(ids) if !ids.is_empty() => println!(
                        "orphans  WARN  {} leftover container(s); run `cellbox reap`",
                        ids.len()
                    ),
                    Ok(_) => println!("orphans  ok"),
                    Err(e) => println!("orphans  WARN  {}", e),
                }
            } else {
                healthy = false;
                println!("engine   FAIL  daemon not reachable");
            }
        }
        Err(e) => {
            healthy = false;
            println!("engine   FAIL  {}", e);
        }
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Container exit codes outside 0..=255 collapse to 1.
fn exit_status(code: i64) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_collects_trailing_words() {
        let cli = Cli::parse_from(["cellbox", "run", "--timeout", "5", "ls", "-la", "/tmp"]);
        match cli.command {
            Command::Run { timeout, command } => {
                assert_eq!(timeout, Some(5));
                assert_eq!(command.join(" "), "ls -la /tmp");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }
}
