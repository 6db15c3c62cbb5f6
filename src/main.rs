use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tunpatch::config::{self, Config};
use tunpatch::telemetry::{MetricsRegistry, init_logging};

#[derive(Parser)]
#[command(name = "tunpatch")]
#[command(about = "Forward packets between two TUN interfaces")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the interfaces and start forwarding
    Run {
        /// Path to config.toml (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Decouple reads and writes through a bounded queue
        #[arg(long)]
        queued: bool,

        /// Recycle packet buffers through a shared pool (queued mode only)
        #[arg(long)]
        pooled: bool,
    },
    /// Validate config.toml without touching any interface
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run {
            config,
            queued,
            pooled,
        }) => cmd_run(config.as_deref(), queued, pooled),
        Some(Commands::Validate { config }) => cmd_validate(&config),
        None => cmd_run(None, false, false),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => config::load(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e)),
        None => Ok(Config::default()),
    }
}

fn cmd_run(config_path: Option<&Path>, queued: bool, pooled: bool) -> Result<(), String> {
    use tokio::runtime::Runtime;
    use tunpatch::dataplane::ForwardingSession;
    use tunpatch::device::{Device, TunDevice, link};

    let mut cfg = load_config(config_path)?;
    init_logging(Some(&cfg.log));

    cfg.forwarding.apply_flags(queued, pooled);

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    if unsafe { libc::geteuid() } != 0 {
        return Err("tunpatch must be run as root to create and configure interfaces".to_string());
    }

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let mut devices = Vec::with_capacity(2);
        for (name, iface) in &cfg.interfaces {
            let device = TunDevice::create(name)
                .map_err(|e| format!("Failed to create {}: {}", name, e))?;
            info!("Interface {} created", device.name());

            link::configure(device.name(), &iface.address, iface.mtu())
                .map_err(|e| format!("Failed to configure {}: {}", name, e))?;
            info!("  {} configured: address={}, mtu={}", name, iface.address, iface.mtu());

            devices.push(Arc::new(device));
        }

        let (Some(b), Some(a)) = (devices.pop(), devices.pop()) else {
            return Err("exactly two interfaces are required".to_string());
        };

        let shutdown = shutdown_signal()
            .map_err(|e| format!("Failed to install signal handlers: {}", e))?;

        let metrics = Arc::new(MetricsRegistry::new());
        let handle = ForwardingSession::new(a, b, cfg.forwarding.clone(), metrics).start();
        info!("Forwarding started. Press Ctrl+C to exit.");

        let received = shutdown.await;
        info!("{} received, shutting down", received);

        let metrics = handle.shutdown();
        for (name, value) in metrics.export() {
            info!("{} = {}", name, value);
        }
        Ok(())
    })
}

/// Resolves with the name of the first SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns.
fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                "SIGINT"
            }
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

fn cmd_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = load_config(Some(config_path))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pooled_flag_parses_without_queued() {
        let cli = Cli::try_parse_from(["tunpatch", "run", "--pooled"]).unwrap();
        match cli.command {
            Some(Commands::Run { queued, pooled, .. }) => {
                assert!(!queued);
                assert!(pooled);
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let shutdown = shutdown_signal().unwrap();

        assert_eq!(unsafe { libc::raise(libc::SIGTERM) }, 0);

        let received = tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("SIGTERM was not observed");
        assert_eq!(received, "SIGTERM");
    }
}
