//! Doorbell Chime - rings your desktop when a UniFi Protect doorbell rings.
//!
//! Run with: `cargo run -p chime-service -- start`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chime_core::{
    DoorbellPoller, IdentityGate, Service, Supervisor, SystemHardwareAddress, UnifiClient,
};
use chime_service::{
    ApiState, ChimeReaction, Config, HttpService, api, default_config_path, frontend,
    resolve_port, signal,
};

/// Doorbell Chime - desktop chime for UniFi Protect doorbells.
#[derive(Parser, Debug)]
#[command(name = "doorbell-chime")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chime in the foreground (default behavior).
    Start,

    /// Write a sample configuration file.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let path = args.config.clone().unwrap_or_else(default_config_path);

    match args.command {
        Some(Command::Init) => {
            Config::write_sample(&path)?;
            println!("Wrote sample configuration to {}", path.display());
            Ok(())
        }
        Some(Command::Start) | None => run(path, args.verbose).await,
    }
}

fn init_logging(level: &str, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level))
        .add_directive("tower_http=debug".parse()?);

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run(path: PathBuf, verbose: bool) -> anyhow::Result<()> {
    let config = Config::load_validated(&path)
        .with_context(|| format!("run `doorbell-chime init` to create {}", path.display()))?;

    init_logging(&config.log.level, verbose)?;
    info!("Loaded configuration from {:?}", path);

    let shutdown = CancellationToken::new();
    signal::cancel_on_signal(shutdown.clone());

    let supervisor = build_supervisor(&config)?;
    info!("Services: {}", supervisor.service_names().join(", "));

    let result = match config.boot_option.target() {
        Some(target) => {
            let sampler = match &config.boot_option.interface {
                Some(name) => SystemHardwareAddress::for_interface(name.clone()),
                None => SystemHardwareAddress::new(),
            };
            let gate = IdentityGate::new(sampler, target)
                .with_interval(config.boot_option.check_interval());
            info!("Waiting for hardware address {}", gate.target());
            gate.run(&supervisor, &shutdown).await
        }
        None => supervisor.run(&shutdown).await,
    };

    match result {
        Ok(()) => {
            info!("doorbell chime stopped");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("doorbell chime failed")),
    }
}

fn build_supervisor(config: &Config) -> anyhow::Result<Supervisor> {
    let web_port = resolve_port(config.web.port).context("failed to pick a frontend port")?;
    let api_port = resolve_port(config.api.port).context("failed to pick an API port")?;

    let client = Arc::new(UnifiClient::new(config.unifi.client_options())?);

    let reaction = chime_reaction(config, web_port);
    let poller = DoorbellPoller::new(client.clone(), Arc::new(reaction), config.poller.options());

    let api_state = ApiState::new(client, config.message.templates.clone());
    let api_server = HttpService::local("api", api_port, api::app(api_state));
    let frontend_server = HttpService::local(
        "frontend",
        web_port,
        frontend::app(api_port, config.web.static_dir.clone()),
    );

    let services: Vec<Arc<dyn Service>> = vec![
        Arc::new(poller),
        Arc::new(api_server),
        Arc::new(frontend_server),
    ];
    Ok(Supervisor::new(services))
}

#[allow(unused_mut)]
fn chime_reaction(config: &Config, web_port: u16) -> ChimeReaction {
    let mut reaction = ChimeReaction::new(web_port);
    if !config.notification.enabled {
        return reaction;
    }

    #[cfg(feature = "browser")]
    if config.notification.open_browser {
        reaction = reaction.with_launcher(Arc::new(chime_service::reaction::BrowserLauncher));
    }

    #[cfg(feature = "notifications")]
    {
        reaction = reaction.with_notifier(Arc::new(chime_service::reaction::DesktopNotifier));
    }

    reaction
}
