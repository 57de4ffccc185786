use clap::Parser;
use opsctl_core::{
    OpsctlConfig,
    level::{LevelOverrides, LevelSetting, TokioScheduler},
    logging::{self, LoggingOptions, init_logging},
    port_claim::{HttpShutdownNotifier, PortClaim, StartupMode, TcpPortProbe, claim_or_fail},
};
use opsctl_http::{ServerConfig, start_server};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    8080,
);

/// Loggers of this binary that are always listed, inheriting unless configured.
const BUILTIN_LOGGERS: &[&str] = &[
    "opsctl_core",
    "opsctl_core::level",
    "opsctl_core::port_claim",
    "opsctl_http",
    "tower_http",
];

/// Admin server for temporary log-level overrides.
///
/// On startup the process claims its listen port. In development mode a
/// previous instance on that port is asked to shut down first.
#[derive(Parser, Debug)]
#[command(name = "opsctl")]
#[command(version, about)]
struct Args {
    /// Address to bind the HTTP server [default: 127.0.0.1:8080].
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Treat a taken port as fatal instead of asking its occupant to leave.
    #[arg(long)]
    production: bool,

    /// Port of the previous instance's shutdown endpoint [default: the bind port].
    #[arg(long)]
    shutdown_port: Option<u16>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directives, e.g. `info,opsctl_http=debug`. `RUST_LOG` wins.
    #[arg(long)]
    log_level: Option<String>,

    /// Log to a daily rolling file instead of stderr.
    #[arg(long)]
    log_to_file: bool,

    /// Directory for log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Logger to expose for overrides, as `name` or `name=LEVEL`. Repeatable.
    #[arg(long = "logger", value_parser = parse_logger)]
    loggers: Vec<(String, LevelSetting)>,
}

fn parse_logger(value: &str) -> Result<(String, LevelSetting), String> {
    let (name, setting) = match value.split_once('=') {
        Some((name, level)) => (name, level.parse().map_err(|e| format!("{e}"))?),
        None => (value, LevelSetting::Inherited),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("logger name must not be empty".to_string());
    }
    Ok((name.to_string(), setting))
}

/// Everything startup needs, after merging flags over the config file.
#[derive(Debug)]
struct Startup {
    server: ServerConfig,
    claim: PortClaim,
    notify_timeout: Duration,
    logging: LoggingOptions,
}

fn resolve(args: Args, config: OpsctlConfig) -> anyhow::Result<Startup> {
    let bind_addr = args
        .bind_addr
        .or(config.server.bind_addr)
        .unwrap_or(DEFAULT_BIND_ADDR);
    let mode = if args.production || config.server.production {
        StartupMode::Production
    } else {
        StartupMode::Development
    };
    let shutdown_port = args
        .shutdown_port
        .or(config.server.shutdown_port)
        .unwrap_or(bind_addr.port());

    let timings = config.port_claim_timings()?;
    let claim = PortClaim::new(bind_addr, mode)
        .with_shutdown_port(shutdown_port)
        .with_deadline(timings.deadline())
        .with_poll_interval(timings.poll_interval());

    // The first declaration of a name wins: flags, then file, then built-ins.
    let mut loggers = args.loggers;
    loggers.extend(config.logging.loggers);
    loggers.extend(
        BUILTIN_LOGGERS
            .iter()
            .map(|name| (name.to_string(), LevelSetting::Inherited)),
    );

    Ok(Startup {
        server: ServerConfig { bind_addr, mode },
        claim,
        notify_timeout: timings.notify_timeout(),
        logging: LoggingOptions {
            filter: args.log_level.unwrap_or(config.logging.filter),
            loggers,
            log_to_file: args.log_to_file || config.logging.log_to_file,
            log_dir: args.log_dir.or(config.logging.log_dir),
        },
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = OpsctlConfig::load_or_default(args.config.as_deref())?;
    let startup = resolve(args, config)?;

    let registry = init_logging(&startup.logging)?;
    tracing::info!(
        "Starting opsctl on {} ({:?} mode)",
        startup.server.bind_addr,
        startup.server.mode
    );

    if startup.claim.listen_addr.port() == 0 {
        tracing::debug!("Ephemeral port requested, skipping port claim");
    } else {
        let notifier = HttpShutdownNotifier::new(startup.notify_timeout);
        claim_or_fail(&startup.claim, &TcpPortProbe, &notifier).await;
    }

    let overrides = LevelOverrides::new(registry, Arc::new(TokioScheduler::current()));
    let result = start_server(startup.server, overrides).await;
    logging::flush();
    result?;
    Ok(())
}
