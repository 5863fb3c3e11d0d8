use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use downlink_client::{ClientConfig, StreamingClient, TelemetryView, WebSocketTransport};
use downlink_core::{codec, RegressionPolicy};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("downlink")
        .version(downlink_client::VERSION)
        .about("Spacecraft telemetry stream client")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("watch")
                .about("Connect to a telemetry stream and log every update")
                .arg(
                    Arg::new("endpoint")
                        .long("endpoint")
                        .value_parser(value_parser!(String))
                        .help("WebSocket URL of the telemetry source"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("reconnect-ms")
                        .long("reconnect-ms")
                        .value_parser(value_parser!(u64))
                        .help("Fixed delay before reconnecting, in milliseconds"),
                )
                .arg(
                    Arg::new("history")
                        .long("history")
                        .value_parser(value_parser!(usize))
                        .help("Number of samples kept in the rolling history"),
                )
                .arg(
                    Arg::new("connect-timeout-ms")
                        .long("connect-timeout-ms")
                        .value_parser(value_parser!(u64))
                        .help("Abandon a connect attempt after this many milliseconds"),
                )
                .arg(
                    Arg::new("clamp-regressions")
                        .long("clamp-regressions")
                        .action(ArgAction::SetTrue)
                        .help("Never let duplicate or reordered packets reduce the loss counter"),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode one envelope and print it normalised")
                .arg(
                    Arg::new("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("File containing the envelope (stdin when omitted)"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("watch", args)) => watch(args).await,
        Some(("decode", args)) => decode(args),
        _ => Ok(()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_config(args: &ArgMatches) -> anyhow::Result<ClientConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::new(),
    };

    if let Some(endpoint) = args.get_one::<String>("endpoint") {
        config = config.with_endpoint(endpoint.clone());
    }
    if let Some(ms) = args.get_one::<u64>("reconnect-ms") {
        config = config.with_reconnect_delay(Duration::from_millis(*ms));
    }
    if let Some(capacity) = args.get_one::<usize>("history") {
        config = config.with_history_capacity(*capacity);
    }
    if let Some(ms) = args.get_one::<u64>("connect-timeout-ms") {
        config = config.with_connect_timeout(Duration::from_millis(*ms));
    }
    if args.get_flag("clamp-regressions") {
        config = config.with_regression_policy(RegressionPolicy::Clamp);
    }

    config.validate()?;
    Ok(config)
}

async fn watch(args: &ArgMatches) -> anyhow::Result<()> {
    let config = build_config(args)?;
    tracing::info!(
        endpoint = %config.endpoint,
        reconnect_delay_ms = config.reconnect_delay_ms,
        history_capacity = config.history_capacity,
        "starting downlink"
    );

    let mut client = StreamingClient::spawn(config, WebSocketTransport::new())?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                tracing::info!("shutdown requested");
                break;
            }
            view = client.changed() => match view {
                Some(view) => report(&view),
                None => break,
            },
        }
    }

    client.shutdown().await?;
    Ok(())
}

fn report(view: &TelemetryView) {
    match view.latest.as_deref() {
        Some(sample) => tracing::info!(
            connected = view.is_connected,
            sequence = view.last_sequence,
            latency_ms = view.latency_ms,
            packets_lost = view.packets_lost,
            history = view.history_len(),
            altitude_km = sample.position.altitude_km,
            battery_pct = sample.power_system.battery_level_pct,
            status = %sample.status.system_status,
            warnings = sample.status.active_warnings.len(),
            mission_time_s = sample.status.mission_time_s,
            "telemetry"
        ),
        None => tracing::info!(
            connected = view.is_connected,
            phase = ?view.phase,
            "awaiting telemetry"
        ),
    }
}

fn decode(args: &ArgMatches) -> anyhow::Result<()> {
    let raw = match args.get_one::<PathBuf>("file") {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    match codec::decode(&raw) {
        Ok(envelope) => {
            println!("{}", codec::encode_pretty(&envelope)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "envelope rejected");
            std::process::exit(1);
        }
    }
}
