use std::fmt::Write as _;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use simbridge::config::DEFAULT_CONFIG_PATH;
use simbridge::{Bridge, ClientError, Config, Lifecycle, Line, Player, SimClient, WayType};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq)]
enum Action {
    Players,
    Lines { player_index: u32, way_type: WayType },
}

#[derive(Debug, PartialEq)]
struct Args {
    config: PathBuf,
    timeout: Option<f64>,
    action: Action,
}

fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let args = match parse_args(&argv) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: simbridge [--config <path>] [--timeout <secs>] <command>");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  players                          List players in the running game");
            eprintln!("  lines <player_index> <way_type>  List a player's lines for one way type");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --config <path>   Config file [default: {DEFAULT_CONFIG_PATH}]");
            eprintln!("  --timeout <secs>  Response timeout, overrides the config file");
            eprintln!();
            eprintln!("Way types: road, rail, water, monorail, maglev, tram, narrow, air");
            process::exit(2);
        }
    };

    init_tracing();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            process::exit(1);
        }
    };

    let lifecycle = Lifecycle::new();
    let result = runtime.block_on(run(&args, &lifecycle));

    match result {
        Ok(output) => print!("{output}"),
        Err(_) if lifecycle.is_shutting_down() => {
            eprintln!("interrupted");
            process::exit(130);
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("SIMBRIDGE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("simbridge={level},simbridge_cli={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut timeout: Option<f64> = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config = PathBuf::from(args.get(i).ok_or("--config requires a value")?);
            }
            "--timeout" => {
                i += 1;
                let raw = args.get(i).ok_or("--timeout requires a value")?;
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| format!("invalid timeout '{raw}', expected seconds"))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(format!("invalid timeout '{raw}', expected seconds"));
                }
                timeout = Some(secs);
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => positional.push(arg),
        }
        i += 1;
    }

    let action = match positional.as_slice() {
        ["players"] => Action::Players,
        ["lines", index, way] => {
            let player_index = index
                .parse()
                .map_err(|_| format!("invalid player index '{index}'"))?;
            let way_type = way.parse::<WayType>().map_err(|e| e.to_string())?;
            Action::Lines {
                player_index,
                way_type,
            }
        }
        ["lines", ..] => return Err("lines requires <player_index> <way_type>".to_string()),
        [] => return Err("missing command".to_string()),
        [other, ..] => return Err(format!("unknown command: {other}")),
    };

    Ok(Args {
        config,
        timeout,
        action,
    })
}

async fn run(args: &Args, lifecycle: &Lifecycle) -> anyhow::Result<String> {
    // Before the request: a signal must always land on the token.
    let listener = lifecycle
        .install_signal_handlers()
        .context("failed to install signal handlers")?;
    let signals = tokio::spawn(listener.run());

    let mut config = Config::load_or_default(&args.config);
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    let bridge_config = config
        .bridge_config()
        .with_context(|| format!("invalid config {}", args.config.display()))?;

    tracing::debug!(
        input = %config.input_file_path.display(),
        output = %config.output_file_path.display(),
        timeout_secs = config.timeout,
        "Starting bridge"
    );

    let bridge = Arc::new(Bridge::with_files(
        &config.input_file_path,
        &config.output_file_path,
        bridge_config,
    ));
    let client = SimClient::new(bridge).with_cancellation(lifecycle.token());

    let output = match args.action {
        Action::Players => client
            .players()
            .await
            .map(|players| format_players(&players))
            .map_err(|e| request_failed("players", e)),
        Action::Lines {
            player_index,
            way_type,
        } => client
            .lines(player_index, way_type)
            .await
            .map(|lines| format_lines(&lines))
            .map_err(|e| request_failed("lines", e)),
    };

    signals.abort();
    output
}

fn request_failed(what: &str, e: ClientError) -> anyhow::Error {
    tracing::debug!(category = e.category().as_str(), "Request failed");
    anyhow::Error::new(e).context(format!("{what} request failed"))
}

fn format_players(players: &[Player]) -> String {
    if players.is_empty() {
        return "No players found.\n".to_string();
    }
    let mut out = String::new();
    for player in players {
        let _ = writeln!(out, "- {} (index {})", player.name, player.index);
    }
    out
}

fn format_lines(lines: &[Line]) -> String {
    if lines.is_empty() {
        return "No lines found.\n".to_string();
    }
    let mut out = String::new();
    for line in lines {
        let _ = writeln!(out, "- {} (id {})", line.name, line.id);
    }
    out
}
