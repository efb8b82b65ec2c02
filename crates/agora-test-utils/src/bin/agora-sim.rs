use agora_client::init_tracing;
use agora_core::{ClientConfig, LogConfig};
use agora_test_utils::{run_session, SimulatorConfig};
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("agora-sim")
        .version(agora_client::VERSION)
        .about("Agora client session simulator")
        .arg(
            Arg::new("log")
                .long("log")
                .global(true)
                .default_value("warn")
                .help("Log filter (overridden by RUST_LOG)"),
        )
        .subcommand(
            Command::new("session")
                .about("Run a scripted session against the in-memory backend")
                .arg(
                    Arg::new("members")
                        .long("members")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Members seeded before the session"),
                )
                .arg(
                    Arg::new("messages")
                        .long("messages")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Messages posted by the signed-in member"),
                )
                .arg(
                    Arg::new("slow-connect-ms")
                        .long("slow-connect-ms")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Latency of every connection attempt"),
                )
                .arg(
                    Arg::new("connect-failures")
                        .long("connect-failures")
                        .default_value("0")
                        .value_parser(value_parser!(usize))
                        .help("Connection attempts that fail before one succeeds"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("Client configuration (TOML)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the default client configuration as TOML"),
        );

    let matches = cli.get_matches();
    let filter = matches
        .get_one::<String>("log")
        .cloned()
        .unwrap_or_else(|| "warn".to_string());
    init_tracing(&LogConfig { filter, json: false }).context("installing tracing subscriber")?;

    match matches.subcommand() {
        Some(("session", args)) => {
            let client = match args.get_one::<String>("config") {
                Some(path) => ClientConfig::load(path).with_context(|| format!("loading {path}"))?,
                None => ClientConfig::default(),
            };
            let config = SimulatorConfig {
                members: args.get_one::<usize>("members").copied().unwrap_or(5),
                messages: args.get_one::<usize>("messages").copied().unwrap_or(3),
                connect_latency: Duration::from_millis(
                    args.get_one::<u64>("slow-connect-ms").copied().unwrap_or(0),
                ),
                connect_failures: args.get_one::<usize>("connect-failures").copied().unwrap_or(0),
                client,
            };

            let report = run_session(config).await;

            if args.get_flag("json") {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("config", _)) => {
            println!("{}", toml::to_string_pretty(&ClientConfig::default())?);
        }
        _ => {
            println!("no subcommand given; try `agora-sim session`");
        }
    }
    Ok(())
}
