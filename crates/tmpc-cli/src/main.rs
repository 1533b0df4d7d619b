//! `tmpc`: validate preference files, evaluate isolation rules and replay
//! scenarios against the in-memory browser

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use std::path::PathBuf;
use tmpc_core::decision::wants_deletes_history;
use tmpc_core::{evaluate, ContainerId, ContainerKind, NavigationRequest, Trigger, Verdict};
use tmpc_preferences::{ClickType, Preferences};
use tracing_subscriber::EnvFilter;

mod simulate;

fn cli() -> Command {
    Command::new("tmpc")
        .version(tmpc_core::VERSION)
        .about("Temporary container preferences and isolation scenarios")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG says otherwise"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("validate")
                .about("Load and validate a preferences file (JSON, TOML or YAML)")
                .arg(
                    Arg::new("preferences")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("decide")
                .about("Evaluate the isolation rules for one navigation")
                .arg(
                    Arg::new("preferences")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .required(true)
                        .help("Target URL"),
                )
                .arg(
                    Arg::new("origin")
                        .long("origin")
                        .help("URL of the page the navigation starts from"),
                )
                .arg(
                    Arg::new("click")
                        .long("click")
                        .default_value("navigation")
                        .value_parser(["navigation", "middle", "ctrlleft", "left"])
                        .help("Gesture behind the navigation"),
                )
                .arg(
                    Arg::new("container")
                        .long("container")
                        .default_value("default")
                        .value_parser(["default", "temporary-clean", "temporary-used", "permanent"])
                        .help("Kind of container the navigation happens in"),
                )
                .arg(
                    Arg::new("container-id")
                        .long("container-id")
                        .help("Cookie store id of that container, for excludedContainers"),
                )
                .arg(
                    Arg::new("new-tab")
                        .long("new-tab")
                        .action(ArgAction::SetTrue)
                        .help("The navigation is the first one of a new tab"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Play a scripted scenario against an in-memory browser")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_preferences(args: &ArgMatches) -> Result<Preferences> {
    let path = args
        .get_one::<PathBuf>("preferences")
        .context("preferences path is required")?;
    Preferences::load(path).with_context(|| format!("loading {}", path.display()))
}

fn validate(args: &ArgMatches) -> Result<()> {
    let prefs = load_preferences(args)?;
    tracing::info!(
        domains = prefs.isolation.domain.len(),
        cookie_domains = prefs.cookies.domain.len(),
        "preferences are valid"
    );
    println!("ok");
    Ok(())
}

fn decide(args: &ArgMatches) -> Result<()> {
    let prefs = load_preferences(args)?;
    let get = |name: &str| args.get_one::<String>(name).map(String::as_str);

    let click = match get("click") {
        Some("middle") => ClickType::Middle,
        Some("ctrlleft") => ClickType::CtrlLeft,
        Some("left") => ClickType::Left,
        _ => ClickType::Navigation,
    };
    let kind = match get("container") {
        Some("temporary-clean") => ContainerKind::TemporaryClean,
        Some("temporary-used") => ContainerKind::TemporaryUsed,
        Some("permanent") => ContainerKind::Permanent,
        _ => ContainerKind::Default,
    };
    let container = get("container-id").map_or_else(
        || match kind {
            ContainerKind::Default => ContainerId::new("firefox-default"),
            _ => ContainerId::new("firefox-container-1"),
        },
        ContainerId::new,
    );
    let trigger = match click {
        ClickType::Navigation => Trigger::Navigation {
            new_tab: args.get_flag("new-tab"),
        },
        other => Trigger::Click(other),
    };

    let request = NavigationRequest {
        trigger,
        target_url: get("url").context("--url is required")?.to_string(),
        origin_url: get("origin").map(str::to_string),
        container,
        kind,
        container_deletes_history: false,
        mac_assignment: None,
    };
    let verdict = evaluate(&prefs, &request);
    let deletes_history = match verdict {
        Verdict::Isolate { container, source } => {
            Some(wants_deletes_history(&prefs, container, source, click))
        }
        Verdict::Ignore | Verdict::Ask => None,
    };
    tracing::debug!(?verdict, "evaluated");

    let output = json!({
        "request": request,
        "verdict": verdict,
        "deletesHistory": deletes_history,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn simulate(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("scenario")
        .context("scenario path is required")?;
    let scenario = simulate::Scenario::load(path)?;

    // removal delays play out instantly
    tokio::time::pause();
    let report = simulate::run(scenario).await?;
    tracing::info!(
        containers = report.containers.len(),
        deleted = report.statistics.containers_deleted,
        "scenario finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"), matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("validate", args)) => validate(args),
        Some(("decide", args)) => decide(args),
        Some(("simulate", args)) => simulate(args).await,
        _ => Ok(()),
    }
}
