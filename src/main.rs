#![forbid(unsafe_code)]

mod connections;
mod constants;
mod error;
mod extension;
mod idle;
mod monitors;
mod prefs;
mod profile;
mod session;
mod settings;
mod signals;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use extension::ScaleByDisplay;
use monitors::{DisplayConfigService, MutterDisplayConfig};
use prefs::{Prefs, SettingsChanges};
use session::SessionMode;
use settings::{find_extension_schema_dir, GSettingsProvider, SettingsProvider};
use signals::Subscribable;

#[derive(Parser)]
#[command(name = "scale-by-display", version, about = "Per-monitor-setup font scaling for GNOME")]
struct Cli {
    /// trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Directory holding the compiled scale-by-display schema
    #[arg(long, global = true)]
    schema_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply profiles until interrupted (default)
    Run,
    /// List the monitors currently detected
    Monitors,
    /// List stored profiles
    Profiles,
    /// Save the current monitors as a new profile
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long)]
        icon_size: Option<u32>,
    },
    /// Change a profile's name, scale or icon size
    Edit {
        index: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long)]
        icon_size: Option<u32>,
    },
    /// Delete a profile
    Remove { index: usize },
    /// Show global settings, or change them with the flags below
    Settings(SettingsArgs),
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long)]
    hide_a11y_icon: Option<bool>,
    #[arg(long)]
    default_scale: Option<f64>,
    #[arg(long)]
    integrate_dash_to_dock: Option<bool>,
    #[arg(long)]
    default_icon_size: Option<u32>,
    #[arg(long)]
    with_serials: Option<bool>,
}

impl From<SettingsArgs> for SettingsChanges {
    fn from(args: SettingsArgs) -> Self {
        Self {
            hide_a11y_icon: args.hide_a11y_icon,
            default_scale_factor: args.default_scale,
            integrate_dash_to_dock: args.integrate_dash_to_dock,
            default_icon_size: args.default_icon_size,
            with_serials: args.with_serials,
        }
    }
}

fn parse_log_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_log_level(&cli.log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")?;

    // Every component is single-threaded and lives on this one loop
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start event loop")?;
    tokio::task::LocalSet::new().block_on(&runtime, run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let provider = Rc::new(GSettingsProvider::new(find_extension_schema_dir(cli.schema_dir)));
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to the session bus")?;
    let display_config = MutterDisplayConfig::connect(&connection)
        .await
        .context("Failed to reach the display configuration service")?;

    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Run = command {
        return run_daemon(provider, display_config, &connection).await;
    }

    let prefs = Prefs::open(provider.as_ref(), display_config).await?;
    let result = run_command(&prefs, command);
    prefs.close();
    result
}

async fn run_daemon(
    provider: Rc<dyn SettingsProvider>,
    display_config: Rc<dyn DisplayConfigService>,
    connection: &zbus::Connection,
) -> Result<()> {
    let session: Rc<dyn Subscribable> = match SessionMode::connect(connection).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "screensaver service unavailable, lock/unlock will not trigger updates");
            SessionMode::inert()
        }
    };

    let mut shutdown = shutdown_signals()?;
    let controller = ScaleByDisplay::new(provider, display_config, session);
    controller.enable().context("Failed to start applying profiles")?;
    info!(pid = std::process::id(), "scale-by-display running");

    if shutdown.recv().await.is_none() {
        warn!("signal listener stopped, shutting down");
    }
    controller.disable();
    Ok(())
}

fn run_command(prefs: &Prefs, command: Command) -> Result<()> {
    match command {
        Command::Run => bail!("`run` is not a preferences command"),
        Command::Monitors => print_lines(prefs.monitor_lines(), "No monitors detected"),
        Command::Profiles => print_lines(prefs.profile_lines(), "No profiles saved"),
        Command::Save { name, scale, icon_size } => {
            let profile = prefs.save(&name, scale, icon_size)?;
            println!("Saved profile `{}`", profile.name());
        }
        Command::Edit {
            index,
            name,
            scale,
            icon_size,
        } => {
            let profile = prefs.edit(index, name.as_deref(), scale, icon_size)?;
            println!("Updated profile {index}: `{}`", profile.name());
        }
        Command::Remove { index } => {
            let profile = prefs.remove(index)?;
            println!("Removed profile `{}`", profile.name());
        }
        Command::Settings(args) => {
            let changes = SettingsChanges::from(args);
            if !changes.is_empty() {
                prefs.apply_settings(&changes).context("Failed to update settings")?;
            }
            print_lines(prefs.settings_lines(), "");
        }
    }
    Ok(())
}

fn print_lines(lines: Vec<String>, empty: &str) {
    if lines.is_empty() && !empty.is_empty() {
        println!("{empty}");
    }
    for line in lines {
        println!("{line}");
    }
}

/// SIGINT/SIGTERM forwarded from a dedicated thread onto the event loop
#[cfg(unix)]
fn shutdown_signals() -> Result<mpsc::UnboundedReceiver<i32>> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let mut signals =
        signal_hook::iterator::Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                info!(signal = signal, "shutdown requested");
                if tx.send(signal).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(rx)
}

#[cfg(not(unix))]
fn shutdown_signals() -> Result<mpsc::UnboundedReceiver<i32>> {
    bail!("the daemon needs Unix signals")
}
