#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use clap::{Parser, Subcommand, ValueEnum};
use shared_computer_rs::{KeyboardLayout, SettingsDefaults};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "shared-computer", version, about = "NumLock and volume at logon")]
struct Cli {
    /// Log filter, e.g. `info` or `shared_computer_rs=debug`
    #[arg(long, env = "SHARED_COMPUTER_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Selects the defaults used when nothing is stored yet
    #[arg(long, value_enum, default_value_t = LayoutArg::Desktop, global = true)]
    keyboard_layout: LayoutArg,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the tray host for this session (default)
    Run,
    /// Apply the settings once and exit, leaving NumLock as set
    Apply,
    /// Open the settings dialog
    Settings,
    /// Print the stored settings as JSON
    Show,
}

#[derive(ValueEnum, Clone, Copy)]
enum LayoutArg {
    Desktop,
    Laptop,
}

impl From<LayoutArg> for KeyboardLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Desktop => KeyboardLayout::Desktop,
            LayoutArg::Laptop => KeyboardLayout::Laptop,
        }
    }
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("SharedComputer")
        .join("logs")
}

fn open_log_file(log_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("shared-computer")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)?;
    Ok(appender)
}

/// Stderr, plus a daily rolling file when the log directory is usable.
/// The guard flushes the file on drop.
fn init_logging(filter: &str) -> Option<WorkerGuard> {
    let log_dir = log_dir();
    let (file_layer, guard, file_error) = match open_log_file(&log_dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();

    match file_error {
        None => info!(log_dir = %log_dir.display(), "Logger initialized"),
        Some(e) => warn!(
            log_dir = %log_dir.display(),
            "No log file, logging to stderr only: {}", e
        ),
    }
    guard
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.log_level);

    let defaults = SettingsDefaults::for_layout(cli.keyboard_layout.into());
    let command = cli.command.unwrap_or(Command::Run);

    match command {
        Command::Run => run(defaults),
        Command::Apply => apply(defaults),
        Command::Settings => settings(defaults),
        Command::Show => show(defaults),
    }
}

#[cfg(windows)]
fn run(defaults: SettingsDefaults) -> anyhow::Result<()> {
    shared_computer_rs::app::run(defaults)
}

#[cfg(windows)]
fn apply(defaults: SettingsDefaults) -> anyhow::Result<()> {
    shared_computer_rs::app::apply_once(defaults)
}

#[cfg(windows)]
fn settings(defaults: SettingsDefaults) -> anyhow::Result<()> {
    use shared_computer_rs::audio::{self, ComGuard};
    use shared_computer_rs::ui::SettingsDialog;
    use shared_computer_rs::RegistryConfigStore;

    let _com = ComGuard::new()?;
    let endpoint = audio::open_default_render_endpoint().ok();
    let dialog = SettingsDialog::new(Box::new(RegistryConfigStore::new(defaults)), endpoint)?;
    let outcome = dialog.run()?;
    info!("Settings dialog closed: {:?}", outcome);
    Ok(())
}

#[cfg(windows)]
fn show(defaults: SettingsDefaults) -> anyhow::Result<()> {
    use shared_computer_rs::{ConfigStore, RegistryConfigStore};

    let settings = RegistryConfigStore::new(defaults).load()?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

#[cfg(not(windows))]
fn run(_defaults: SettingsDefaults) -> anyhow::Result<()> {
    anyhow::bail!("the session host needs Windows")
}

#[cfg(not(windows))]
fn apply(_defaults: SettingsDefaults) -> anyhow::Result<()> {
    anyhow::bail!("applying settings needs Windows")
}

#[cfg(not(windows))]
fn settings(_defaults: SettingsDefaults) -> anyhow::Result<()> {
    anyhow::bail!("the settings dialog needs Windows")
}

/// Without a Registry only the defaults exist.
#[cfg(not(windows))]
fn show(defaults: SettingsDefaults) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&defaults.settings())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unusable_log_dir_is_an_error() {
        let blocker = std::env::temp_dir().join(format!("shared-computer-{}", std::process::id()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        assert!(open_log_file(&blocker.join("logs")).is_err());

        std::fs::remove_file(&blocker).unwrap();
    }

    #[test]
    fn test_log_file_in_fresh_dir() {
        let dir = std::env::temp_dir()
            .join(format!("shared-computer-logs-{}", std::process::id()))
            .join("logs");

        assert!(open_log_file(&dir).is_ok());
        assert!(dir.is_dir());

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["shared-computer"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(cli.keyboard_layout, LayoutArg::Desktop));
    }
}
