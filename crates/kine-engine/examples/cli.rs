//! Thin terminal harness for exercising `start`/`stop` without a GUI.
//!
//! Usage:
//!   cargo run -p kine-engine --example cli -- --session session.json

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use kine_engine::config::CoreConfig;
use kine_engine::orchestrator::{start, FrameProducer};

#[derive(Parser)]
#[command(name = "kine-engine", about = "Run the audiovisual synthesis core")]
struct Cli {
    /// Path to a persisted parameter/MIDI-learn session to load at
    /// startup and save to on exit.
    #[arg(long)]
    session: Option<PathBuf>,

    /// How long to run before shutting down, in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = CoreConfig::default();
    config.persistence_path = cli.session.clone();

    let (_camera_tx, camera_rx) = crossbeam_channel::unbounded();
    let handle = start(config, FrameProducer::Camera { receiver: camera_rx })?;

    if cli.session.is_some() {
        if let Err(e) = handle.load() {
            log::warn!("no prior session loaded: {e}");
        }
    }

    log::info!("core running for {}s", cli.seconds);
    std::thread::sleep(Duration::from_secs(cli.seconds));

    if cli.session.is_some() {
        handle.save()?;
    }
    handle.stop()?;
    Ok(())
}
