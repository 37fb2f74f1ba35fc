use anyhow::Result;
use clap::Parser;
use fpscap_core::Config;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fpscap")]
#[command(about = "FPS cap override daemon for Unity games")]
struct Args {
    #[arg(short, long, default_value = "fpscap.json")]
    config: PathBuf,

    /// Poll the foreground window instead of hooking focus events
    #[arg(long)]
    poll: bool,

    /// Override the configured foreground FPS target
    #[arg(short, long)]
    fps: Option<i32>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fpscap=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(c) => {
            info!("Loaded config from {:?}", args.config);
            c
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    if args.poll {
        config.window_query_use_event = false;
    }
    if let Some(fps) = args.fps {
        config.fps_target = fps;
    }

    run(config)
}

#[cfg(target_os = "windows")]
fn run(config: Config) -> Result<()> {
    use fpscap_core::FpsDaemon;

    info!(
        "fpscap starting (target: {} fps, power save: {})",
        config.fps_target, config.use_power_save
    );

    let mut daemon = FpsDaemon::new(config);
    daemon.on_process_exit(|pid| {
        info!("Game {pid} exited, waiting for the next launch...");
    });
    daemon.start()?;

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    info!("Watching for the game window. Press Ctrl+C to exit.");
    let _ = rx.recv();

    info!("Shutting down...");
    daemon.stop();
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run(_config: Config) -> Result<()> {
    anyhow::bail!("fpscap drives Win32 process and window APIs and only runs on Windows")
}
