//! Hapsync - remote playback synchronizer
//!
//! Entry point: resolves the media item, performs device setup, then runs
//! the coordination and input loops until the session ends.
//!
//! Exit codes: 0 on normal completion, 2 when the abort trigger fired,
//! 1 on unrecoverable setup or session failure.

use anyhow::{bail, Context, Result};
use hapsync::config::{AppConfig, CONFIG_FILE, LEDGER_FILE};
use hapsync::coordinator::{PlaybackCoordinator, SessionEnd};
use hapsync::device::client::{DeviceControl, HttpDeviceClient};
use hapsync::input::{run_input_loop, StdinInput};
use hapsync::pause::PauseBudgetController;
use hapsync::playback::{Player, VlcHttpPlayer};
use hapsync::session::{AbortMarker, SessionShared, ABORT_MARKER_FILE};
use hapsync::sync::clock::TimeSyncEstimator;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Exit code when the abort trigger ended the session
const EXIT_ABORTED: i32 = 2;

/// Exit code for unrecoverable setup or session failures
const EXIT_FAILURE: i32 = 1;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hapsync=info".parse().unwrap()),
        )
        .init();

    println!("hapsync v{} - remote playback synchronizer", hapsync::VERSION);
    println!();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut media_name: Option<String> = None;
    let mut config_path = PathBuf::from(CONFIG_FILE);
    let mut media_dir: Option<PathBuf> = None;
    let mut probes: Option<usize> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("hapsync {}", hapsync::VERSION);
                return;
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    std::process::exit(EXIT_FAILURE);
                }
                config_path = PathBuf::from(&args[i + 1]);
                i += 2;
                continue;
            }
            "--media-dir" | "-m" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --media-dir requires a directory");
                    std::process::exit(EXIT_FAILURE);
                }
                media_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--probes" | "-p" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --probes requires a count");
                    std::process::exit(EXIT_FAILURE);
                }
                probes = args[i + 1].parse().ok().filter(|&n| n > 0);
                if probes.is_none() {
                    eprintln!("Error: Invalid probe count: {}", args[i + 1]);
                    std::process::exit(EXIT_FAILURE);
                }
                i += 2;
                continue;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(EXIT_FAILURE);
            }
            _ => {
                if media_name.is_none() {
                    media_name = Some(args[i].clone());
                }
            }
        }
        i += 1;
    }

    let Some(media_name) = media_name else {
        eprintln!("Error: no media item provided");
        eprintln!();
        print_help();
        std::process::exit(EXIT_FAILURE);
    };

    let code = match run(&media_name, &config_path, media_dir, probes) {
        Ok(SessionEnd::Completed) => {
            info!(media = %media_name, "Session completed");
            0
        }
        Ok(SessionEnd::Aborted) => {
            warn!(media = %media_name, "Session aborted by trigger");
            EXIT_ABORTED
        }
        Err(e) => {
            error!("Fatal: {:#}", e);
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}

fn print_help() {
    println!("Usage: hapsync [OPTIONS] <media-item>");
    println!();
    println!("Synchronizes <media-dir>/<media-item>.mp4 with a remote device");
    println!("playing <media-dir>/<media-item>.motion.");
    println!();
    println!("Options:");
    println!("  -c, --config PATH     Config file (default: {})", CONFIG_FILE);
    println!("  -m, --media-dir DIR   Override the configured media directory");
    println!("  -p, --probes N        Clock probes per sync pass");
    println!("  -v, --version         Show version");
    println!("  -h, --help            Show this help");
    println!();
    println!("Controls (line input): p=pause, r=resync, t=trigger, q=quit");
}

fn run(
    media_name: &str,
    config_path: &std::path::Path,
    media_dir: Option<PathBuf>,
    probes: Option<usize>,
) -> Result<SessionEnd> {
    let mut config = AppConfig::load(config_path).context("configuration error")?;
    if let Some(dir) = media_dir {
        config.media_dir = dir;
    }
    if let Some(n) = probes {
        config.sync_probes = n;
    }

    let video_path = config.video_path(media_name);
    let script_path = config.script_path(media_name);
    if !video_path.exists() {
        bail!("video file not found: {}", video_path.display());
    }
    if !script_path.exists() {
        bail!("motion script not found: {}", script_path.display());
    }
    info!(video = %video_path.display(), script = %script_path.display(), "Media resolved");

    // A marker left by a previous run must not abort this one
    let marker = AbortMarker::new(ABORT_MARKER_FILE);
    marker.clear();

    let budget = Arc::new(Mutex::new(
        PauseBudgetController::load(LEDGER_FILE).context("pause ledger error")?,
    ));
    if let Ok(ctrl) = budget.lock() {
        let b = ctrl.budget();
        info!(
            pauses = b.pauses_remaining,
            duration_s = b.pause_duration_s,
            "Pause budget loaded"
        );
    }

    let device = HttpDeviceClient::new(
        &config.api_base_url,
        &config.upload_url,
        &config.connection_key,
        &config.app_id,
        config.api_generation,
    )
    .context("device client setup failed")?;

    // Setup phase: any failure here is fatal before playback starts
    let mut estimator = TimeSyncEstimator::new();
    estimator
        .synchronize(&device, config.sync_probes)
        .context("server time sync failed")?;

    let script_url = device
        .upload_script(&script_path)
        .context("motion script upload failed")?;
    device
        .setup(&script_url)
        .context("device setup failed")?;

    let player = Arc::new(
        VlcHttpPlayer::spawn(
            &config.vlc_binary,
            &video_path,
            config.vlc_http_port,
            &config.vlc_http_password,
        )
        .context("player launch failed")?,
    );
    player.wait_until_playing().context("playback startup failed")?;

    let shared = Arc::new(SessionShared::new());

    // Ctrl+C joins the abort trigger channel
    {
        let shared = Arc::clone(&shared);
        ctrlc::set_handler(move || {
            shared.trigger_abort("interrupt");
        })
        .ok();
    }

    // Input loop on its own thread; both loops share only SessionShared
    // and the budget mutex
    let input_handle = {
        let player = Arc::clone(&player);
        let shared = Arc::clone(&shared);
        let budget = Arc::clone(&budget);
        let marker = marker.clone();
        let poll = Duration::from_millis(config.input_poll_ms);
        std::thread::spawn(move || {
            run_input_loop(
                StdinInput::spawn(),
                player.as_ref(),
                &shared,
                &budget,
                &marker,
                poll,
            );
        })
    };

    let mut coordinator = PlaybackCoordinator::new(
        &device,
        player.as_ref(),
        &shared,
        &estimator,
        marker,
        Duration::from_millis(config.coordinator_poll_ms),
    );
    let outcome = coordinator.run();

    // Cleanup: the coordinator has already released the device
    let _ = player.stop();
    let _ = input_handle.join();

    if let Ok(ctrl) = budget.lock() {
        let b = ctrl.budget();
        info!(
            used = b.pauses_used_this_session,
            remaining = b.pauses_remaining,
            "Final pause budget"
        );
    }

    outcome.context("session failed")
}
