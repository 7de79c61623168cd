use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use avclock::decoder::SeekStyle;
use avclock::player::{AudioChain, CommandSender, VideoChain};
use avclock::renderer::NoSubtitles;
use avclock::sim::{SimAudioOut, SimMedia, SimVideoOut, VirtualClock};
use avclock::utils::{load_config, Config, SyncRole, SystemTimeSource, TimeSource};
use avclock::{
    load_edl, ControllerBuilder, MediaIo, PlayerCommand, PlayerEvent, PlayerEventHandler, SyncLink,
};

/// avclock - plays a synthetic stream through the playback clock and sync engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream duration in seconds
    #[arg(long, default_value = "10")]
    duration: f64,

    /// Video frame rate
    #[arg(long, default_value = "25")]
    fps: f64,

    /// Edit decision list to apply
    #[arg(long, value_name = "FILE")]
    edl: Option<PathBuf>,

    /// Broadcast the playback position to UDP slaves
    #[arg(long, conflicts_with = "udp_slave")]
    udp_master: bool,

    /// Follow a UDP sync master
    #[arg(long)]
    udp_slave: bool,

    /// Destination address for the master
    #[arg(long, value_name = "IP")]
    udp_ip: Option<String>,

    /// UDP sync port
    #[arg(long, value_name = "PORT")]
    udp_port: Option<u16>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Audio delay in seconds, positive delays audio
    #[arg(long, allow_hyphen_values = true)]
    audio_delay: Option<f64>,

    /// Play video only
    #[arg(long)]
    no_audio: bool,

    /// Run against the wall clock and read commands from stdin
    #[arg(long)]
    realtime: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Configuration file to use instead of the standard locations
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the effective configuration to the user config file and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("Loading {}", path.display()))?,
        None => load_config()?,
    };
    apply_args(&mut config, &args);
    config.validate()?;

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting avclock v{}", env!("CARGO_PKG_VERSION"));

    if args.write_config {
        config.save()?;
        info!("Configuration saved");
        return Ok(());
    }

    let edl = match config.edl.file.as_deref() {
        Some(path) => {
            let records = load_edl(path).with_context(|| format!("Loading EDL {}", path.display()))?;
            info!("Loaded {} EDL records from {}", records.len(), path.display());
            records
        }
        None => Vec::new(),
    };

    let time: Arc<dyn TimeSource> = if args.realtime {
        Arc::new(SystemTimeSource::new())
    } else {
        VirtualClock::new()
    };

    let media = SimMedia::new(args.duration, args.fps);
    let audio = (!args.no_audio).then(|| {
        let out = SimAudioOut::new(time.clone(), media.audio_params().bytes_per_second(), 0.5);
        AudioChain::new(Box::new(media.audio_decoder()), Box::new(out), &config.audio)
    });
    let video = VideoChain::new(
        Box::new(media.video_decoder()),
        Box::new(SimVideoOut::new(time.clone())),
    );

    let io = MediaIo {
        demuxer: Box::new(media.demuxer()),
        audio,
        video: Some(video),
        subtitles: Box::new(NoSubtitles),
    };

    let mut builder = ControllerBuilder::new(io, time)
        .with_config(config.clone())
        .with_edl(edl)
        .with_event_handler(Box::new(LoggingEventHandler));

    if let Some(link) = open_sync_link(&config)? {
        builder = builder.with_sync(link);
    }

    let mut controller = builder.build()?;

    if args.realtime {
        spawn_stdin_reader(controller.command_sender());
    }

    let reason = controller.run()?;
    let status = controller.status_handle().snapshot();
    info!(
        "Stopped ({:?}) at {:.3}s: {} frames presented, {} dropped",
        reason, status.position, status.frames_presented, status.frames_dropped
    );

    Ok(())
}

/// Command line flags override the loaded configuration
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(path) = &args.edl {
        config.edl.file = Some(path.clone());
    }
    if args.udp_master {
        config.udp.role = SyncRole::Master;
    }
    if args.udp_slave {
        config.udp.role = SyncRole::Slave;
    }
    if let Some(ip) = &args.udp_ip {
        config.udp.ip = ip.clone();
    }
    if let Some(port) = args.udp_port {
        config.udp.port = port;
    }
    if let Some(speed) = args.speed {
        config.audio.speed = speed;
    }
    if let Some(delay) = args.audio_delay {
        config.audio.audio_delay = delay;
    }
}

/// A master that cannot open its socket plays on unsynced; a slave that
/// cannot listen has nothing to follow.
fn open_sync_link(config: &Config) -> Result<Option<SyncLink>> {
    match SyncLink::from_config(&config.udp) {
        Ok(link) => Ok(link),
        Err(e) if config.udp.role == SyncRole::Master => {
            warn!("UDP sync disabled: {}", e);
            Ok(None)
        }
        Err(e) => Err(e).context("Starting UDP sync slave"),
    }
}

/// Map single-key lines from stdin to player commands
fn spawn_stdin_reader(sender: CommandSender) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "p" => PlayerCommand::TogglePause,
                "q" => PlayerCommand::Stop,
                "m" => PlayerCommand::ToggleMute,
                "+" => seek(10.0),
                "-" => seek(-10.0),
                "]" => PlayerCommand::AdjustAudioDelay(0.1),
                "[" => PlayerCommand::AdjustAudioDelay(-0.1),
                other => {
                    if let Some(speed) = other.strip_prefix("speed ").and_then(|s| s.parse().ok()) {
                        PlayerCommand::SetSpeed(speed)
                    } else {
                        debug!("Unknown command {:?}", other);
                        continue;
                    }
                }
            };
            if sender.send(command).is_err() {
                break;
            }
        }
    });
}

fn seek(amount: f64) -> PlayerCommand {
    PlayerCommand::Seek {
        amount,
        style: SeekStyle::RELATIVE,
    }
}

/// Event handler that logs events
struct LoggingEventHandler;

impl PlayerEventHandler for LoggingEventHandler {
    fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::StateChanged(state) => info!("State: {:?}", state),
            PlayerEvent::Seeked { position } => info!("Seeked to {:.3}s", position),
            PlayerEvent::EdlSkip { start, stop } => info!("EDL skipped {:.3}s - {:.3}s", start, stop),
            PlayerEvent::MuteChanged { muted } => info!("Muted: {}", muted),
            PlayerEvent::Desync => warn!("Timestamps desynced, clock reset"),
            PlayerEvent::DeviceStalled => warn!("Audio device stalled"),
            PlayerEvent::MasterExited => info!("Sync master exited"),
            PlayerEvent::EndOfStream => info!("End of stream"),
        }
    }
}
