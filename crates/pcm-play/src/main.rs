//! pcm-play: queue 16-bit PCM WAV files and play them on an output device.
//!
//! ## Commands
//! - `play`: play the given files in order and exit once the queue drains.
//! - `stdin`: read one path per line from standard input and play each as it arrives.
//! - `tone`: play a sine test tone.
//!
//! Settings resolve as CLI flag, then `--config` TOML file, then built-in defaults.

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pcm_play::cli::{Args, Command};
use pcm_play::config::{self, FileConfig};
use pcm_play::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_play=info,pcm_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = config::resolve(&args, &file)?;
    tracing::debug!(?settings, "resolved settings");

    match &args.cmd {
        Some(Command::Play { paths, repeat }) => {
            let summary = runtime::run_play(settings, paths, *repeat)?;
            if summary.played == 0 && summary.failed > 0 {
                return Err(anyhow!("no item could be played"));
            }
        }
        Some(Command::Stdin) => {
            runtime::run_stdin(settings)?;
        }
        Some(Command::Tone { frequency, seconds }) => {
            runtime::run_tone(settings, *frequency, *seconds)?;
        }
        None => return Err(anyhow!("no command given; see --help")),
    }

    Ok(())
}
