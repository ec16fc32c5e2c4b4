use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pcm-play", version, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Optional config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Writer chunk size in frames (device buffer is negotiated at 4x this)
    #[arg(long, global = true)]
    pub frames_per_period: Option<u32>,

    /// Sample rate used to open the device before the first item
    #[arg(long, global = true)]
    pub rate: Option<u32>,

    /// Channel count used to open the device before the first item
    #[arg(long, global = true)]
    pub channels: Option<u16>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Queue WAV files and play them in order
    Play {
        /// WAV files to play
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Queue the whole list this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Read WAV paths from standard input, one per line, and play them as they arrive
    Stdin,

    /// Play a sine test tone
    Tone {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Tone length in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_repeat_and_globals() {
        let args = Args::try_parse_from([
            "pcm-play",
            "play",
            "a.wav",
            "b.wav",
            "--repeat",
            "2",
            "--frames-per-period",
            "64",
        ])
        .unwrap();
        assert_eq!(
            args.cmd,
            Some(Command::Play {
                paths: vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")],
                repeat: 2,
            })
        );
        assert_eq!(args.frames_per_period, Some(64));
    }

    #[test]
    fn play_requires_a_path() {
        assert!(Args::try_parse_from(["pcm-play", "play"]).is_err());
    }

    #[test]
    fn tone_has_defaults() {
        let args = Args::try_parse_from(["pcm-play", "tone"]).unwrap();
        assert_eq!(
            args.cmd,
            Some(Command::Tone {
                frequency: 440.0,
                seconds: 2.0
            })
        );
    }

    #[test]
    fn list_devices_needs_no_command() {
        let args = Args::try_parse_from(["pcm-play", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }
}
