//! `pcm-play` runner: command-line parsing, configuration and the wiring around the
//! `pcm-player` playback worker.

pub mod cli;
pub mod config;
pub mod runtime;
