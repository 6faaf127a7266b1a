//! CLI Module
//!
//! Command-line interface for the Crushwave engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Crushwave - lo-fi bit-crusher and WAV/MP3 exporter
#[derive(Parser, Debug)]
#[command(name = "crushwave")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bit-crush a WAV file and export it
    #[command(name = "crush")]
    Crush {
        /// Source WAV file
        input: PathBuf,

        /// Output file (defaults to 8bit_<name>.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bit depth, 1-16 (32 bypasses quantization)
        #[arg(short, long)]
        bits: Option<u32>,

        /// Hold factor, 1-20
        #[arg(long)]
        hold: Option<u32>,

        /// Export format: wav or mp3
        #[arg(short, long)]
        format: Option<String>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the header of a WAV file
    #[command(name = "inspect")]
    Inspect {
        /// WAV file to inspect
        path: PathBuf,
    },

    /// Write a 16-bit sine test tone
    #[command(name = "tone")]
    Tone {
        /// Output WAV file
        output: PathBuf,

        /// Frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 2.0)]
        secs: f32,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 44100)]
        rate: u32,
    },
}
