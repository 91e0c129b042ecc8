use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Label every eighth note as kick, snare, hihat or noise
    Classify,
    /// Estimate a note or rest for every sixteenth note
    Pitch,
}

#[derive(Parser, Debug)]
#[command(name = "beatgrid", about = "Tempo-grid segmentation of beatboxed and hummed recordings")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG, AAC)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Analysis to run
    #[arg(short, long, value_enum, default_value_t = Mode::Classify)]
    pub mode: Mode,

    /// Tempo in beats per minute
    #[arg(short, long, default_value_t = 120.0)]
    pub tempo: f64,

    /// Number of 4/4 bars in each recording
    #[arg(short, long, default_value_t = 1)]
    pub bars: u32,

    /// Classifier weights (JSON dense network)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// CSV file classification decisions are appended to
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Do not write the audit log
    #[arg(long)]
    pub no_audit: bool,

    /// Config file (default: ./beatgrid.toml or ~/.config/beatgrid/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}
