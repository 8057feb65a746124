//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sidm2::{DriverSelector, TargetDriver};

/// Convert Laxity NewPlayer v21 SID files to SF2-style drivers and back.
#[derive(Debug, Parser)]
#[command(name = "sidm2")]
#[command(version)]
#[command(about = "Convert Laxity NewPlayer v21 SID files to SF2-style drivers and back")]
pub struct Cli {
    /// JSON conversion settings; missing fields keep their defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a SID file (or packed PRG) into a packed PRG image
    Convert {
        /// Input PSID/RSID or PRG file
        input: PathBuf,

        /// Output PRG file (defaults to the input with a .prg extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target driver
        #[arg(short, long, value_enum, default_value_t = DriverArg::Auto)]
        driver: DriverArg,

        /// Also export the result back to PSID and score it against the input
        #[arg(long)]
        validate: bool,
    },

    /// Turn a packed PRG image back into a PSID file
    Export {
        /// Packed PRG file
        input: PathBuf,

        /// Output SID file (defaults to the input with a .sid extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Emulate a file and print its SID register writes
    Trace {
        /// Input PSID/RSID or PRG file
        input: PathBuf,

        /// Frames to play after init
        #[arg(short, long, default_value_t = 50)]
        frames: u32,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two files frame by frame
    Score {
        /// Original file
        original: PathBuf,

        /// Candidate file
        candidate: PathBuf,

        /// Frames to compare (defaults to the configured validation length)
        #[arg(short, long)]
        frames: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert every SID file under a directory in parallel
    Batch {
        /// Directory to scan
        dir: PathBuf,

        /// Output directory; relative paths are kept
        #[arg(short, long)]
        output: PathBuf,

        /// Target driver
        #[arg(short, long, value_enum, default_value_t = DriverArg::Auto)]
        driver: DriverArg,

        /// Score every conversion against its input
        #[arg(long)]
        validate: bool,

        /// Worker threads (defaults to one per core)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Write the JSON summary here instead of stdout
        #[arg(long)]
        summary: Option<PathBuf>,
    },
}

/// Driver choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverArg {
    /// Pick from the detected source
    Auto,
    /// Driver 11 table driver
    Driver11,
    /// NP20 table driver
    Np20,
    /// Original player relocated behind a driver header
    Laxity,
}

impl From<DriverArg> for DriverSelector {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Auto => DriverSelector::Auto,
            DriverArg::Driver11 => DriverSelector::Fixed(TargetDriver::Driver11),
            DriverArg::Np20 => DriverSelector::Fixed(TargetDriver::Np20),
            DriverArg::Laxity => DriverSelector::Fixed(TargetDriver::LaxityAware),
        }
    }
}
