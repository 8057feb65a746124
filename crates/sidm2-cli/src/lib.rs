//! Command-line front end for the `sidm2` conversion core.
//!
//! The binary is a thin layer over [`commands`] and [`batch`]; both are
//! exposed so the file-level behaviour can be tested without spawning a
//! process.

#![warn(missing_docs)]

pub mod args;
pub mod batch;
pub mod commands;

use anyhow::Result;

use crate::args::{Cli, Command};
use crate::commands::{convert_file, export_file, format_trace, load_config, score_files, trace_file};

/// Run a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Convert {
            input,
            output,
            driver,
            validate,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("prg"));
            let done = convert_file(&input, &output, driver.into(), validate, &config)?;
            for diagnostic in done.conversion.diagnostics.entries() {
                eprintln!("{diagnostic}");
            }
            println!(
                "{} -> {} ({} source, {} driver{})",
                input.display(),
                done.output.display(),
                done.conversion.source,
                done.conversion.driver,
                if done.conversion.wrapped { ", wrapped" } else { "" }
            );
            if let Some(report) = done.report {
                println!("{report}");
            }
        }
        Command::Export { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("sid"));
            export_file(&input, &output)?;
            println!("{} -> {}", input.display(), output.display());
        }
        Command::Trace {
            input,
            frames,
            json,
        } => {
            let trace = trace_file(&input, frames, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trace)?);
            } else {
                print!("{}", format_trace(&trace));
            }
        }
        Command::Score {
            original,
            candidate,
            frames,
            json,
        } => {
            let report = score_files(&original, &candidate, frames, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }
        Command::Batch {
            dir,
            output,
            driver,
            validate,
            jobs,
            summary,
        } => {
            let result = batch::run(&dir, &output, driver.into(), validate, jobs, &config)?;
            eprintln!("{} converted, {} failed", result.converted, result.failed);
            let json = serde_json::to_string_pretty(&result)?;
            match summary {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}
