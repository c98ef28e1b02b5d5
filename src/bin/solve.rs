//! Command-line entry point
//!
//! `solve <input-file>` finds every real root of the system described by the
//! input file and writes `roots.csv` (plus any requested diagnostics files)
//! into the output directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use rootfield::solve_input_file;

#[derive(Parser)]
#[command(
    name = "solve",
    about = "Find all real roots of a system of smooth functions in a box"
)]
struct Args {
    /// Input file describing parameters, search interval, and functions
    input: PathBuf,

    /// Directory the result files are written into
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Suppress the root listing on stdout
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Args::parse();

    match solve_input_file(&args.input, &args.output_dir) {
        Ok(summary) => {
            if !args.quiet {
                println!("Found {} root(s)", summary.roots.len());
                for root in &summary.roots {
                    let line = root
                        .coordinates
                        .iter()
                        .map(|v| format!("{:.16e}", v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("  {}", line);
                }
                println!(
                    "Results written to {}",
                    summary.output_dir.join("roots.csv").display()
                );
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("solve: {}", error);
            ExitCode::FAILURE
        }
    }
}
