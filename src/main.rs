// SPDX-License-Identifier: ISC

use clap::Parser;
use std::path::PathBuf;
use vcddiff::{diff, format_mismatch, list_signals, DiffOptions, DiffOutcome};

#[derive(Parser, Debug)]
#[command(name = "vcddiff")]
#[command(version)]
#[command(about = "Print the first difference between two VCD files", long_about = None)]
struct Args {
    /// First file to compare.
    #[arg(value_name = "VCD1")]
    file1: PathBuf,
    /// Second file to compare.
    #[arg(value_name = "VCD2")]
    file2: PathBuf,
    /// Instance in the first file to compare.
    #[arg(long, value_name = "INSTPATH")]
    top1: Option<String>,
    /// Instance in the second file to compare.
    #[arg(long, value_name = "INSTPATH")]
    top2: Option<String>,
    /// Only compare signals matching a regex.
    #[arg(short, long = "filter", value_name = "REGEX")]
    filter: Vec<String>,
    /// Ignore signals matching a regex.
    #[arg(short, long = "ignore", value_name = "REGEX")]
    ignore: Vec<String>,
    /// List comparable signals and exit.
    #[arg(short, long)]
    list: bool,
    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
    /// Only compare after this time.
    #[arg(short, long, value_name = "TIME")]
    after: Option<u64>,
    /// Only compare before this time.
    #[arg(short, long, value_name = "TIME")]
    before: Option<u64>,
}

fn main() {
    let args = Args::parse();
    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let options = DiffOptions {
        top1: args.top1.clone(),
        top2: args.top2.clone(),
        include: args.filter.clone(),
        exclude: args.ignore.clone(),
        after: args.after,
        before: args.before,
    };

    if args.list {
        return match list_signals(&args.file1, &args.file2, &options) {
            Ok(keys) => {
                for key in keys.iter() {
                    println!("{key}");
                }
                0
            }
            Err(e) => {
                eprintln!("{e}");
                1
            }
        };
    }

    let verbose = args.verbose;
    let mut progress = |msg: &str| {
        if verbose {
            eprintln!("{msg}");
        }
    };

    match diff(&args.file1, &args.file2, &options, &mut progress) {
        Ok(DiffOutcome::Equivalent) => 0,
        Ok(DiffOutcome::Mismatches(mismatches)) => {
            for m in mismatches.iter() {
                println!("{}", format_mismatch(m));
            }
            1
        }
        Ok(DiffOutcome::NoCommonSignals) => {
            eprintln!("no common signals between input files");
            2
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}
