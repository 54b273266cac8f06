/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

use bwviz::error::Result;
use bwviz::pipeline::{self, PivotConfig, PivotPaths, RawPaths};
use bwviz::pivot::ThreadCount;
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt)]
#[structopt(
    name = "bwviz",
    about = "Pivots memory bandwidth results and renders them as charts"
)]
struct Options {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    /// Log progress (repeat for more detail)
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    #[structopt(name = "pivot")]
    /// Label raw results with thread counts and write pivot tables
    Pivot(CmdPivot),

    #[structopt(name = "plot")]
    /// Render a line graph and heatmaps from pivot tables
    Plot(CmdPlot),

    #[structopt(name = "all")]
    /// Pivot the raw results, then render the charts
    All(CmdAll),
}

#[derive(StructOpt)]
struct ArgRawPaths {
    #[structopt(
        long = "write-results",
        default_value = "output/write_results.csv",
        parse(from_os_str)
    )]
    /// Raw write results
    write_results: PathBuf,

    #[structopt(
        long = "read-results",
        default_value = "output/read_results.csv",
        parse(from_os_str)
    )]
    /// Raw read results
    read_results: PathBuf,
}

#[derive(StructOpt)]
struct ArgPivotPaths {
    #[structopt(
        long = "write-pivot",
        default_value = "output/write_pivot.csv",
        parse(from_os_str)
    )]
    /// Pivot table of the write results
    write_pivot: PathBuf,

    #[structopt(
        long = "read-pivot",
        default_value = "output/read_pivot.csv",
        parse(from_os_str)
    )]
    /// Pivot table of the read results
    read_pivot: PathBuf,
}

#[derive(StructOpt)]
struct ArgPivotConfig {
    #[structopt(
        long = "threads",
        default_value = "1,2,4,8,16,32,64",
        require_delimiter = true
    )]
    /// Thread count of each benchmark run, in the order the runs were appended
    threads: Vec<usize>,

    #[structopt(long = "write-block", default_value = "3")]
    /// Rows per benchmark run in the write results
    write_block: usize,

    #[structopt(long = "read-block", default_value = "5")]
    /// Rows per benchmark run in the read results
    read_block: usize,
}

#[derive(StructOpt)]
struct CmdPivot {
    #[structopt(flatten)]
    raw: ArgRawPaths,

    #[structopt(flatten)]
    pivot: ArgPivotPaths,

    #[structopt(flatten)]
    config: ArgPivotConfig,
}

#[derive(StructOpt)]
struct CmdPlot {
    #[structopt(flatten)]
    pivot: ArgPivotPaths,

    #[structopt(long = "out-dir", default_value = "output", parse(from_os_str))]
    /// Directory for the rendered images
    out_dir: PathBuf,
}

#[derive(StructOpt)]
struct CmdAll {
    #[structopt(flatten)]
    raw: ArgRawPaths,

    #[structopt(flatten)]
    pivot: ArgPivotPaths,

    #[structopt(flatten)]
    config: ArgPivotConfig,

    #[structopt(long = "out-dir", default_value = "output", parse(from_os_str))]
    /// Directory for the rendered images
    out_dir: PathBuf,
}

impl From<ArgRawPaths> for RawPaths {
    fn from(arg: ArgRawPaths) -> Self {
        Self {
            write_results: arg.write_results,
            read_results: arg.read_results,
        }
    }
}

impl From<ArgPivotPaths> for PivotPaths {
    fn from(arg: ArgPivotPaths) -> Self {
        Self {
            write_pivot: arg.write_pivot,
            read_pivot: arg.read_pivot,
        }
    }
}

impl From<ArgPivotConfig> for PivotConfig {
    fn from(arg: ArgPivotConfig) -> Self {
        Self {
            threads: arg.threads.iter().map(|&t| ThreadCount(t)).collect(),
            write_block: arg.write_block,
            read_block: arg.read_block,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn plot(pivot: &PivotPaths, out_dir: &Path) -> Result<()> {
    let images = pipeline::plot_files(pivot, out_dir)?;
    images
        .iter()
        .for_each(|image| info!(path = %image.display(), "Saved chart"));
    Ok(())
}

fn main() -> Result<()> {
    let options = Options::from_args();
    init_logging(options.verbose);

    match options.cmd {
        Command::Pivot(cmd) => {
            pipeline::pivot_files(&cmd.raw.into(), &cmd.pivot.into(), &cmd.config.into())?;
        }
        Command::Plot(cmd) => {
            plot(&cmd.pivot.into(), &cmd.out_dir)?;
        }
        Command::All(cmd) => {
            let pivot: PivotPaths = cmd.pivot.into();
            pipeline::pivot_files(&cmd.raw.into(), &pivot, &cmd.config.into())?;
            plot(&pivot, &cmd.out_dir)?;
        }
    }

    Ok(())
}
