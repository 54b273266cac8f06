/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

mod error;
mod memory_bandwidth;
mod types;
mod utils;

use crate::error::{ErrorKind, Result};
use crate::memory_bandwidth::{MemoryBandwidth, RawResultFiles};
use crate::types::*;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt)]
#[structopt(
    name = "membench",
    about = "Measures main-memory read and write bandwidth of the CPU"
)]
struct Options {
    #[structopt(short = "s", long = "size", default_value = "1024")]
    /// Size of buffer (MiB)
    size: usize,

    #[structopt(long = "threads", require_delimiter = true)]
    /// Number of CPU threads (default: all logical CPUs)
    threads: Vec<usize>,

    #[structopt(long = "unroll", default_value = "1,2,4,8,16", require_delimiter = true)]
    /// Read loop unroll factors to evaluate
    unroll: Vec<u32>,

    #[structopt(short = "r", long = "repeat", default_value = "1")]
    /// Number of times to repeat benchmark
    repeat: u32,

    #[structopt(
        long = "write-results",
        default_value = "output/write_results.csv",
        parse(from_os_str)
    )]
    /// Raw write results, appended to
    write_results: PathBuf,

    #[structopt(
        long = "read-results",
        default_value = "output/read_results.csv",
        parse(from_os_str)
    )]
    /// Raw read results, appended to
    read_results: PathBuf,

    #[structopt(long = "csv", parse(from_os_str))]
    /// CSV output file with every measurement
    csv: Option<PathBuf>,

    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    /// Log progress and results (repeat for more detail)
    verbose: u8,
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

fn buffer_bytes(size_mib: usize) -> Result<usize> {
    let mb = 2_usize.pow(20);
    let bytes = size_mib.checked_mul(mb).ok_or_else(|| {
        ErrorKind::InvalidArgument(format!("Buffer size of {} MiB is too large", size_mib))
    })?;
    Ok(bytes)
}

fn main() -> Result<()> {
    let options = Options::from_args();
    init_logging(options.verbose);

    let bytes = buffer_bytes(options.size)?;

    let threads = if options.threads.is_empty() {
        vec![ThreadCount(num_cpus::get())]
    } else {
        options
            .threads
            .iter()
            .map(|&t| ThreadCount(t))
            .collect::<Vec<_>>()
    };

    let mut csv_file = options.csv.map(std::fs::File::create).transpose()?;

    let raw_files = RawResultFiles {
        write_results: options.write_results,
        read_results: options.read_results,
    };

    MemoryBandwidth::measure(
        bytes,
        threads,
        options.unroll.iter().map(|&u| Unroll(u)).collect::<Vec<_>>(),
        options.repeat,
        &raw_files,
        csv_file.as_mut(),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_in_mebibytes() {
        assert_eq!(buffer_bytes(0).unwrap(), 0);
        assert_eq!(buffer_bytes(3).unwrap(), 3 * 1024 * 1024);
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let err = buffer_bytes(usize::MAX / 1024).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)), "{}", err);
    }
}
