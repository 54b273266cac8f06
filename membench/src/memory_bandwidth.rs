/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

mod buffer;
mod cpu_measurement;
mod cpu_memory_bandwidth;
mod data_point;

use self::cpu_measurement::CpuMeasurement;
use self::data_point::DataPoint;
use crate::error::{ErrorKind, Result};
use crate::types::*;
use crate::utils::hw_info::{self, ProcessorCache};
use average::{Estimate, Mean};
use itertools::Itertools;
use serde_derive::Serialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum MemoryOperation {
    Read,
    Write,
}

/// Techniques to increase write bandwidth
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum WriteVariant {
    /// Write to freshly allocated memory, including page faults
    NoOptimization,
    /// Write zeros before timing, so that all pages are backed
    ZeroBeforeTiming,
    /// Like `ZeroBeforeTiming`, but with non-temporal stores
    NonTemporal,
}

impl WriteVariant {
    pub const ALL: [WriteVariant; 3] = [
        WriteVariant::NoOptimization,
        WriteVariant::ZeroBeforeTiming,
        WriteVariant::NonTemporal,
    ];

    /// Row label in the raw write results
    pub fn label(self) -> &'static str {
        match self {
            WriteVariant::NoOptimization => "No Optimization",
            WriteVariant::ZeroBeforeTiming => "Set Mem to Zero Before Timing",
            WriteVariant::NonTemporal => "Non-Temporal Writes + Set Mem to Zero Before Timing",
        }
    }
}

/// Store instruction type
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Store {
    Temporal,
    NonTemporal,
}

/// Files that the raw results are appended to
#[derive(Clone, Debug)]
pub struct RawResultFiles {
    pub write_results: PathBuf,
    pub read_results: PathBuf,
}

/// Bandwidth of one configuration, averaged over its measured runs
#[derive(Clone, Debug, PartialEq)]
struct Summary {
    threads: ThreadCount,
    memory_operation: MemoryOperation,
    write_variant: Option<WriteVariant>,
    unroll: Option<Unroll>,
    megabytes_per_second: f64,
}

pub struct MemoryBandwidth;

impl MemoryBandwidth {
    pub fn measure<W>(
        bytes: usize,
        threads: Vec<ThreadCount>,
        unrolls: Vec<Unroll>,
        repeat: u32,
        raw_files: &RawResultFiles,
        writer: Option<&mut W>,
    ) -> Result<()>
    where
        W: io::Write,
    {
        let len = bytes / size_of::<f64>();
        if len == 0 {
            return Err(ErrorKind::InvalidArgument(
                "Buffer must hold at least one element".to_string(),
            )
            .into());
        }
        if threads.is_empty() || threads.iter().any(|&ThreadCount(t)| t == 0) {
            return Err(ErrorKind::InvalidArgument(
                "Thread counts must be greater than zero".to_string(),
            )
            .into());
        }
        if repeat == 0 {
            return Err(ErrorKind::InvalidArgument(
                "Repeat must be greater than zero".to_string(),
            )
            .into());
        }
        for &unroll in &unrolls {
            cpu_memory_bandwidth::read_fn(unroll)?;
        }

        debug!("{}", ProcessorCache {});
        if let Some(l3_size) = ProcessorCache::L3_size() {
            if bytes < 4 * l3_size {
                warn!(
                    bytes,
                    l3_size, "Buffer is small compared to the L3 cache, results include cache effects"
                );
            }
        }

        let hostname = hostname::get()?.to_string_lossy().into_owned();
        let template = DataPoint {
            hostname,
            device_codename: hw_info::cpu_codename(),
            ..DataPoint::default()
        };

        let mnt = CpuMeasurement::new(unrolls, template);
        let mut csv = writer.map(csv::Writer::from_writer);

        // Append each block as soon as it's measured, so that a later failure
        // doesn't discard completed thread counts
        for &thread_count in &threads {
            let data_points = mnt.measure(thread_count, len, repeat)?;
            append_raw_results(&summarize(&data_points), raw_files)?;

            if let Some(csv) = csv.as_mut() {
                data_points
                    .iter()
                    .try_for_each(|row| csv.serialize(row))?;
                csv.flush()?;
            }
        }

        Ok(())
    }
}

/// Averages the runs of each configuration, excluding the warm-up run when
/// there is more than one run.
fn summarize(data_points: &[DataPoint]) -> Vec<Summary> {
    let configurations = data_points
        .iter()
        .group_by(|dp| (dp.threads, dp.memory_operation, dp.write_variant, dp.unroll));

    configurations
        .into_iter()
        .filter_map(|((threads, op, write_variant, unroll), group)| {
            let runs: Vec<&DataPoint> = group.collect();
            let measured: Vec<f64> = if runs.iter().any(|dp| !dp.warm_up) {
                runs.iter()
                    .filter(|dp| !dp.warm_up)
                    .map(|dp| dp.megabytes_per_second)
                    .collect()
            } else {
                runs.iter().map(|dp| dp.megabytes_per_second).collect()
            };

            let mut mean = Mean::new();
            measured.iter().for_each(|&bw| mean.add(bw));

            Some(Summary {
                threads: threads?,
                memory_operation: op?,
                write_variant,
                unroll,
                megabytes_per_second: mean.mean(),
            })
        })
        .collect()
}

fn append_raw_results(summaries: &[Summary], raw_files: &RawResultFiles) -> Result<()> {
    let write_file = open_append(&raw_files.write_results)?;
    let read_file = open_append(&raw_files.read_results)?;

    write_raw_rows(summaries, write_file, read_file)?;

    info!(
        write_results = %raw_files.write_results.display(),
        read_results = %raw_files.read_results.display(),
        "Appended raw results"
    );
    Ok(())
}

fn open_append(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Writes the headerless raw rows.
///
/// Write rows are `label,threads,bandwidth`, read rows are `unroll,bandwidth`.
/// Each thread count yields one contiguous block of rows per file.
fn write_raw_rows<W, R>(summaries: &[Summary], write_sink: W, read_sink: R) -> Result<()>
where
    W: io::Write,
    R: io::Write,
{
    let mut write_csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(write_sink);
    let mut read_csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(read_sink);

    for summary in summaries {
        let bandwidth = format!("{:.6}", summary.megabytes_per_second);
        match (summary.memory_operation, summary.write_variant, summary.unroll) {
            (MemoryOperation::Write, Some(variant), _) => write_csv.write_record(&[
                variant.label().to_string(),
                summary.threads.to_string(),
                bandwidth,
            ])?,
            (MemoryOperation::Read, _, Some(unroll)) => {
                read_csv.write_record(&[unroll.to_string(), bandwidth])?
            }
            _ => {
                return Err(ErrorKind::RuntimeError(format!(
                    "Incomplete measurement: {:?}",
                    summary
                ))
                .into())
            }
        }
    }

    write_csv.flush()?;
    read_csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_point(
        threads: usize,
        op: MemoryOperation,
        write_variant: Option<WriteVariant>,
        unroll: Option<u32>,
        warm_up: bool,
        bw: f64,
    ) -> DataPoint {
        DataPoint {
            memory_operation: Some(op),
            write_variant,
            unroll: unroll.map(Unroll),
            warm_up,
            threads: Some(ThreadCount(threads)),
            megabytes_per_second: bw,
            ..DataPoint::default()
        }
    }

    #[test]
    fn summary_excludes_warm_up() {
        let write = Some(WriteVariant::NoOptimization);
        let points = vec![
            data_point(2, MemoryOperation::Write, write, None, true, 100.0),
            data_point(2, MemoryOperation::Write, write, None, false, 10.0),
            data_point(2, MemoryOperation::Write, write, None, false, 20.0),
        ];

        let summaries = summarize(&points);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].megabytes_per_second, 15.0);
    }

    #[test]
    fn single_run_is_kept() {
        let points = vec![
            data_point(1, MemoryOperation::Read, None, Some(4), true, 42.0),
            data_point(1, MemoryOperation::Read, None, Some(8), true, 43.0),
        ];

        let summaries = summarize(&points);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].unroll, Some(Unroll(4)));
        assert_eq!(summaries[1].megabytes_per_second, 43.0);
    }

    #[test]
    fn raw_rows_are_headerless_with_six_decimals() {
        let points = vec![
            data_point(
                4,
                MemoryOperation::Write,
                Some(WriteVariant::NonTemporal),
                None,
                true,
                1234.5,
            ),
            data_point(4, MemoryOperation::Read, None, Some(16), true, 999.25),
        ];

        let mut write_rows = Vec::new();
        let mut read_rows = Vec::new();
        write_raw_rows(&summarize(&points), &mut write_rows, &mut read_rows).unwrap();

        assert_eq!(
            String::from_utf8(write_rows).unwrap(),
            "Non-Temporal Writes + Set Mem to Zero Before Timing,4,1234.500000\n"
        );
        assert_eq!(String::from_utf8(read_rows).unwrap(), "16,999.250000\n");
    }

    fn all_unrolls() -> Vec<Unroll> {
        [1, 2, 4, 8, 16].iter().map(|&u| Unroll(u)).collect()
    }

    #[test]
    fn measure_appends_one_block_per_thread_count() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let raw_files = RawResultFiles {
            write_results: dir.path().join("output").join("write_results.csv"),
            read_results: dir.path().join("output").join("read_results.csv"),
        };
        let thread_counts = ["1", "2"];
        let mut detailed = Vec::new();

        for _ in 0..2 {
            MemoryBandwidth::measure(
                64 * 1024,
                vec![ThreadCount(1), ThreadCount(2)],
                all_unrolls(),
                1,
                &raw_files,
                Some(&mut detailed),
            )?;
        }

        let write_rows = fs::read_to_string(&raw_files.write_results)?;
        let write_rows: Vec<Vec<&str>> = write_rows.lines().map(|l| l.split(',').collect()).collect();
        assert_eq!(write_rows.len(), 12);
        for (i, row) in write_rows.iter().enumerate() {
            assert_eq!(row.len(), 3, "{:?}", row);
            assert_eq!(row[0], WriteVariant::ALL[i % 3].label());
            assert_eq!(row[1], thread_counts[(i / 3) % 2]);
            assert_eq!(row[2].split('.').nth(1).map(str::len), Some(6), "{:?}", row);
        }

        let read_rows = fs::read_to_string(&raw_files.read_results)?;
        let read_rows: Vec<Vec<&str>> = read_rows.lines().map(|l| l.split(',').collect()).collect();
        assert_eq!(read_rows.len(), 20);
        for (i, row) in read_rows.iter().enumerate() {
            assert_eq!(row.len(), 2, "{:?}", row);
            assert_eq!(row[0], all_unrolls()[i % 5].to_string());
            assert!(row[1].parse::<f64>()? > 0.0);
        }

        let detailed = String::from_utf8(detailed)?;
        let headers = detailed
            .lines()
            .filter(|l| l.starts_with("hostname,"))
            .count();
        assert_eq!(headers, 2);
        assert_eq!(detailed.lines().count(), 2 * (1 + 2 * (3 + 5)));

        Ok(())
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw_files = RawResultFiles {
            write_results: dir.path().join("write_results.csv"),
            read_results: dir.path().join("read_results.csv"),
        };

        for &bytes in &[0, size_of::<f64>() - 1] {
            let err = MemoryBandwidth::measure::<Vec<u8>>(
                bytes,
                vec![ThreadCount(1)],
                all_unrolls(),
                1,
                &raw_files,
                None,
            )
            .unwrap_err();
            assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)), "{}", err);
        }
        assert!(!raw_files.write_results.exists());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let raw_files = RawResultFiles {
            write_results: PathBuf::from("unused_write.csv"),
            read_results: PathBuf::from("unused_read.csv"),
        };

        let result = MemoryBandwidth::measure::<Vec<u8>>(
            1024,
            vec![ThreadCount(0)],
            vec![Unroll(1)],
            1,
            &raw_files,
            None,
        );
        assert!(result.is_err());
    }
}
