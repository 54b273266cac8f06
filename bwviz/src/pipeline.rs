/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

use crate::colormap::Coolwarm;
use crate::error::Result;
use crate::pivot::{label_thread_counts, LabeledRecord, PivotTable, ThreadCount};
use crate::plot::{self, ChartLabels};
use crate::raw::{self, ReadResult, WriteResult};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const WRITE_INDEX_NAME: &str = "Optimization Type";
pub const READ_INDEX_NAME: &str = "Unroll Loop Size";

/// How raw rows map to thread counts
#[derive(Clone, Debug)]
pub struct PivotConfig {
    /// Thread count of each block of rows, in benchmark order
    pub threads: Vec<ThreadCount>,
    /// Rows per benchmark run in the write results
    pub write_block: usize,
    /// Rows per benchmark run in the read results
    pub read_block: usize,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            threads: [1, 2, 4, 8, 16, 32, 64].iter().map(|&t| ThreadCount(t)).collect(),
            write_block: 3,
            read_block: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RawPaths {
    pub write_results: PathBuf,
    pub read_results: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PivotPaths {
    pub write_pivot: PathBuf,
    pub read_pivot: PathBuf,
}

pub fn pivot_write_results(results: &[WriteResult], config: &PivotConfig) -> Result<PivotTable> {
    let labels = label_thread_counts(results.len(), config.write_block, &config.threads)?;

    let records: Vec<LabeledRecord> = results
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(row, (result, threads))| {
            if result.recorded_threads != threads.0 {
                warn!(
                    row,
                    recorded = result.recorded_threads,
                    derived = threads.0,
                    "Recorded thread count differs from its block position, using the block position"
                );
            }

            LabeledRecord {
                key: result.optimization.clone(),
                threads,
                bandwidth: result.bandwidth,
            }
        })
        .collect();

    PivotTable::from_records(WRITE_INDEX_NAME, &records)
}

pub fn pivot_read_results(results: &[ReadResult], config: &PivotConfig) -> Result<PivotTable> {
    let labels = label_thread_counts(results.len(), config.read_block, &config.threads)?;

    let records: Vec<LabeledRecord> = results
        .iter()
        .zip(labels)
        .map(|(result, threads)| LabeledRecord {
            key: result.unroll.to_string(),
            threads,
            bandwidth: result.bandwidth,
        })
        .collect();

    PivotTable::from_records(READ_INDEX_NAME, &records)
}

/// Loads the raw results, pivots them, and writes the pivot tables.
pub fn pivot_files(raw: &RawPaths, pivot: &PivotPaths, config: &PivotConfig) -> Result<()> {
    let write_results = raw::load_write_results(BufReader::new(File::open(&raw.write_results)?))?;
    let read_results = raw::load_read_results(BufReader::new(File::open(&raw.read_results)?))?;
    debug!(
        write_rows = write_results.len(),
        read_rows = read_results.len(),
        "Loaded raw results"
    );

    let write_table = pivot_write_results(&write_results, config)?;
    let read_table = pivot_read_results(&read_results, config)?;

    save_table(&write_table, &pivot.write_pivot)?;
    save_table(&read_table, &pivot.read_pivot)?;

    Ok(())
}

pub fn save_table(table: &PivotTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    table.write_csv(File::create(path)?)?;
    info!(
        path = %path.display(),
        rows = table.rows().len(),
        columns = table.columns().len(),
        "Saved pivot table"
    );
    Ok(())
}

pub fn load_table(path: &Path) -> Result<PivotTable> {
    PivotTable::read_csv(BufReader::new(File::open(path)?))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    Write,
    Read,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChartKind {
    Line,
    Heatmap,
}

/// One of the fixed charts rendered from the pivot tables
#[derive(Clone, Copy, Debug)]
pub struct Chart {
    pub file_name: &'static str,
    pub table: Table,
    pub kind: ChartKind,
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
}

pub const CHARTS: [Chart; 3] = [
    Chart {
        file_name: "write_line_graph.png",
        table: Table::Write,
        kind: ChartKind::Line,
        title: "Bandwidth vs Number of Threads",
        x_label: "Number of Threads",
        y_label: "Bandwidth (MB/s)",
    },
    Chart {
        file_name: "read_heatmap.png",
        table: Table::Read,
        kind: ChartKind::Heatmap,
        title: "Heatmap of Bandwidth vs Unroll Loop Size and Threads",
        x_label: "Number of Threads",
        y_label: "Unroll Loop Size",
    },
    Chart {
        file_name: "write_heatmap.png",
        table: Table::Write,
        kind: ChartKind::Heatmap,
        title: "Heatmap of Write Bandwidth vs Optimization and Threads",
        x_label: "Number of Threads",
        y_label: "Optimization Type",
    },
];

impl Chart {
    pub fn labels(&self) -> ChartLabels {
        ChartLabels {
            title: self.title.to_string(),
            x_label: self.x_label.to_string(),
            y_label: self.y_label.to_string(),
        }
    }

    pub fn render(&self, table: &PivotTable, path: &Path) -> Result<()> {
        match self.kind {
            ChartKind::Line => plot::line_graph(table, &self.labels(), path),
            ChartKind::Heatmap => plot::heatmap(table, &self.labels(), &Coolwarm, path),
        }
    }
}

/// Re-loads the pivot tables and renders all charts into `out_dir`.
///
/// Returns the paths of the rendered images.
pub fn plot_files(pivot: &PivotPaths, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let write_table = load_table(&pivot.write_pivot)?;
    let read_table = load_table(&pivot.read_pivot)?;

    CHARTS
        .iter()
        .map(|chart| -> Result<PathBuf> {
            let table = match chart.table {
                Table::Write => &write_table,
                Table::Read => &read_table,
            };
            let path = out_dir.join(chart.file_name);
            chart.render(table, &path)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_result(label: &str, threads: usize, bandwidth: f64) -> WriteResult {
        WriteResult {
            optimization: label.to_string(),
            recorded_threads: threads,
            bandwidth,
        }
    }

    #[test]
    fn write_results_pivot_by_block() {
        let results = vec![
            write_result("No Optimization", 1, 10.0),
            write_result("Zero", 1, 11.0),
            write_result("NT", 1, 12.0),
            write_result("No Optimization", 2, 20.0),
            write_result("Zero", 2, 21.0),
            write_result("NT", 2, 22.0),
        ];

        let table = pivot_write_results(&results, &PivotConfig::default()).unwrap();
        assert_eq!(table.index_name(), WRITE_INDEX_NAME);
        assert_eq!(table.columns(), &["1".to_string(), "2".to_string()]);
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.rows()[2].key, "NT");
        assert_eq!(table.rows()[2].values, vec![Some(12.0), Some(22.0)]);
    }

    #[test]
    fn block_position_wins_over_recorded_threads() {
        let config = PivotConfig {
            threads: vec![ThreadCount(8)],
            write_block: 1,
            read_block: 1,
        };
        let results = vec![write_result("No Optimization", 3, 10.0)];

        let table = pivot_write_results(&results, &config).unwrap();
        assert_eq!(table.columns(), &["8".to_string()]);
    }

    #[test]
    fn read_results_keyed_by_unroll() {
        let config = PivotConfig {
            threads: vec![ThreadCount(4), ThreadCount(16)],
            write_block: 3,
            read_block: 2,
        };
        let results = vec![
            ReadResult { unroll: 1, bandwidth: 1.0 },
            ReadResult { unroll: 16, bandwidth: 2.0 },
            ReadResult { unroll: 1, bandwidth: 3.0 },
            ReadResult { unroll: 16, bandwidth: 4.0 },
        ];

        let table = pivot_read_results(&results, &config).unwrap();
        assert_eq!(table.index_name(), READ_INDEX_NAME);
        assert_eq!(table.columns(), &["4".to_string(), "16".to_string()]);
        assert_eq!(table.rows()[0].key, "1");
        assert_eq!(table.rows()[0].values, vec![Some(1.0), Some(3.0)]);
        assert_eq!(table.rows()[1].key, "16");
        assert_eq!(table.rows()[1].values, vec![Some(2.0), Some(4.0)]);
    }

    #[test]
    fn incomplete_read_block_is_rejected() {
        let results = vec![ReadResult { unroll: 1, bandwidth: 1.0 }];
        assert!(pivot_read_results(&results, &PivotConfig::default()).is_err());
    }
}
