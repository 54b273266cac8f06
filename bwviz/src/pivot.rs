/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

use crate::error::{ErrorKind, Result};
use average::{Estimate, Mean};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;

/// Thread count
///
/// The number of CPU threads.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadCount(pub usize);

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bandwidth measurement in long format
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledRecord {
    pub key: String,
    pub threads: ThreadCount,
    /// MB/s
    pub bandwidth: f64,
}

/// Derives the thread count of each row from its position.
///
/// Every benchmark run appends a block of `block_size` rows, and the runs are
/// ordered as in `threads`. Thus, row `i` belongs to `threads[i / block_size]`.
pub fn label_thread_counts(
    rows: usize,
    block_size: usize,
    threads: &[ThreadCount],
) -> Result<Vec<ThreadCount>> {
    if block_size == 0 {
        return Err(ErrorKind::InvalidArgument("Block size must be greater than zero".into()).into());
    }
    if rows % block_size != 0 {
        return Err(ErrorKind::InvalidArgument(format!(
            "{} rows don't divide into blocks of {} rows",
            rows, block_size
        ))
        .into());
    }

    let blocks = rows / block_size;
    if blocks > threads.len() {
        return Err(ErrorKind::InvalidArgument(format!(
            "Found {} blocks of results, but only {} thread counts to label them with",
            blocks,
            threads.len()
        ))
        .into());
    }

    Ok((0..rows).map(|i| threads[i / block_size]).collect())
}

/// One row of a pivot table
#[derive(Clone, Debug, PartialEq)]
pub struct PivotRow {
    pub key: String,
    pub values: Vec<Option<f64>>,
}

/// A wide table with one row per key and one column per thread count
#[derive(Clone, Debug, PartialEq)]
pub struct PivotTable {
    index_name: String,
    columns: Vec<String>,
    rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn new(index_name: String, columns: Vec<String>, rows: Vec<PivotRow>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.values.len() != columns.len()) {
            return Err(ErrorKind::InvalidArgument(format!(
                "Row '{}' has {} values, but the table has {} columns",
                row.key,
                row.values.len(),
                columns.len()
            ))
            .into());
        }

        Ok(Self {
            index_name,
            columns,
            rows,
        })
    }

    /// Pivots long-format records.
    ///
    /// Columns are the distinct thread counts in ascending order, rows are
    /// the distinct keys in order of first appearance. Each cell is the mean
    /// of all bandwidths for its key and thread count.
    pub fn from_records(index_name: &str, records: &[LabeledRecord]) -> Result<Self> {
        let threads: Vec<ThreadCount> = records
            .iter()
            .map(|r| r.threads)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_of: HashMap<ThreadCount, usize> = threads
            .iter()
            .enumerate()
            .map(|(i, &t)| (t, i))
            .collect();

        let mut keys: Vec<&str> = Vec::new();
        let mut row_of: HashMap<&str, usize> = HashMap::new();
        let mut cells: Vec<Vec<Mean>> = Vec::new();

        for record in records {
            let row = *row_of.entry(record.key.as_str()).or_insert_with(|| {
                keys.push(record.key.as_str());
                cells.push(threads.iter().map(|_| Mean::new()).collect());
                keys.len() - 1
            });
            cells[row][column_of[&record.threads]].add(record.bandwidth);
        }

        let rows = keys
            .into_iter()
            .zip(cells.into_iter())
            .map(|(key, means)| PivotRow {
                key: key.to_string(),
                values: means
                    .iter()
                    .map(|m| if m.len() == 0 { None } else { Some(m.mean()) })
                    .collect(),
            })
            .collect();

        Self::new(
            index_name.to_string(),
            threads.iter().map(|t| t.to_string()).collect(),
            rows,
        )
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[PivotRow] {
        &self.rows
    }

    /// Smallest and largest present value, `None` if all cells are empty
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.rows
            .iter()
            .flat_map(|row| row.values.iter().filter_map(|&v| v))
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }

    /// Writes the header and one line per row; missing cells are empty.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);

        csv.write_record(std::iter::once(&self.index_name).chain(self.columns.iter()))?;
        for row in &self.rows {
            csv.write_record(
                std::iter::once(row.key.clone()).chain(
                    row.values
                        .iter()
                        .map(|v| v.map_or_else(String::new, |v| v.to_string())),
                ),
            )?;
        }

        csv.flush()?;
        Ok(())
    }

    pub fn read_csv<R: io::Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?.clone();
        let index_name = headers
            .get(0)
            .ok_or_else(|| ErrorKind::InvalidArgument("Pivot table has no header".into()))?
            .to_string();
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
        if columns.is_empty() {
            return Err(ErrorKind::InvalidArgument(format!(
                "Pivot table '{}' has no value columns",
                index_name
            ))
            .into());
        }

        let mut rows = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let key = record.get(0).unwrap_or_default().to_string();
            let values = record
                .iter()
                .skip(1)
                .zip(columns.iter())
                .map(|(field, column)| parse_cell(field, line + 1, column))
                .collect::<Result<Vec<_>>>()?;

            rows.push(PivotRow { key, values });
        }

        Self::new(index_name, columns, rows)
    }
}

fn parse_cell(field: &str, row: usize, column: &str) -> Result<Option<f64>> {
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    field.parse::<f64>().map(Some).map_err(|e| {
        ErrorKind::ParseError(format!(
            "Row {}, column '{}': '{}' isn't a number ({})",
            row, column, field, e
        ))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, threads: usize, bandwidth: f64) -> LabeledRecord {
        LabeledRecord {
            key: key.to_string(),
            threads: ThreadCount(threads),
            bandwidth,
        }
    }

    #[test]
    fn labels_follow_blocks() {
        let threads = [ThreadCount(1), ThreadCount(2), ThreadCount(4)];
        let labels = label_thread_counts(6, 3, &threads).unwrap();
        assert_eq!(
            labels,
            vec![
                ThreadCount(1),
                ThreadCount(1),
                ThreadCount(1),
                ThreadCount(2),
                ThreadCount(2),
                ThreadCount(2)
            ]
        );
    }

    #[test]
    fn partial_block_is_rejected() {
        let threads = [ThreadCount(1), ThreadCount(2)];
        assert!(label_thread_counts(7, 3, &threads).is_err());
    }

    #[test]
    fn too_many_blocks_are_rejected() {
        let threads = [ThreadCount(1)];
        assert!(label_thread_counts(10, 5, &threads).is_err());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(label_thread_counts(0, 0, &[]).is_err());
    }

    #[test]
    fn no_rows_no_labels() {
        assert!(label_thread_counts(0, 5, &[]).unwrap().is_empty());
    }

    #[test]
    fn pivot_orders_columns_and_rows() {
        let records = vec![
            record("b", 8, 80.0),
            record("a", 8, 81.0),
            record("b", 2, 20.0),
            record("a", 2, 21.0),
        ];

        let table = PivotTable::from_records("Key", &records).unwrap();
        assert_eq!(table.index_name(), "Key");
        assert_eq!(table.columns(), &["2".to_string(), "8".to_string()]);
        assert_eq!(table.rows()[0].key, "b");
        assert_eq!(table.rows()[0].values, vec![Some(20.0), Some(80.0)]);
        assert_eq!(table.rows()[1].key, "a");
        assert_eq!(table.rows()[1].values, vec![Some(21.0), Some(81.0)]);
    }

    #[test]
    fn pivot_averages_duplicates_and_leaves_gaps() {
        let records = vec![
            record("x", 1, 10.0),
            record("x", 1, 20.0),
            record("y", 4, 40.0),
        ];

        let table = PivotTable::from_records("Key", &records).unwrap();
        assert_eq!(table.rows()[0].values, vec![Some(15.0), None]);
        assert_eq!(table.rows()[1].values, vec![None, Some(40.0)]);
        assert_eq!(table.value_range(), Some((15.0, 40.0)));
    }

    #[test]
    fn csv_keeps_missing_cells_empty() {
        let records = vec![record("x", 1, 10.5), record("y", 2, 2.25)];
        let table = PivotTable::from_records("Unroll Loop Size", &records).unwrap();

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "Unroll Loop Size,1,2\nx,10.5,\ny,,2.25\n"
        );

        let reloaded = PivotTable::read_csv(out.as_slice()).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn read_accepts_nan_and_any_headers() {
        let csv = "Optimization Type,one,two\nfoo,NaN,3.5\n";
        let table = PivotTable::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["one".to_string(), "two".to_string()]);
        assert_eq!(table.rows()[0].values, vec![None, Some(3.5)]);
    }

    #[test]
    fn read_rejects_garbage_values() {
        let csv = "Key,1\nfoo,bar\n";
        let err = PivotTable::read_csv(csv.as_bytes()).unwrap_err();
        match err.kind() {
            ErrorKind::ParseError(msg) => assert!(msg.contains("bar"), "{}", msg),
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn read_rejects_tables_without_values() {
        assert!(PivotTable::read_csv("Key\nfoo\n".as_bytes()).is_err());
    }

    #[test]
    fn read_rejects_ragged_rows() {
        assert!(PivotTable::read_csv("Key,1,2\nfoo,1.0\n".as_bytes()).is_err());
    }
}
