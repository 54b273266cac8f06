/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

//! Loads the headerless result files that the benchmark appends to.
//!
//! Write results have one row per optimization variant:
//! `label,threads,bandwidth`. Read results have one row per unroll factor:
//! `unroll,bandwidth`. Each benchmark run appends one block of rows.

use crate::error::{ErrorKind, Result};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use std::io;

#[derive(Debug, Deserialize)]
struct WriteRow(String, usize, f64);

#[derive(Debug, Deserialize)]
struct ReadRow(u32, f64);

/// One row of the raw write results
#[derive(Clone, Debug, PartialEq)]
pub struct WriteResult {
    pub optimization: String,
    /// Thread count that the benchmark reported for the row
    pub recorded_threads: usize,
    /// MB/s
    pub bandwidth: f64,
}

/// One row of the raw read results
#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub unroll: u32,
    /// MB/s
    pub bandwidth: f64,
}

/// Deserializes the rows, skipping lines that are blank after trimming.
fn rows<R: io::Read, T: DeserializeOwned>(reader: R) -> impl Iterator<Item = Result<T>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_records()
        .filter_map(|record| match record {
            Ok(record) if record.iter().all(str::is_empty) => None,
            Ok(record) => Some(record.deserialize(None).map_err(Into::into)),
            Err(e) => Some(Err(e.into())),
        })
}

pub fn load_write_results<R: io::Read>(rdr: R) -> Result<Vec<WriteResult>> {
    rows::<_, WriteRow>(rdr)
        .map(|row| -> Result<WriteResult> {
            let WriteRow(label, recorded_threads, bandwidth) = row?;
            Ok(WriteResult {
                optimization: clean_label(&label)?,
                recorded_threads,
                bandwidth,
            })
        })
        .collect()
}

pub fn load_read_results<R: io::Read>(rdr: R) -> Result<Vec<ReadResult>> {
    rows::<_, ReadRow>(rdr)
        .map(|row| -> Result<ReadResult> {
            let ReadRow(unroll, bandwidth) = row?;
            Ok(ReadResult { unroll, bandwidth })
        })
        .collect()
}

/// Trims the label and collapses internal whitespace.
pub fn clean_label(label: &str) -> Result<String> {
    let cleaned = label.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return Err(ErrorKind::InvalidArgument("Empty row label".to_string()).into());
    }

    Ok(cleaned)
}
