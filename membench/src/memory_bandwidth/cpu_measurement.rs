// Copyright 2018-2022 Clemens Lutz
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::cpu_memory_bandwidth::CpuMemoryBandwidth;
use super::data_point::DataPoint;
use super::{MemoryOperation, WriteVariant};
use crate::error::Result;
use crate::types::{megabytes_per_second, ThreadCount, Unroll};
use itertools::{iproduct, izip};
use std::iter;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(super) struct CpuMeasurement {
    unrolls: Vec<Unroll>,
    template: DataPoint,
}

impl CpuMeasurement {
    pub(super) fn new(unrolls: Vec<Unroll>, template: DataPoint) -> Self {
        Self {
            unrolls,
            template,
        }
    }

    /// Runs all write variants, then all reads, with `threads` workers.
    ///
    /// The writes leave the buffer filled with ones, which the reads check
    /// against their sums.
    pub(super) fn measure(
        &self,
        threads: ThreadCount,
        len: usize,
        repeat: u32,
    ) -> Result<Vec<DataPoint>> {
        let mut data_points = Vec::new();

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.0)
            .build()?;
        let mut bench = CpuMemoryBandwidth::new(len);
        let bytes = bench.bytes();

        info!(threads = threads.0, bytes, "Running bandwidth test");

        for (&variant, (warm_up, run)) in iproduct!(
            WriteVariant::ALL.iter(),
            izip!(iter::once(true).chain(iter::repeat(false)), 0..repeat)
        ) {
            let duration = bench.write(variant, &thread_pool);
            let data_point = self.data_point(
                MemoryOperation::Write,
                Some(variant),
                None,
                warm_up,
                threads,
                bytes,
                duration,
            );

            debug!(run, warm_up, ns = data_point.ns, "Measured write");
            info!(
                "{}, Threads: {}, Bandwidth: {:.6} MB/s",
                variant.label(),
                threads,
                data_point.megabytes_per_second
            );
            data_points.push(data_point);
        }

        for (&unroll, (warm_up, run)) in iproduct!(
            self.unrolls.iter(),
            izip!(iter::once(true).chain(iter::repeat(false)), 0..repeat)
        ) {
            let (duration, sum) = bench.read(unroll, &thread_pool)?;
            if sum != bench.expected_sum() {
                warn!(
                    sum,
                    expected = bench.expected_sum(),
                    "Read sum doesn't match the written data"
                );
            }

            let data_point = self.data_point(
                MemoryOperation::Read,
                None,
                Some(unroll),
                warm_up,
                threads,
                bytes,
                duration,
            );

            debug!(run, warm_up, ns = data_point.ns, "Measured read");
            info!(
                "Unroll Size {}, Threads: {}, Bandwidth: {:.6} MB/s",
                unroll, threads, data_point.megabytes_per_second
            );
            data_points.push(data_point);
        }

        Ok(data_points)
    }

    #[allow(clippy::too_many_arguments)]
    fn data_point(
        &self,
        op: MemoryOperation,
        write_variant: Option<WriteVariant>,
        unroll: Option<Unroll>,
        warm_up: bool,
        threads: ThreadCount,
        bytes: usize,
        duration: Duration,
    ) -> DataPoint {
        let ns = duration.as_secs() * 10_u64.pow(9) + duration.subsec_nanos() as u64;

        DataPoint {
            memory_operation: Some(op),
            write_variant,
            unroll,
            warm_up,
            threads: Some(threads),
            bytes,
            ns,
            megabytes_per_second: megabytes_per_second(bytes, ns),
            ..self.template.clone()
        }
    }
}
