/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

use super::buffer::Buffer;
use super::{Store, WriteVariant};
use crate::error::{ErrorKind, Result};
use crate::types::Unroll;
use std::hint;
use std::mem::MaybeUninit;
use std::time::{Duration, Instant};

pub(super) type ReadFn = fn(&[f64]) -> f64;

/// Runs the CPU bandwidth kernels on one buffer.
///
/// The buffer persists between write variants and reads, so that each
/// variant observes the memory state left behind by the previous one.
pub(super) struct CpuMemoryBandwidth {
    len: usize,
    buffer: Buffer,
}

impl CpuMemoryBandwidth {
    pub(super) fn new(len: usize) -> Self {
        Self {
            len,
            buffer: Buffer::uninit(len),
        }
    }

    pub(super) fn bytes(&self) -> usize {
        self.buffer.bytes()
    }

    pub(super) fn write(
        &mut self,
        variant: WriteVariant,
        thread_pool: &rayon::ThreadPool,
    ) -> Duration {
        match variant {
            WriteVariant::NoOptimization => {
                // Drop the old allocation first to avoid holding twice the memory
                self.buffer = Buffer::uninit(0);
                self.buffer = Buffer::uninit(self.len);
                time(|| fill(&mut self.buffer, 1.0, Store::Temporal, thread_pool))
            }
            WriteVariant::ZeroBeforeTiming => {
                fill(&mut self.buffer, 0.0, Store::Temporal, thread_pool);
                time(|| fill(&mut self.buffer, 1.0, Store::Temporal, thread_pool))
            }
            WriteVariant::NonTemporal => {
                fill(&mut self.buffer, 0.0, Store::NonTemporal, thread_pool);
                time(|| fill(&mut self.buffer, 1.0, Store::NonTemporal, thread_pool))
            }
        }
    }

    /// Returns the read duration and the sum of all elements.
    pub(super) fn read(
        &self,
        unroll: Unroll,
        thread_pool: &rayon::ThreadPool,
    ) -> Result<(Duration, f64)> {
        let f = read_fn(unroll)?;
        let mem = self.buffer.as_slice().ok_or_else(|| {
            ErrorKind::RuntimeError("Buffer must be written before it is read".to_string())
        })?;

        let timer = Instant::now();
        let sum = hint::black_box(read_sum(mem, f, thread_pool));
        let duration = timer.elapsed();

        Ok((duration, sum))
    }

    pub(super) fn expected_sum(&self) -> f64 {
        self.buffer.len() as f64
    }
}

fn time<F: FnOnce()>(f: F) -> Duration {
    let timer = Instant::now();
    f();
    timer.elapsed()
}

/// Splits `len` elements evenly over the workers. The first `len % threads`
/// chunks hold one extra element, and empty chunks are omitted.
fn chunk_lens(len: usize, threads: usize) -> impl Iterator<Item = usize> {
    let threads = threads.max(1);
    let (base, extra) = (len / threads, len % threads);

    (0..threads)
        .map(move |i| if i < extra { base + 1 } else { base })
        .filter(|&chunk_len| chunk_len > 0)
}

/// Fills the buffer in parallel, one contiguous chunk per worker thread.
pub(super) fn fill(buffer: &mut Buffer, value: f64, store: Store, thread_pool: &rayon::ThreadPool) {
    let threads = thread_pool.current_num_threads();
    let mut rest = buffer.as_uninit_mut_slice();

    thread_pool.scope(|s| {
        for chunk_len in chunk_lens(rest.len(), threads) {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(chunk_len);
            rest = tail;
            s.spawn(move |_| fill_chunk(chunk, value, store));
        }
    });
}

/// Sums the buffer in parallel, one contiguous chunk per worker thread.
pub(super) fn read_sum(mem: &[f64], f: ReadFn, thread_pool: &rayon::ThreadPool) -> f64 {
    let threads = thread_pool.current_num_threads();
    let chunk_lens: Vec<usize> = chunk_lens(mem.len(), threads).collect();
    let mut partial_sums = vec![0.0_f64; chunk_lens.len()];
    let mut rest = mem;

    thread_pool.scope(|s| {
        for (&chunk_len, sum) in chunk_lens.iter().zip(partial_sums.iter_mut()) {
            let (chunk, tail) = rest.split_at(chunk_len);
            rest = tail;
            s.spawn(move |_| *sum = f(chunk));
        }
    });

    partial_sums.iter().sum()
}

pub(super) fn read_fn(unroll: Unroll) -> Result<ReadFn> {
    let f: ReadFn = match unroll {
        Unroll(1) => sum_unrolled::<1>,
        Unroll(2) => sum_unrolled::<2>,
        Unroll(4) => sum_unrolled::<4>,
        Unroll(8) => sum_unrolled::<8>,
        Unroll(16) => sum_unrolled::<16>,
        Unroll(u) => {
            return Err(ErrorKind::InvalidArgument(format!(
                "Unsupported unroll factor {}, expected one of 1, 2, 4, 8, 16",
                u
            ))
            .into())
        }
    };

    Ok(f)
}

fn sum_unrolled<const U: usize>(data: &[f64]) -> f64 {
    let mut acc = [0.0_f64; U];
    let mut chunks = data.chunks_exact(U);

    for chunk in &mut chunks {
        for (a, x) in acc.iter_mut().zip(chunk) {
            *a += *x;
        }
    }

    acc.iter().sum::<f64>() + chunks.remainder().iter().sum::<f64>()
}

fn fill_chunk(chunk: &mut [MaybeUninit<f64>], value: f64, store: Store) {
    match store {
        Store::Temporal => fill_temporal(chunk, value),
        Store::NonTemporal => fill_non_temporal(chunk, value),
    }
}

fn fill_temporal(chunk: &mut [MaybeUninit<f64>], value: f64) {
    chunk.iter_mut().for_each(|x| *x = MaybeUninit::new(value));
}

/// Splits the chunk into an unaligned head, an aligned body with a length
/// that is a multiple of `lanes`, and a tail.
#[allow(dead_code)]
fn split_aligned(
    chunk: &mut [MaybeUninit<f64>],
    align_bytes: usize,
    lanes: usize,
) -> (
    &mut [MaybeUninit<f64>],
    &mut [MaybeUninit<f64>],
    &mut [MaybeUninit<f64>],
) {
    let head_len = chunk.as_ptr().align_offset(align_bytes).min(chunk.len());
    let (head, rest) = chunk.split_at_mut(head_len);
    let body_len = rest.len() - rest.len() % lanes;
    let (body, tail) = rest.split_at_mut(body_len);

    (head, body, tail)
}

#[cfg(target_arch = "x86_64")]
fn fill_non_temporal(chunk: &mut [MaybeUninit<f64>], value: f64) {
    if is_x86_feature_detected!("avx") {
        unsafe { stream_avx(chunk, value) }
    } else {
        unsafe { stream_sse2(chunk, value) }
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn fill_non_temporal(chunk: &mut [MaybeUninit<f64>], value: f64) {
    fill_temporal(chunk, value)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn stream_avx(chunk: &mut [MaybeUninit<f64>], value: f64) {
    use std::arch::x86_64::{_mm256_set1_pd, _mm256_stream_pd, _mm_sfence};

    const LANES: usize = 4;
    const ALIGN: usize = 32;

    let (head, body, tail) = split_aligned(chunk, ALIGN, LANES);
    fill_temporal(head, value);

    let v = _mm256_set1_pd(value);
    for lanes in body.chunks_exact_mut(LANES) {
        _mm256_stream_pd(lanes.as_mut_ptr() as *mut f64, v);
    }

    fill_temporal(tail, value);
    _mm_sfence();
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn stream_sse2(chunk: &mut [MaybeUninit<f64>], value: f64) {
    use std::arch::x86_64::{_mm_set1_pd, _mm_sfence, _mm_stream_pd};

    const LANES: usize = 2;
    const ALIGN: usize = 16;

    let (head, body, tail) = split_aligned(chunk, ALIGN, LANES);
    fill_temporal(head, value);

    let v = _mm_set1_pd(value);
    for lanes in body.chunks_exact_mut(LANES) {
        _mm_stream_pd(lanes.as_mut_ptr() as *mut f64, v);
    }

    fill_temporal(tail, value);
    _mm_sfence();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("Couldn't build Rayon thread pool")
    }

    #[test]
    fn unrolled_sums_match_scalar_sum() {
        let data: Vec<f64> = (0..1001).map(|x| x as f64).collect();
        let expected: f64 = data.iter().sum();

        for &u in &[1, 2, 4, 8, 16] {
            let f = read_fn(Unroll(u)).unwrap();
            assert_eq!(f(&data), expected, "unroll {}", u);
        }
    }

    #[test]
    fn unsupported_unroll_is_rejected() {
        assert!(read_fn(Unroll(3)).is_err());
        assert!(read_fn(Unroll(0)).is_err());
    }

    #[test]
    fn split_aligned_covers_chunk() {
        let mut buffer = Buffer::uninit(103);
        let chunk = &mut buffer.as_uninit_mut_slice()[1..];
        let len = chunk.len();
        let (head, body, tail) = split_aligned(chunk, 32, 4);

        assert_eq!(head.len() + body.len() + tail.len(), len);
        assert_eq!(body.len() % 4, 0);
        assert!(tail.len() < 4);
        if !body.is_empty() {
            assert_eq!(body.as_ptr() as usize % 32, 0);
        }
    }

    #[test]
    fn fill_then_read_all_stores() {
        let thread_pool = pool(3);

        for &store in &[Store::Temporal, Store::NonTemporal] {
            let mut buffer = Buffer::uninit(1027);
            fill(&mut buffer, 1.0, store, &thread_pool);

            let mem = buffer.as_slice().unwrap();
            assert!(mem.iter().all(|&x| x == 1.0), "{:?}", store);

            let sum = read_sum(mem, read_fn(Unroll(8)).unwrap(), &thread_pool);
            assert_eq!(sum, 1027.0);
        }
    }

    #[test]
    fn chunks_are_balanced_over_workers() {
        assert_eq!(chunk_lens(9, 4).collect::<Vec<_>>(), vec![3, 2, 2, 2]);
        assert_eq!(chunk_lens(8, 4).collect::<Vec<_>>(), vec![2, 2, 2, 2]);
        assert_eq!(chunk_lens(3, 8).collect::<Vec<_>>(), vec![1, 1, 1]);
        assert_eq!(chunk_lens(0, 2).count(), 0);
        assert_eq!(chunk_lens(5, 0).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn more_threads_than_elements() {
        let thread_pool = pool(8);
        let mut buffer = Buffer::uninit(3);
        fill(&mut buffer, 2.0, Store::NonTemporal, &thread_pool);

        let sum = read_sum(buffer.as_slice().unwrap(), read_fn(Unroll(2)).unwrap(), &thread_pool);
        assert_eq!(sum, 6.0);
    }

    #[test]
    fn read_before_write_fails() {
        let thread_pool = pool(1);
        let bench = CpuMemoryBandwidth::new(16);
        assert!(bench.read(Unroll(1), &thread_pool).is_err());
    }

    #[test]
    fn write_variants_leave_ones() {
        let thread_pool = pool(2);
        let mut bench = CpuMemoryBandwidth::new(4099);

        for &variant in &WriteVariant::ALL {
            bench.write(variant, &thread_pool);
            let (_, sum) = bench.read(Unroll(4), &thread_pool).unwrap();
            assert_eq!(sum, bench.expected_sum(), "{:?}", variant);
        }
    }
}
