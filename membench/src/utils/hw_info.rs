/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

use std::fmt;
#[cfg(not(target_arch = "x86_64"))]
use std::fs;

pub struct ProcessorCache {}

impl ProcessorCache {
    #[allow(non_snake_case)]
    pub fn L1D_size() -> Option<usize> {
        Self::sysconf(libc::_SC_LEVEL1_DCACHE_SIZE)
    }

    #[allow(non_snake_case)]
    pub fn L2_size() -> Option<usize> {
        Self::sysconf(libc::_SC_LEVEL2_CACHE_SIZE)
    }

    #[allow(non_snake_case)]
    pub fn L3_size() -> Option<usize> {
        Self::sysconf(libc::_SC_LEVEL3_CACHE_SIZE)
    }

    pub fn page_size() -> Option<usize> {
        Self::sysconf(libc::_SC_PAGESIZE)
    }

    // Returns -1 for unknown names and 0 when the kernel doesn't report the value
    fn sysconf(name: libc::c_int) -> Option<usize> {
        let size = unsafe { libc::sysconf(name) };
        if size > 0 {
            Some(size as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for ProcessorCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let show = |size: Option<usize>| size.map_or_else(|| "unknown".to_string(), |s| s.to_string());
        write!(
            f,
            "L1 cache size: {}, L2 cache size: {}, L3 cache size: {}, page size: {}",
            show(Self::L1D_size()),
            show(Self::L2_size()),
            show(Self::L3_size()),
            show(Self::page_size())
        )
    }
}

/// Returns the processor brand string
#[cfg(target_arch = "x86_64")]
pub fn cpu_codename() -> Option<String> {
    let cpuid = raw_cpuid::CpuId::new();
    cpuid
        .get_extended_function_info()
        .as_ref()
        .and_then(|i| i.processor_brand_string())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Returns the CPU model name reported by the kernel
#[cfg(not(target_arch = "x86_64"))]
pub fn cpu_codename() -> Option<String> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
    parse_model_name(&cpuinfo)
}

#[cfg(not(target_arch = "x86_64"))]
fn parse_model_name(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|line| {
            let mut kv = line.splitn(2, ':');
            let key = kv.next()?.trim();
            let value = kv.next()?.trim();
            match key {
                // POWER and aarch64, respectively
                "cpu" | "model name" if !value.is_empty() => Some(value.to_string()),
                _ => None,
            }
        })
        .next()
}
