/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

use std::mem::{self, MaybeUninit};

/// A buffer of `f64` that starts out without physically backed pages.
///
/// The allocation is never touched before the first `fill`, so the first
/// write to each page includes the cost of the page fault. Reading is only
/// possible after the buffer has been filled at least once.
pub(super) struct Buffer {
    mem: Vec<MaybeUninit<f64>>,
    initialized: bool,
}

impl Buffer {
    pub(super) fn uninit(len: usize) -> Self {
        let mut mem = Vec::with_capacity(len);

        // MaybeUninit doesn't require initialization
        unsafe { mem.set_len(len) };

        Self {
            mem,
            initialized: false,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.mem.len()
    }

    pub(super) fn bytes(&self) -> usize {
        self.mem.len() * mem::size_of::<f64>()
    }

    /// Hands out the memory for writing, and marks it as initialized.
    ///
    /// The caller must write every element before the next call to
    /// `as_slice`.
    pub(super) fn as_uninit_mut_slice(&mut self) -> &mut [MaybeUninit<f64>] {
        self.initialized = true;
        self.mem.as_mut_slice()
    }

    pub(super) fn as_slice(&self) -> Option<&[f64]> {
        if self.initialized {
            let slice = self.mem.as_slice();
            Some(unsafe { &*(slice as *const [MaybeUninit<f64>] as *const [f64]) })
        } else {
            None
        }
    }
}
