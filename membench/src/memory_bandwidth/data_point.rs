// Copyright 2021-2022 Clemens Lutz
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

use super::{MemoryOperation, WriteVariant};
use crate::types::*;
use serde_derive::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
pub(super) struct DataPoint {
    pub hostname: String,
    pub device_codename: Option<String>,
    pub memory_operation: Option<MemoryOperation>,
    pub write_variant: Option<WriteVariant>,
    pub unroll: Option<Unroll>,
    pub warm_up: bool,
    pub threads: Option<ThreadCount>,
    pub bytes: usize,
    pub ns: u64,
    pub megabytes_per_second: f64,
}
