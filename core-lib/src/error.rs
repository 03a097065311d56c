// Copyright 2025 The Weft Authors.
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

//! Error kinds returned across the engine. All fallible operations return
//! these; internal helpers propagate with `?` and nothing panics on bad
//! input.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An allocation-bounded resource ran out (e.g. the 256-slot memory
    /// registry).
    #[error("out of memory")]
    OutOfMemory,

    /// A row, column, or character offset is outside the document.
    #[error("invalid index {index} (limit {limit})")]
    InvalidIndex { index: usize, limit: usize },

    /// The memory id is not registered.
    #[error("invalid memory id {0}")]
    InvalidMemId(u8),

    /// Dimensions unusable for the requested operation, such as a
    /// zero-column wrap width.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(&'static str),

    /// A weighted split landed inside a non-splittable segment.
    #[error("offset falls inside a non-splittable segment")]
    OutOfBounds,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
