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

//! The Weft text-buffer engine.
//!
//! Raw UTF-8 goes in; styled, grapheme-aware, width-measured, wrap-ready
//! lines come out. The layers, bottom up: byte scanners over memory
//! regions, a persistent segment rope (`weft-rope`), the text buffer with
//! highlight materialization, views that wrap logical lines into virtual
//! display lines, and an edit façade with multi-cursor operations and
//! branching undo.
//!
//! The engine is single-threaded and cooperative: one logical thread owns
//! a buffer and its views, and callers serialize mutations. Views never
//! hold a buffer reference; they are handed one per call, so teardown
//! ordering is the host's choice.

pub mod buffer;
pub mod config;
pub mod editor;
pub mod error;
pub mod highlight;
pub mod scan;
pub mod selection;
pub mod styles;
pub mod view;

pub use crate::buffer::{SelectionRange, StyledChunk, TextBuffer};
pub use crate::config::BufferConfig;
pub use crate::editor::{Cursor, Editor};
pub use crate::error::{Error, Result};
pub use crate::highlight::{Highlight, StyleSpan};
pub use crate::selection::Selection;
pub use crate::styles::{Rgba, Style, StyleId, StyleRegistry};
pub use crate::view::{View, Viewport, VirtualChunk, VirtualLine, WrapMode};

pub use weft_rope::{MarkerKind, MemId};
pub use weft_unicode::WidthMethod;
