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

//! A persistent rope over tagged text segments.
//!
//! The tree layer is generic: any leaf type with a monoid of aggregate
//! info can be stored, measured, and addressed by metrics. The segment
//! layer instantiates it for terminal text buffers: text chunks referencing
//! shared memory regions, line sentinels, and zero-weight markers.

pub mod history;
pub mod interval;
pub mod segment;
pub mod tree;

pub use crate::history::{History, RedoEntry, UndoRecord, DEFAULT_MAX_UNDO_DEPTH};
pub use crate::interval::{Interval, IntervalBounds};
pub use crate::segment::{
    CharMetric, LineStartMetric, MarkerKind, MarkerMetric, MemId, Segment, SegmentBuilder,
    SegmentInfo, SegmentLeaf, SegmentRope, TextChunk, WidthMetric, FLAG_ASCII_ONLY, FLAG_HAS_TAB,
    MARKER_KINDS,
};
pub use crate::tree::{BaseMetric, Cursor, CursorIter, Leaf, Metric, Node, NodeInfo, TreeBuilder};
