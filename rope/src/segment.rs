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

//! The segment model: the concrete leaf type of the text-buffer rope.
//!
//! A document is a sequence of segments. Text bytes live in external memory
//! regions and are referenced by `(mem_id, byte range)`, so a large document
//! is shared across many chunks without copies. Zero-byte sentinel segments
//! (`LineStart`, `Break`, markers) carry the line structure and any
//! auxiliary indexes, and the rope aggregates per-kind counts so all of
//! them are addressable in O(log n).

use std::fmt;

use crate::interval::Interval;
use crate::tree::{Cursor, Leaf, Metric, Node, NodeInfo, TreeBuilder};

/// Identifier of a registered memory region; the registry holds at most
/// 256 regions.
pub type MemId = u8;

/// Chunk bytes are all in `[0x20, 0x7E]`: one byte per cluster, one column
/// per byte, no tabs.
pub const FLAG_ASCII_ONLY: u8 = 1;
/// Chunk contains at least one `\t`; its width depends on the column the
/// chunk starts at, so it must not be coalesced into a preceding chunk.
pub const FLAG_HAS_TAB: u8 = 1 << 1;

const MIN_LEAF: usize = 16;
const MAX_LEAF: usize = 32;

/// A run of text bytes inside a registered memory region.
///
/// The byte range contains no `\n` or `\r`; `width` is the precomputed sum
/// of display widths of the grapheme clusters inside (tab stops measured
/// from the chunk start) and `clusters` their count. Both are additive
/// under the contiguous-range coalescing `can_merge` permits, because
/// chunks are only ever cut at cluster boundaries.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TextChunk {
    pub mem_id: MemId,
    pub byte_start: usize,
    pub byte_end: usize,
    pub width: u32,
    pub clusters: u32,
    pub flags: u8,
}

impl TextChunk {
    pub fn byte_len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    pub fn is_ascii_only(&self) -> bool {
        self.flags & FLAG_ASCII_ONLY != 0
    }

    pub fn has_tab(&self) -> bool {
        self.flags & FLAG_HAS_TAB != 0
    }
}

impl fmt::Debug for TextChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextChunk(mem {}, bytes {}..{}, width {})",
            self.mem_id, self.byte_start, self.byte_end, self.width
        )
    }
}

/// Zero-weight marker tags tracked separately by the rope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Bookmark = 0,
    Anchor = 1,
}

pub const MARKER_KINDS: usize = 2;

impl MarkerKind {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One element of the document sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// A run of text bytes; weight is its display width.
    Text(TextChunk),
    /// Start of a logical line; zero bytes. The first segment of a
    /// non-empty document is always a `LineStart`.
    LineStart,
    /// A hard line break; zero bytes, zero width. Sits between the end of
    /// one line's chunks and the next `LineStart`.
    Break,
    /// An auxiliary zero-weight marker.
    Marker(MarkerKind),
}

impl Segment {
    /// A chunk whose cluster count equals its width; suits plain ASCII,
    /// and tests.
    pub fn text(mem_id: MemId, byte_start: usize, byte_end: usize, width: u32) -> Segment {
        Segment::Text(TextChunk { mem_id, byte_start, byte_end, width, clusters: width, flags: 0 })
    }

    pub fn chunk(chunk: TextChunk) -> Segment {
        Segment::Text(chunk)
    }

    pub fn text_with_flags(
        mem_id: MemId,
        byte_start: usize,
        byte_end: usize,
        width: u32,
        flags: u8,
    ) -> Segment {
        Segment::Text(TextChunk { mem_id, byte_start, byte_end, width, clusters: width, flags })
    }

    /// Display width in columns.
    pub fn width(&self) -> usize {
        match self {
            Segment::Text(chunk) => chunk.width as usize,
            _ => 0,
        }
    }

    /// Length in characters (grapheme clusters); a hard break reads back
    /// as one newline character.
    pub fn chars(&self) -> usize {
        match self {
            Segment::Text(chunk) => chunk.clusters as usize,
            Segment::Break => 1,
            _ => 0,
        }
    }

    /// Referenced bytes.
    pub fn bytes(&self) -> usize {
        match self {
            Segment::Text(chunk) => chunk.byte_len(),
            _ => 0,
        }
    }

    pub fn as_text(&self) -> Option<&TextChunk> {
        match self {
            Segment::Text(chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn is_line_start(&self) -> bool {
        matches!(self, Segment::LineStart)
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Segment::Break)
    }

    /// Whether `other` can be absorbed into `self`: contiguous text in the
    /// same region, and the right side's width does not depend on its
    /// starting column.
    pub fn can_merge(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Text(a), Segment::Text(b)) => {
                a.mem_id == b.mem_id && a.byte_end == b.byte_start && !b.has_tab()
            }
            _ => false,
        }
    }

    fn merge_in_place(&mut self, other: &Segment) {
        debug_assert!(self.can_merge(other));
        if let (Segment::Text(a), Segment::Text(b)) = (self, other) {
            a.byte_end = b.byte_end;
            a.width += b.width;
            a.clusters += b.clusters;
            let ascii = a.flags & b.flags & FLAG_ASCII_ONLY;
            a.flags = (a.flags & FLAG_HAS_TAB) | ascii;
        }
    }
}

/// Aggregate metrics of a segment run.
#[derive(Clone, Debug)]
pub struct SegmentInfo {
    /// Total display width of text chunks.
    pub width: usize,
    /// Total referenced bytes.
    pub bytes: usize,
    /// Total characters: chunk clusters plus one per hard break.
    pub chars: usize,
    /// Number of `LineStart` segments.
    pub line_starts: usize,
    /// Number of `Break` segments.
    pub breaks: usize,
    /// Per-kind marker counts.
    pub markers: [usize; MARKER_KINDS],
}

impl NodeInfo<SegmentLeaf> for SegmentInfo {
    fn accumulate(&mut self, other: &Self) {
        self.width += other.width;
        self.bytes += other.bytes;
        self.chars += other.chars;
        self.line_starts += other.line_starts;
        self.breaks += other.breaks;
        for (a, b) in self.markers.iter_mut().zip(other.markers.iter()) {
            *a += b;
        }
    }

    fn compute_info(leaf: &SegmentLeaf) -> SegmentInfo {
        let mut info = SegmentInfo {
            width: 0,
            bytes: 0,
            chars: 0,
            line_starts: 0,
            breaks: 0,
            markers: [0; MARKER_KINDS],
        };
        for segment in &leaf.segments {
            match segment {
                Segment::Text(chunk) => {
                    info.width += chunk.width as usize;
                    info.bytes += chunk.byte_len();
                    info.chars += chunk.clusters as usize;
                }
                Segment::LineStart => info.line_starts += 1,
                Segment::Break => {
                    info.breaks += 1;
                    info.chars += 1;
                }
                Segment::Marker(kind) => info.markers[kind.index()] += 1,
            }
        }
        info
    }
}

/// A bounded run of segments; the leaf type of the text-buffer rope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentLeaf {
    segments: Vec<Segment>,
}

impl SegmentLeaf {
    pub fn from_segments(segments: Vec<Segment>) -> SegmentLeaf {
        SegmentLeaf { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Leaf for SegmentLeaf {
    fn len(&self) -> usize {
        self.segments.len()
    }

    fn is_ok_child(&self) -> bool {
        self.segments.len() >= MIN_LEAF
    }

    fn push_maybe_split(&mut self, other: &SegmentLeaf, iv: Interval) -> Option<SegmentLeaf> {
        let (start, end) = iv.start_end();
        for segment in &other.segments[start..end] {
            match self.segments.last_mut() {
                Some(last) if last.can_merge(segment) => last.merge_in_place(segment),
                _ => self.segments.push(segment.clone()),
            }
        }

        if self.segments.len() <= MAX_LEAF {
            None
        } else {
            let splitpoint = self.segments.len() / 2;
            let right = self.segments.split_off(splitpoint);
            Some(SegmentLeaf { segments: right })
        }
    }
}

/// The text-buffer rope: a persistent tree of segment runs.
pub type SegmentRope = Node<SegmentInfo, SegmentLeaf>;

/// Measures display width. Boundaries sit after segments of nonzero width,
/// so iteration visits every column-advancing position.
#[derive(Copy, Clone)]
pub struct WidthMetric(());

impl Metric<SegmentInfo, SegmentLeaf> for WidthMetric {
    fn measure(info: &SegmentInfo, _: usize) -> usize {
        info.width
    }

    fn to_base_units(l: &SegmentLeaf, in_measured_units: usize) -> usize {
        let mut width = 0;
        for (i, segment) in l.segments.iter().enumerate() {
            if width >= in_measured_units {
                return i;
            }
            width += segment.width();
        }
        l.segments.len()
    }

    fn from_base_units(l: &SegmentLeaf, in_base_units: usize) -> usize {
        l.segments[..in_base_units].iter().map(Segment::width).sum()
    }

    fn is_boundary(l: &SegmentLeaf, offset: usize) -> bool {
        offset > 0 && l.segments[offset - 1].width() > 0
    }

    fn prev(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (1..offset).rev().find(|&i| l.segments[i - 1].width() > 0)
    }

    fn next(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (offset + 1..=l.segments.len()).find(|&i| l.segments[i - 1].width() > 0)
    }

    fn can_fragment() -> bool {
        true
    }
}

/// Counts `LineStart` segments. A boundary sits immediately after each
/// `LineStart`, i.e. at the first content position of the line, matching
/// the newline convention of byte-oriented ropes.
#[derive(Copy, Clone)]
pub struct LineStartMetric(());

impl Metric<SegmentInfo, SegmentLeaf> for LineStartMetric {
    fn measure(info: &SegmentInfo, _: usize) -> usize {
        info.line_starts
    }

    fn to_base_units(l: &SegmentLeaf, in_measured_units: usize) -> usize {
        if in_measured_units == 0 {
            return 0;
        }
        let mut seen = 0;
        for (i, segment) in l.segments.iter().enumerate() {
            if segment.is_line_start() {
                seen += 1;
                if seen == in_measured_units {
                    return i + 1;
                }
            }
        }
        l.segments.len() + 1
    }

    fn from_base_units(l: &SegmentLeaf, in_base_units: usize) -> usize {
        l.segments[..in_base_units].iter().filter(|s| s.is_line_start()).count()
    }

    fn is_boundary(l: &SegmentLeaf, offset: usize) -> bool {
        offset > 0 && l.segments[offset - 1].is_line_start()
    }

    fn prev(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (1..offset).rev().find(|&i| l.segments[i - 1].is_line_start())
    }

    fn next(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (offset + 1..=l.segments.len()).find(|&i| l.segments[i - 1].is_line_start())
    }

    fn can_fragment() -> bool {
        true
    }
}

/// Measures characters: grapheme clusters of text chunks plus one per
/// hard break. Boundaries sit after segments that carry characters.
#[derive(Copy, Clone)]
pub struct CharMetric(());

impl Metric<SegmentInfo, SegmentLeaf> for CharMetric {
    fn measure(info: &SegmentInfo, _: usize) -> usize {
        info.chars
    }

    fn to_base_units(l: &SegmentLeaf, in_measured_units: usize) -> usize {
        let mut chars = 0;
        for (i, segment) in l.segments.iter().enumerate() {
            if chars >= in_measured_units {
                return i;
            }
            chars += segment.chars();
        }
        l.segments.len()
    }

    fn from_base_units(l: &SegmentLeaf, in_base_units: usize) -> usize {
        l.segments[..in_base_units].iter().map(Segment::chars).sum()
    }

    fn is_boundary(l: &SegmentLeaf, offset: usize) -> bool {
        offset > 0 && l.segments[offset - 1].chars() > 0
    }

    fn prev(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (1..offset).rev().find(|&i| l.segments[i - 1].chars() > 0)
    }

    fn next(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (offset + 1..=l.segments.len()).find(|&i| l.segments[i - 1].chars() > 0)
    }

    fn can_fragment() -> bool {
        true
    }
}

/// Counts markers of one kind; boundary immediately after each marker.
#[derive(Copy, Clone)]
pub struct MarkerMetric<const K: usize>(());

impl<const K: usize> Metric<SegmentInfo, SegmentLeaf> for MarkerMetric<K> {
    fn measure(info: &SegmentInfo, _: usize) -> usize {
        info.markers[K]
    }

    fn to_base_units(l: &SegmentLeaf, in_measured_units: usize) -> usize {
        if in_measured_units == 0 {
            return 0;
        }
        let mut seen = 0;
        for (i, segment) in l.segments.iter().enumerate() {
            if matches!(segment, Segment::Marker(kind) if kind.index() == K) {
                seen += 1;
                if seen == in_measured_units {
                    return i + 1;
                }
            }
        }
        l.segments.len() + 1
    }

    fn from_base_units(l: &SegmentLeaf, in_base_units: usize) -> usize {
        l.segments[..in_base_units]
            .iter()
            .filter(|s| matches!(s, Segment::Marker(kind) if kind.index() == K))
            .count()
    }

    fn is_boundary(l: &SegmentLeaf, offset: usize) -> bool {
        offset > 0 && matches!(&l.segments[offset - 1], Segment::Marker(kind) if kind.index() == K)
    }

    fn prev(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (1..offset)
            .rev()
            .find(|&i| matches!(&l.segments[i - 1], Segment::Marker(kind) if kind.index() == K))
    }

    fn next(l: &SegmentLeaf, offset: usize) -> Option<usize> {
        (offset + 1..=l.segments.len())
            .find(|&i| matches!(&l.segments[i - 1], Segment::Marker(kind) if kind.index() == K))
    }

    fn can_fragment() -> bool {
        true
    }
}

// Domain shims over the generic tree, mirroring how a byte rope exposes
// line helpers over its lines metric.

impl SegmentRope {
    /// Number of logical lines (`LineStart` segments).
    pub fn line_count(&self) -> usize {
        self.measure::<LineStartMetric>()
    }

    /// Total display width of all chunks.
    pub fn total_width(&self) -> usize {
        self.info().width
    }

    /// Total bytes referenced by all chunks.
    pub fn total_bytes(&self) -> usize {
        self.info().bytes
    }

    /// Total characters (clusters plus newlines).
    pub fn total_chars(&self) -> usize {
        self.info().chars
    }

    pub fn marker_count(&self, kind: MarkerKind) -> usize {
        self.info().markers[kind.index()]
    }

    /// Locate the character at `char_offset`: the index of the segment
    /// containing (or starting at) it, and how many characters precede
    /// that segment. `char_offset == total_chars` locates the end.
    pub fn locate_char(&self, char_offset: usize) -> (usize, usize) {
        if char_offset >= self.total_chars() {
            return (self.len(), self.total_chars());
        }
        let seg_index = self.count_base_units::<CharMetric>(char_offset + 1) - 1;
        let chars_before = self.count::<CharMetric>(seg_index);
        (seg_index, chars_before)
    }

    /// Segment index of the first content segment of line `line` (the
    /// position just after its `LineStart`).
    pub fn line_content_start(&self, line: usize) -> usize {
        debug_assert!(line < self.line_count());
        self.count_base_units::<LineStartMetric>(line + 1)
    }

    /// The logical line containing the segment at `offset`.
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.count::<LineStartMetric>(offset).saturating_sub(1)
    }

    /// Walk segments in order starting at `from`, with their indexes,
    /// until `f` returns `false` or the sequence ends.
    pub fn for_each_segment_from<F>(&self, from: usize, mut f: F)
    where
        F: FnMut(usize, &Segment) -> bool,
    {
        let mut cursor = Cursor::new(self, from);
        loop {
            let (leaf, offset_in_leaf) = match cursor.get_leaf() {
                Some(x) => x,
                None => return,
            };
            let leaf_start = cursor.pos() - offset_in_leaf;
            for (i, segment) in leaf.segments[offset_in_leaf..].iter().enumerate() {
                if !f(leaf_start + offset_in_leaf + i, segment) {
                    return;
                }
            }
            if cursor.next_leaf().is_none() {
                return;
            }
        }
    }

    /// Collect every segment; test and diagnostic helper.
    pub fn to_segments(&self) -> Vec<Segment> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each_segment_from(0, |_, segment| {
            out.push(segment.clone());
            true
        });
        out
    }
}

/// Streaming constructor of segment ropes; coalesces mergeable chunks at
/// the seam as it goes, producing a balanced tree in one pass.
pub struct SegmentBuilder {
    b: TreeBuilder<SegmentInfo, SegmentLeaf>,
    leaf: SegmentLeaf,
}

impl Default for SegmentBuilder {
    fn default() -> SegmentBuilder {
        SegmentBuilder { b: TreeBuilder::new(), leaf: SegmentLeaf::default() }
    }
}

impl SegmentBuilder {
    pub fn new() -> SegmentBuilder {
        SegmentBuilder::default()
    }

    pub fn push(&mut self, segment: Segment) {
        if let Some(last) = self.leaf.segments.last_mut() {
            if last.can_merge(&segment) {
                last.merge_in_place(&segment);
                return;
            }
        }
        if self.leaf.segments.len() == MAX_LEAF {
            let leaf = std::mem::take(&mut self.leaf);
            self.b.push_leaf(leaf);
        }
        self.leaf.segments.push(segment);
    }

    pub fn extend(&mut self, segments: impl IntoIterator<Item = Segment>) {
        for segment in segments {
            self.push(segment);
        }
    }

    pub fn build(mut self) -> SegmentRope {
        if !self.leaf.segments.is_empty() {
            self.b.push_leaf(self.leaf);
        }
        self.b.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_chunk(mem_id: MemId, start: usize, end: usize) -> Segment {
        Segment::text_with_flags(mem_id, start, end, (end - start) as u32, FLAG_ASCII_ONLY)
    }

    fn build_lines(n: usize, width: usize) -> SegmentRope {
        let mut b = SegmentBuilder::new();
        for i in 0..n {
            if i > 0 {
                b.push(Segment::Break);
            }
            b.push(Segment::LineStart);
            b.push(ascii_chunk(0, i * width, i * width + width));
        }
        b.build()
    }

    #[test]
    fn info_aggregates() {
        let rope = build_lines(10, 7);
        assert_eq!(rope.line_count(), 10);
        assert_eq!(rope.total_width(), 70);
        assert_eq!(rope.total_bytes(), 70);
        assert_eq!(rope.info().breaks, 9);
    }

    #[test]
    fn builder_coalesces_contiguous_chunks() {
        let mut b = SegmentBuilder::new();
        b.push(Segment::LineStart);
        b.push(ascii_chunk(3, 0, 5));
        b.push(ascii_chunk(3, 5, 9));
        let rope = b.build();
        let segments = rope.to_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], ascii_chunk(3, 0, 9));
    }

    #[test]
    fn builder_keeps_discontiguous_chunks() {
        let mut b = SegmentBuilder::new();
        b.push(Segment::LineStart);
        b.push(ascii_chunk(3, 0, 5));
        b.push(ascii_chunk(3, 7, 9));
        b.push(ascii_chunk(4, 9, 12));
        assert_eq!(b.build().to_segments().len(), 4);
    }

    #[test]
    fn tab_chunk_is_not_absorbed() {
        let left = Segment::text_with_flags(0, 0, 3, 3, FLAG_ASCII_ONLY);
        let right = Segment::text_with_flags(0, 3, 5, 6, FLAG_HAS_TAB);
        assert!(!left.can_merge(&right));
        // The tabbed chunk may still absorb a following plain run.
        let after = Segment::text_with_flags(0, 5, 8, 3, FLAG_ASCII_ONLY);
        assert!(right.can_merge(&after));
    }

    #[test]
    fn line_content_start_and_line_of_offset() {
        let rope = build_lines(5, 4);
        // Layout per line: [Break,] LineStart, chunk.
        assert_eq!(rope.line_content_start(0), 1);
        assert_eq!(rope.line_content_start(1), 4);
        assert_eq!(rope.line_content_start(4), 13);
        assert_eq!(rope.line_of_offset(1), 0);
        assert_eq!(rope.line_of_offset(2), 0);
        assert_eq!(rope.line_of_offset(4), 1);
        assert_eq!(rope.line_of_offset(rope.len()), 4);
    }

    #[test]
    fn marker_counts_and_lookup() {
        let mut b = SegmentBuilder::new();
        b.push(Segment::LineStart);
        b.push(ascii_chunk(0, 0, 3));
        b.push(Segment::Marker(MarkerKind::Bookmark));
        b.push(ascii_chunk(0, 4, 8));
        b.push(Segment::Marker(MarkerKind::Anchor));
        b.push(Segment::Marker(MarkerKind::Bookmark));
        let rope = b.build();
        assert_eq!(rope.marker_count(MarkerKind::Bookmark), 2);
        assert_eq!(rope.marker_count(MarkerKind::Anchor), 1);
        const BOOKMARK: usize = MarkerKind::Bookmark as usize;
        assert_eq!(rope.count_base_units::<MarkerMetric<BOOKMARK>>(1), 3);
        assert_eq!(rope.count_base_units::<MarkerMetric<BOOKMARK>>(2), 6);
    }

    #[test]
    fn width_metric_conversions() {
        let rope = build_lines(3, 5);
        // Widths: line i contributes 5 columns after its sentinels.
        assert_eq!(rope.count_base_units::<WidthMetric>(5), 2);
        assert_eq!(rope.count::<WidthMetric>(2), 5);
        assert_eq!(rope.count::<WidthMetric>(rope.len()), 15);
    }

    #[test]
    fn subseq_width_splits_nothing() {
        let rope = build_lines(4, 3);
        let left = rope.subseq(0..5);
        let right = rope.subseq(5..rope.len());
        assert_eq!(left.total_width() + right.total_width(), rope.total_width());
        assert_eq!(left.len() + right.len(), rope.len());
    }

    #[test]
    fn edit_preserves_counts() {
        let mut rope = build_lines(6, 2);
        let before_lines = rope.line_count();
        // Delete one full line (Break, LineStart, chunk).
        let start = rope.line_content_start(2) - 2;
        rope.edit(start..start + 3, SegmentRope::default());
        assert_eq!(rope.line_count(), before_lines - 1);
    }

    #[test]
    fn leaf_split_respects_bounds() {
        let mut leaf = SegmentLeaf::default();
        let segments: Vec<Segment> =
            (0..MAX_LEAF + 4).map(|i| ascii_chunk(0, i * 10, i * 10 + 3)).collect();
        let other = SegmentLeaf::from_segments(segments);
        let split = leaf.push_maybe_split(&other, Interval::new(0, other.len()));
        let right = split.expect("must split");
        assert!(leaf.len() >= MIN_LEAF);
        assert!(right.len() >= MIN_LEAF);
        assert_eq!(leaf.len() + right.len(), MAX_LEAF + 4);
    }
}
