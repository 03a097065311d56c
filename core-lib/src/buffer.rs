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

//! The text buffer: UTF-8 bytes in, a canonical segment rope out.
//!
//! Ingestion cuts input at line terminators into `LineStart` / chunk /
//! `Break` segment streams over registered memory regions; queries read
//! the rope's aggregate info in O(1); edits are char-addressed structural
//! splices that snapshot into branching undo history. Highlights attach
//! per line and materialize lazily into style spans.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use memchr::memchr;
use smallvec::SmallVec;

use weft_rope::{
    History, MarkerKind, MemId, Segment, SegmentBuilder, SegmentInfo, SegmentLeaf, SegmentRope,
    TextChunk, FLAG_ASCII_ONLY, FLAG_HAS_TAB, MARKER_KINDS,
};
use weft_unicode::{Clusters, WidthMethod};

use crate::config::BufferConfig;
use crate::error::{Error, Result};
use crate::highlight::{Highlight, HighlightMap, StyleSpan};
use crate::scan::{self, LineBreakKind};
use crate::styles::{Rgba, Style, StyleId, StyleRegistry};

const MAX_MEM_REGIONS: usize = 256;

struct MemRegion {
    bytes: Arc<[u8]>,
    owned: bool,
}

/// Registry of byte regions referenced by chunks.
///
/// Ids are append-only: a region stays registered (and its bytes alive)
/// until `reset`, because undo history may hold ropes whose chunks still
/// reference it. Only the buffer's own scratch region is ever replaced in
/// place.
#[derive(Default)]
struct MemRegistry {
    entries: Vec<Option<MemRegion>>,
}

impl MemRegistry {
    fn register(&mut self, bytes: Arc<[u8]>, owned: bool) -> Result<MemId> {
        if self.entries.len() >= MAX_MEM_REGIONS {
            return Err(Error::OutOfMemory);
        }
        self.entries.push(Some(MemRegion { bytes, owned }));
        Ok((self.entries.len() - 1) as MemId)
    }

    /// Replace a region's bytes; silently a no-op if `id` is unregistered.
    fn replace(&mut self, id: MemId, bytes: Arc<[u8]>) {
        if let Some(slot) = self.entries.get_mut(id as usize) {
            if let Some(region) = slot {
                region.bytes = bytes;
                region.owned = true;
            }
        }
    }

    /// Grow an owned region by appending, returning the byte range of the
    /// appended data. Existing ranges stay valid: the prefix is unchanged.
    fn append(&mut self, id: MemId, extra: &[u8]) -> Option<(usize, usize)> {
        let slot = self.entries.get_mut(id as usize)?;
        let region = slot.as_mut()?;
        let start = region.bytes.len();
        let mut grown = Vec::with_capacity(start + extra.len());
        grown.extend_from_slice(&region.bytes);
        grown.extend_from_slice(extra);
        region.bytes = grown.into();
        Some((start, start + extra.len()))
    }

    fn get(&self, id: MemId) -> Option<&[u8]> {
        self.entries.get(id as usize).and_then(|slot| slot.as_ref()).map(|r| &*r.bytes)
    }

    fn reset(&mut self) {
        self.entries.clear();
    }
}

/// A resolved selection over character offsets, with optional colors for
/// the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
    pub fg: Option<Rgba>,
    pub bg: Option<Rgba>,
}

/// Input to [`TextBuffer::set_styled_text`]: one run of text with its
/// colors and attribute bits.
#[derive(Clone, Copy, Debug)]
pub struct StyledChunk<'a> {
    pub text: &'a str,
    pub fg: Option<Rgba>,
    pub bg: Option<Rgba>,
    pub attributes: u8,
}

/// Priority used for styles applied through `set_styled_text`, low enough
/// for explicit highlights to override.
pub const STYLED_TEXT_PRIORITY: u8 = 1;

#[derive(Default)]
struct MarkerCache {
    version: u64,
    offsets: [Vec<usize>; MARKER_KINDS],
}

pub struct TextBuffer {
    rope: SegmentRope,
    registry: MemRegistry,
    config: BufferConfig,
    styles: StyleRegistry,
    highlights: HighlightMap,
    history: History<SegmentInfo, SegmentLeaf>,
    selection: Option<SelectionRange>,
    /// Bumped after every mutation swaps the rope; views and caches
    /// compare against it.
    version: u64,
    /// Owned region receiving text from char-addressed inserts; grown by
    /// appending so existing chunk ranges stay valid.
    edit_mem: Option<MemId>,
    /// Owned region holding the concatenation built by `set_styled_text`;
    /// the only region ever replaced in place.
    scratch_mem: Option<MemId>,
    marker_cache: MarkerCache,
}

impl Default for TextBuffer {
    fn default() -> TextBuffer {
        TextBuffer::new()
    }
}

impl TextBuffer {
    pub fn new() -> TextBuffer {
        TextBuffer::with_config(BufferConfig::default())
    }

    pub fn with_config(config: BufferConfig) -> TextBuffer {
        TextBuffer {
            rope: SegmentRope::default(),
            registry: MemRegistry::default(),
            styles: StyleRegistry::new(),
            highlights: HighlightMap::new(),
            history: History::new(config.max_undo_depth),
            selection: None,
            version: 0,
            edit_mem: None,
            scratch_mem: None,
            marker_cache: MarkerCache::default(),
            config,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rope(&self) -> &SegmentRope {
        &self.rope
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    // ---- memory regions ----

    /// Copy `bytes` into a new owned region.
    pub fn register_memory(&mut self, bytes: &[u8]) -> Result<MemId> {
        self.registry.register(Arc::from(bytes), true)
    }

    /// Register caller-shared bytes without copying. The caller keeps the
    /// bytes alive through the `Arc`; the registry treats them as
    /// borrowed and never frees them on reset.
    pub fn register_shared_memory(&mut self, bytes: Arc<[u8]>) -> Result<MemId> {
        self.registry.register(bytes, false)
    }

    /// Replace a region's bytes. Only sound when no live rope references
    /// the region; silently a no-op for unregistered ids.
    pub fn replace_memory(&mut self, id: MemId, bytes: &[u8]) {
        self.registry.replace(id, Arc::from(bytes));
    }

    pub(crate) fn chunk_bytes(&self, chunk: &TextChunk) -> Result<&[u8]> {
        let region = self.registry.get(chunk.mem_id).ok_or(Error::InvalidMemId(chunk.mem_id))?;
        region.get(chunk.byte_start..chunk.byte_end).ok_or(Error::InvalidMemId(chunk.mem_id))
    }

    // ---- ingestion ----

    /// Replace the whole content with `bytes`.
    pub fn set_text(&mut self, bytes: &[u8]) -> Result<()> {
        let id = self.register_memory(bytes)?;
        self.set_text_from_mem_id(id)
    }

    /// Replace the whole content with an already-registered region.
    pub fn set_text_from_mem_id(&mut self, id: MemId) -> Result<()> {
        let bytes = self.registry.get(id).ok_or(Error::InvalidMemId(id))?;
        let config = self.config;
        let rope = ingest(bytes, id, 0, &config);
        debug!(
            "set_text: {} bytes -> {} lines, width {}",
            bytes.len(),
            rope.line_count(),
            rope.total_width()
        );
        self.rope = rope;
        self.bump();
        Ok(())
    }

    /// Read a file and replace the content with it. One synchronous read;
    /// the bytes land in an owned region.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = fs::read(path)?;
        let id = self.registry.register(bytes.into(), true)?;
        self.set_text_from_mem_id(id)
    }

    /// Append one line of text referencing `[start, end)` of a registered
    /// region. Streaming ingestion: no rescan of existing content.
    pub fn add_line(&mut self, id: MemId, start: usize, end: usize) -> Result<()> {
        let region = self.registry.get(id).ok_or(Error::InvalidMemId(id))?;
        if start > end || end > region.len() {
            return Err(Error::InvalidIndex { index: end, limit: region.len() });
        }
        let run = &region[start..end];
        debug_assert!(scan::first_line_break(run).is_none(), "add_line run must not contain breaks");
        let mut segments: SmallVec<[Segment; 3]> = SmallVec::new();
        if !self.rope.is_empty() {
            segments.push(Segment::Break);
        }
        segments.push(Segment::LineStart);
        if !run.is_empty() {
            segments.push(make_chunk(run, id, start, &self.config));
        }
        let len = self.rope.len();
        let insert = rope_from(segments);
        self.rope.edit(len..len, insert);
        self.bump();
        Ok(())
    }

    /// Drop the content but keep regions, styles, and highlight storage;
    /// the fast path for frequent redraws.
    pub fn clear(&mut self) {
        self.rope = SegmentRope::default();
        self.selection = None;
        self.bump();
    }

    /// Full teardown: content, regions, highlights, styles, history.
    pub fn reset(&mut self) {
        self.rope = SegmentRope::default();
        self.registry.reset();
        self.highlights.clear();
        self.styles.reset();
        self.history.clear();
        self.selection = None;
        self.edit_mem = None;
        self.scratch_mem = None;
        self.marker_cache = MarkerCache::default();
        self.bump();
    }

    /// Replace the content with styled chunks: their texts concatenate
    /// into the retained scratch region, and each chunk's style lands as
    /// a low-priority highlight over its character range.
    pub fn set_styled_text(&mut self, chunks: &[StyledChunk<'_>]) -> Result<()> {
        let mut combined = Vec::new();
        let mut char_ranges = Vec::with_capacity(chunks.len());
        let mut char_pos = 0;
        for chunk in chunks {
            combined.extend_from_slice(chunk.text.as_bytes());
            let chars = count_chars(chunk.text.as_bytes());
            char_ranges.push((char_pos, char_pos + chars));
            char_pos += chars;
        }

        let id = match self.scratch_mem {
            Some(id) => {
                // Replacing in place invalidates chunks in old snapshots,
                // so the history cannot survive.
                self.history.clear();
                self.registry.replace(id, combined.into());
                id
            }
            None => {
                let id = self.registry.register(combined.into(), true)?;
                self.scratch_mem = Some(id);
                id
            }
        };
        self.set_text_from_mem_id(id)?;
        self.clear_all_highlights();

        for (chunk, &(start, end)) in chunks.iter().zip(char_ranges.iter()) {
            let style =
                Style { fg: chunk.fg, bg: chunk.bg, attributes: chunk.attributes };
            if style.is_default() || start == end {
                continue;
            }
            let style_id = self.styles.intern(style);
            self.add_highlight_by_char_range(start, end, style_id, STYLED_TEXT_PRIORITY, 0)?;
        }
        Ok(())
    }

    // ---- queries ----

    pub fn line_count(&self) -> usize {
        self.rope.line_count()
    }

    /// Total display width in columns.
    pub fn length(&self) -> usize {
        self.rope.total_width()
    }

    /// Bytes of a plain-text serialization: chunk bytes plus one `\n` per
    /// hard break.
    pub fn byte_size(&self) -> usize {
        self.rope.total_bytes() + self.rope.info().breaks
    }

    /// Total characters (clusters plus newlines).
    pub fn char_count(&self) -> usize {
        self.rope.total_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.is_empty()
    }

    /// Copy the plain text into `buf`, returning the bytes written.
    /// Output is truncated to the buffer; use [`byte_size`](Self::byte_size)
    /// to size it.
    pub fn get_plain_text_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        let mut result = Ok(());
        self.rope.for_each_segment_from(0, |_, segment| {
            let bytes: &[u8] = match segment {
                Segment::Text(chunk) => match self.chunk_bytes(chunk) {
                    Ok(b) => b,
                    Err(e) => {
                        result = Err(e);
                        return false;
                    }
                },
                Segment::Break => b"\n",
                _ => return true,
            };
            let n = bytes.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&bytes[..n]);
            written += n;
            written < buf.len()
        });
        result.map(|_| written)
    }

    /// The whole plain text as an owned vector.
    pub fn get_plain_text(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.byte_size()];
        let written = self.get_plain_text_into(&mut buf)?;
        buf.truncate(written);
        Ok(buf)
    }

    /// Copy the selected character range's text into `buf`.
    pub fn get_selected_text_into(&self, buf: &mut [u8]) -> Result<usize> {
        let selection = match self.selection {
            Some(s) if s.start < s.end => s,
            _ => return Ok(0),
        };
        let bytes = self.char_range_bytes(selection.start, selection.end)?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    /// Plain-text bytes of the character range `[start, end)`.
    pub fn char_range_bytes(&self, start: usize, end: usize) -> Result<Vec<u8>> {
        let total = self.char_count();
        if start > end || end > total {
            return Err(Error::InvalidIndex { index: end, limit: total });
        }
        let mut out = Vec::new();
        let mut char_pos = 0;
        let mut result = Ok(());
        self.rope.for_each_segment_from(0, |_, segment| {
            let seg_chars = segment.chars();
            let seg_start = char_pos;
            char_pos += seg_chars;
            if seg_chars == 0 || char_pos <= start {
                return true;
            }
            if seg_start >= end {
                return false;
            }
            match segment {
                Segment::Break => out.push(b'\n'),
                Segment::Text(chunk) => {
                    let bytes = match self.chunk_bytes(chunk) {
                        Ok(b) => b,
                        Err(e) => {
                            result = Err(e);
                            return false;
                        }
                    };
                    let skip = start.saturating_sub(seg_start);
                    let take = (end - seg_start).min(seg_chars) - skip;
                    let (from, to) = cluster_byte_range(bytes, skip, take, &self.config);
                    out.extend_from_slice(&bytes[from..to]);
                }
                _ => {}
            }
            char_pos < end
        });
        result.map(|_| out)
    }

    // ---- line geometry ----

    fn check_line(&self, line: usize) -> Result<()> {
        let count = self.line_count();
        if line >= count {
            return Err(Error::InvalidIndex { index: line, limit: count });
        }
        Ok(())
    }

    /// The segment range `[start, end)` holding `line`'s content,
    /// excluding its sentinels.
    pub fn line_segment_range(&self, line: usize) -> Result<(usize, usize)> {
        self.check_line(line)?;
        let start = self.rope.line_content_start(line);
        let end = if line + 1 < self.line_count() {
            // The next line is preceded by its LineStart and one Break.
            self.rope.line_content_start(line + 1) - 2
        } else {
            self.rope.len()
        };
        Ok((start, end))
    }

    /// The chunks of one line, with their segment indexes.
    pub fn line_chunks(&self, line: usize) -> Result<SmallVec<[(usize, TextChunk); 4]>> {
        let (start, end) = self.line_segment_range(line)?;
        let mut chunks = SmallVec::new();
        self.rope.for_each_segment_from(start, |idx, segment| {
            if idx >= end {
                return false;
            }
            if let Segment::Text(chunk) = segment {
                chunks.push((idx, *chunk));
            }
            true
        });
        Ok(chunks)
    }

    /// Display width of one line.
    pub fn line_width(&self, line: usize) -> Result<usize> {
        let (start, end) = self.line_segment_range(line)?;
        let width = self.rope.count::<weft_rope::WidthMetric>(end)
            - self.rope.count::<weft_rope::WidthMetric>(start);
        Ok(width)
    }

    /// Character offset of the first character of `line`.
    pub fn line_char_offset(&self, line: usize) -> Result<usize> {
        self.check_line(line)?;
        let start = self.rope.line_content_start(line);
        Ok(self.rope.count::<weft_rope::CharMetric>(start))
    }

    /// Characters in `line`'s content, excluding the trailing newline.
    pub fn line_char_len(&self, line: usize) -> Result<usize> {
        let (start, end) = self.line_segment_range(line)?;
        Ok(self.rope.count::<weft_rope::CharMetric>(end)
            - self.rope.count::<weft_rope::CharMetric>(start))
    }

    /// Map `(row, col)` to a character offset; `col` beyond the line
    /// clamps to the line end. Columns map to the character whose cell
    /// range contains them.
    pub fn line_col_to_char(&self, row: usize, col: usize) -> Result<usize> {
        let (start, end) = self.line_segment_range(row)?;
        let mut char_offset = self.rope.count::<weft_rope::CharMetric>(start);
        let mut cols_left = col;
        let mut err = None;
        self.rope.for_each_segment_from(start, |idx, segment| {
            if idx >= end || cols_left == 0 {
                return false;
            }
            if let Segment::Text(chunk) = segment {
                if chunk.width as usize <= cols_left {
                    cols_left -= chunk.width as usize;
                    char_offset += chunk.clusters as usize;
                } else {
                    let bytes = match self.chunk_bytes(chunk) {
                        Ok(b) => b,
                        Err(e) => {
                            err = Some(e);
                            return false;
                        }
                    };
                    let scan = scan::find_pos_by_width(
                        bytes,
                        cols_left,
                        0,
                        self.config.tab_width,
                        self.config.width_method,
                    );
                    char_offset += scan.clusters;
                    cols_left = 0;
                    return false;
                }
            }
            true
        });
        match err {
            Some(e) => Err(e),
            None => Ok(char_offset),
        }
    }

    /// Map a character offset to `(row, col)`.
    pub fn char_to_line_col(&self, char_offset: usize) -> Result<(usize, usize)> {
        let total = self.char_count();
        if char_offset > total {
            return Err(Error::InvalidIndex { index: char_offset, limit: total });
        }
        if self.rope.is_empty() {
            return Ok((0, 0));
        }
        let (seg_index, chars_before) = self.rope.locate_char(char_offset);
        if seg_index == self.rope.len() {
            let row = self.line_count() - 1;
            let width = self.line_width(row)?;
            return Ok((row, width));
        }
        let row = self.rope.line_of_offset(seg_index);
        let (line_start, _) = self.line_segment_range(row)?;
        let mut col = self.rope.count::<weft_rope::WidthMetric>(seg_index)
            - self.rope.count::<weft_rope::WidthMetric>(line_start);
        let residual = char_offset - chars_before;
        if residual > 0 {
            let chunk = self
                .segment_at(seg_index)
                .and_then(|s| s.as_text().copied())
                .ok_or(Error::OutOfBounds)?;
            let bytes = self.chunk_bytes(&chunk)?;
            let mut clusters =
                Clusters::new(bytes, self.config.tab_width, self.config.width_method);
            for _ in 0..residual {
                if let Some(c) = clusters.next() {
                    col += c.width;
                }
            }
        }
        Ok((row, col))
    }

    fn segment_at(&self, index: usize) -> Option<Segment> {
        let mut found = None;
        self.rope.for_each_segment_from(index, |idx, segment| {
            if idx == index {
                found = Some(segment.clone());
            }
            false
        });
        found
    }

    // ---- highlights ----

    pub fn add_highlight(
        &mut self,
        line: usize,
        col_start: usize,
        col_end: usize,
        style_id: StyleId,
        priority: u8,
        hl_ref: u32,
    ) -> Result<()> {
        self.check_line(line)?;
        self.highlights.add(line, Highlight { col_start, col_end, style_id, priority, hl_ref });
        Ok(())
    }

    /// Expand a character range into per-line column highlights.
    pub fn add_highlight_by_char_range(
        &mut self,
        char_start: usize,
        char_end: usize,
        style_id: StyleId,
        priority: u8,
        hl_ref: u32,
    ) -> Result<()> {
        let total = self.char_count();
        if char_start > char_end || char_end > total {
            return Err(Error::InvalidIndex { index: char_end, limit: total });
        }
        if char_start == char_end {
            return Ok(());
        }
        let (start_row, start_col) = self.char_to_line_col(char_start)?;
        let (end_row, end_col) = self.char_to_line_col(char_end)?;
        self.add_highlight_by_coords((start_row, start_col), (end_row, end_col), style_id, priority, hl_ref)
    }

    /// Highlight from `(row, col)` to `(row, col)`, both in display
    /// columns, end exclusive.
    pub fn add_highlight_by_coords(
        &mut self,
        start: (usize, usize),
        end: (usize, usize),
        style_id: StyleId,
        priority: u8,
        hl_ref: u32,
    ) -> Result<()> {
        let (start_row, start_col) = start;
        let (end_row, end_col) = end;
        self.check_line(start_row)?;
        self.check_line(end_row)?;
        for row in start_row..=end_row {
            let width = self.line_width(row)?;
            let col_start = if row == start_row { start_col } else { 0 };
            let col_end = if row == end_row { end_col } else { width };
            self.highlights.add(
                row,
                Highlight { col_start, col_end: col_end.min(width), style_id, priority, hl_ref },
            );
        }
        Ok(())
    }

    pub fn remove_highlights_by_ref(&mut self, hl_ref: u32) {
        self.highlights.remove_by_ref(hl_ref);
    }

    pub fn clear_line_highlights(&mut self, line: usize) {
        self.highlights.clear_line(line);
    }

    pub fn clear_all_highlights(&mut self) {
        self.highlights.clear();
    }

    pub fn start_highlights_transaction(&mut self) {
        self.highlights.begin_transaction();
    }

    pub fn end_highlights_transaction(&mut self) {
        self.highlights.end_transaction();
    }

    /// The materialized style spans of `line`; empty when it has no
    /// highlights.
    pub fn get_line_spans(&mut self, line: usize) -> Result<Vec<StyleSpan>> {
        self.check_line(line)?;
        let width = self.line_width(line)?;
        Ok(self.highlights.spans(line, width).to_vec())
    }

    // ---- selection ----

    pub fn set_selection(
        &mut self,
        start: usize,
        end: usize,
        fg: Option<Rgba>,
        bg: Option<Rgba>,
    ) -> Result<()> {
        let total = self.char_count();
        if start > end || end > total {
            return Err(Error::InvalidIndex { index: end, limit: total });
        }
        self.selection = Some(SelectionRange { start, end, fg, bg });
        Ok(())
    }

    pub fn reset_selection(&mut self) {
        self.selection = None;
    }

    pub fn get_selection(&self) -> Option<SelectionRange> {
        self.selection
    }

    // ---- markers ----

    /// Insert a marker at a character offset.
    pub fn add_marker_at_char(&mut self, kind: MarkerKind, char_offset: usize) -> Result<()> {
        let total = self.char_count();
        if char_offset > total {
            return Err(Error::InvalidIndex { index: char_offset, limit: total });
        }
        self.splice_at_char(char_offset, vec![Segment::Marker(kind)])
    }

    /// Segment index of the `k`-th marker of `kind`, resolved through a
    /// flat cache rebuilt lazily when the buffer version moved.
    pub fn marker_offset(&mut self, kind: MarkerKind, k: usize) -> Option<usize> {
        if self.marker_cache.version != self.version || self.version == 0 {
            let mut offsets: [Vec<usize>; MARKER_KINDS] = Default::default();
            self.rope.for_each_segment_from(0, |idx, segment| {
                if let Segment::Marker(kind) = segment {
                    offsets[kind.index()].push(idx);
                }
                true
            });
            self.marker_cache = MarkerCache { version: self.version, offsets };
        }
        self.marker_cache.offsets[kind.index()].get(k).copied()
    }

    pub fn marker_count(&self, kind: MarkerKind) -> usize {
        self.rope.marker_count(kind)
    }

    // ---- edits ----

    /// Insert text at a character offset. Line breaks inside `text`
    /// split the line at the insertion point.
    pub fn insert_at_char(&mut self, char_offset: usize, text: &[u8]) -> Result<()> {
        let total = self.char_count();
        if char_offset > total {
            return Err(Error::InvalidIndex { index: char_offset, limit: total });
        }
        if text.is_empty() {
            return Ok(());
        }
        let edit_mem = match self.edit_mem {
            Some(id) => id,
            None => {
                let id = self.registry.register(Arc::from(&b""[..]), true)?;
                self.edit_mem = Some(id);
                id
            }
        };
        let (start, _end) = self.registry.append(edit_mem, text).ok_or(Error::OutOfMemory)?;
        let bytes = self.registry.get(edit_mem).expect("edit region registered");
        let segments = segments_for_run(&bytes[start..start + text.len()], edit_mem, start, &self.config);
        self.splice_at_char(char_offset, segments)
    }

    /// Delete the character range `[start, end)`.
    pub fn delete_char_range(&mut self, start: usize, end: usize) -> Result<()> {
        let total = self.char_count();
        if start > end || end > total {
            return Err(Error::InvalidIndex { index: end, limit: total });
        }
        if start == end {
            return Ok(());
        }

        let (start_seg, start_before) = self.rope.locate_char(start);
        let start_residual = start - start_before;
        let (end_seg, end_before) = self.rope.locate_char(end);
        let end_residual = end - end_before;

        let mut replacement: Vec<Segment> = Vec::new();
        if start_residual > 0 {
            let chunk = self
                .segment_at(start_seg)
                .and_then(|s| s.as_text().copied())
                .ok_or(Error::OutOfBounds)?;
            replacement.push(self.chunk_prefix(&chunk, start_residual)?);
        }
        let mut delete_to = end_seg;
        if end_residual > 0 {
            let chunk = self
                .segment_at(end_seg)
                .and_then(|s| s.as_text().copied())
                .ok_or(Error::OutOfBounds)?;
            replacement.push(self.chunk_suffix(&chunk, end_residual)?);
            delete_to = end_seg + 1;
        }
        let delete_from = start_seg;
        let insert = rope_from(replacement);
        self.rope.edit(delete_from..delete_to, insert);
        self.fix_head();
        self.bump();
        Ok(())
    }

    /// Splice segments in at a character offset, bisecting a chunk when
    /// the offset lands inside one.
    fn splice_at_char(&mut self, char_offset: usize, segments: Vec<Segment>) -> Result<()> {
        let (seg_index, chars_before) = self.rope.locate_char(char_offset);
        let residual = char_offset - chars_before;
        if residual == 0 {
            let insert = rope_from(segments);
            self.rope.edit(seg_index..seg_index, insert);
        } else {
            let chunk = self
                .segment_at(seg_index)
                .and_then(|s| s.as_text().copied())
                .ok_or(Error::OutOfBounds)?;
            let mut replacement = Vec::with_capacity(segments.len() + 2);
            replacement.push(self.chunk_prefix(&chunk, residual)?);
            replacement.extend(segments);
            replacement.push(self.chunk_suffix(&chunk, residual)?);
            let insert = rope_from(replacement);
            self.rope.edit(seg_index..seg_index + 1, insert);
        }
        self.fix_head();
        self.bump();
        Ok(())
    }

    /// The first `clusters` clusters of `chunk` as a new chunk.
    fn chunk_prefix(&self, chunk: &TextChunk, clusters: usize) -> Result<Segment> {
        let bytes = self.chunk_bytes(chunk)?;
        let (_, split) = cluster_byte_range(bytes, 0, clusters, &self.config);
        Ok(make_chunk(&bytes[..split], chunk.mem_id, chunk.byte_start, &self.config))
    }

    /// Everything from cluster `clusters` on, as a new chunk. Widths are
    /// remeasured, so tab stops re-anchor to the new chunk start.
    fn chunk_suffix(&self, chunk: &TextChunk, clusters: usize) -> Result<Segment> {
        let bytes = self.chunk_bytes(chunk)?;
        let (_, split) = cluster_byte_range(bytes, 0, clusters, &self.config);
        Ok(make_chunk(&bytes[split..], chunk.mem_id, chunk.byte_start + split, &self.config))
    }

    /// Restore the canonical head: a non-empty document starts with a
    /// `LineStart`.
    fn fix_head(&mut self) {
        if self.rope.is_empty() {
            return;
        }
        let needs_head = !matches!(self.segment_at(0), Some(Segment::LineStart));
        if needs_head {
            let insert = rope_from(vec![Segment::LineStart]);
            self.rope.edit(0..0, insert);
        }
    }

    // ---- undo ----

    /// Snapshot the current state with a meta tag; call before mutating.
    pub fn store_undo(&mut self, meta: impl Into<String>) {
        self.history.store_undo(&self.rope, meta);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous snapshot, returning its meta tag.
    pub fn undo(&mut self) -> Option<String> {
        let (root, meta) = self.history.undo(&self.rope)?;
        self.rope = root;
        self.bump();
        Some(meta)
    }

    /// Re-apply the most recently undone state, if still coherent.
    pub fn redo(&mut self) -> Option<String> {
        let (root, meta) = self.history.redo(&self.rope)?;
        self.rope = root;
        self.bump();
        Some(meta)
    }
}

/// Compute a chunk segment for one break-free byte run.
fn make_chunk(bytes: &[u8], mem_id: MemId, byte_start: usize, config: &BufferConfig) -> Segment {
    debug_assert!(!bytes.is_empty());
    if scan::is_ascii_only(bytes) {
        return Segment::chunk(TextChunk {
            mem_id,
            byte_start,
            byte_end: byte_start + bytes.len(),
            width: bytes.len() as u32,
            clusters: bytes.len() as u32,
            flags: FLAG_ASCII_ONLY,
        });
    }
    let mut width = 0usize;
    let mut clusters = 0u32;
    for cluster in Clusters::new(bytes, config.tab_width, config.width_method) {
        width += cluster.width;
        clusters += 1;
    }
    let flags = if memchr(b'\t', bytes).is_some() { FLAG_HAS_TAB } else { 0 };
    Segment::chunk(TextChunk {
        mem_id,
        byte_start,
        byte_end: byte_start + bytes.len(),
        width: width as u32,
        clusters,
        flags,
    })
}

/// Segment stream for inserted text: chunks cut at its line breaks, with
/// `Break` + `LineStart` pairs in between. No leading `LineStart`.
fn segments_for_run(
    bytes: &[u8],
    mem_id: MemId,
    byte_start: usize,
    config: &BufferConfig,
) -> Vec<Segment> {
    let mut breaks = Vec::new();
    scan::find_line_breaks(bytes, &mut breaks);
    let mut segments = Vec::new();
    let mut run_start = 0;
    for lb in &breaks {
        let terminator_start = match lb.kind {
            LineBreakKind::CrLf => lb.pos - 1,
            _ => lb.pos,
        };
        if terminator_start > run_start {
            segments.push(make_chunk(
                &bytes[run_start..terminator_start],
                mem_id,
                byte_start + run_start,
                config,
            ));
        }
        segments.push(Segment::Break);
        segments.push(Segment::LineStart);
        run_start = lb.pos + 1;
    }
    if run_start < bytes.len() {
        segments.push(make_chunk(&bytes[run_start..], mem_id, byte_start + run_start, config));
    }
    segments
}

/// Full-document ingestion: like [`segments_for_run`], but every line
/// (including a trailing empty one) opens with a `LineStart`.
fn ingest(bytes: &[u8], mem_id: MemId, byte_start: usize, config: &BufferConfig) -> SegmentRope {
    let mut b = SegmentBuilder::new();
    b.push(Segment::LineStart);
    for segment in segments_for_run(bytes, mem_id, byte_start, config) {
        b.push(segment);
    }
    b.build()
}

fn rope_from(segments: impl IntoIterator<Item = Segment>) -> SegmentRope {
    let mut b = SegmentBuilder::new();
    b.extend(segments);
    b.build()
}

/// Byte range of `take` clusters starting `skip` clusters in.
fn cluster_byte_range(
    bytes: &[u8],
    skip: usize,
    take: usize,
    config: &BufferConfig,
) -> (usize, usize) {
    let mut clusters = Clusters::new(bytes, config.tab_width, config.width_method);
    let mut from = 0;
    for _ in 0..skip {
        match clusters.next() {
            Some(c) => from = c.byte_end(),
            None => return (bytes.len(), bytes.len()),
        }
    }
    let mut to = from;
    for _ in 0..take {
        match clusters.next() {
            Some(c) => to = c.byte_end(),
            None => break,
        }
    }
    (from, to)
}

pub(crate) fn count_chars(bytes: &[u8]) -> usize {
    // Clusters treat each line terminator as one cluster (CRLF included),
    // matching the one-character-per-Break convention.
    Clusters::new(bytes, 1, WidthMethod::Unicode).count()
}
