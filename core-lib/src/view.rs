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

//! Views: wrapping logical lines into virtual display lines.
//!
//! A view owns the wrap settings (mode and width) and a cache of virtual
//! lines, rebuilt whenever the buffer version or the settings move. It
//! holds no reference to the buffer; callers pass it in, which keeps
//! teardown ordering trivial and lets several views share one buffer.

use log::debug;

use weft_rope::{MemId, TextChunk};
use weft_unicode::Clusters;

use crate::buffer::TextBuffer;
use crate::error::{Error, Result};
use crate::scan;

/// How lines wrap to the view width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    None,
    Char,
    Word,
}

/// The visible region, in cells. `x` is honored by the renderer, not by
/// the view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// A slice of one source chunk placed on a virtual line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualChunk {
    /// Segment index of the source chunk in the buffer rope.
    pub chunk_ref: usize,
    pub mem_id: MemId,
    /// Absolute byte range within the memory region.
    pub byte_start: usize,
    pub byte_end: usize,
    /// Cluster range within the source chunk.
    pub char_start: usize,
    pub char_count: usize,
    pub width: usize,
}

/// One wrapped display line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VirtualLine {
    pub source_line: usize,
    /// Column offset of this virtual line within its source line.
    pub source_col_offset: usize,
    /// Character offset of this virtual line within its source line.
    pub source_char_offset: usize,
    pub width: usize,
    pub chunks: Vec<VirtualChunk>,
}

/// One grapheme cluster of a line, flattened for wrapping.
struct ClusterRef {
    chunk_ref: usize,
    mem_id: MemId,
    byte_start: usize,
    byte_len: usize,
    /// Cluster index within its chunk.
    chunk_char: usize,
    width: usize,
    /// Whether a wrapped line may begin right after this cluster.
    wrap_after: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BuildStamp {
    version: u64,
    mode: WrapMode,
    wrap_width: Option<usize>,
    viewport_width: usize,
}

pub struct View {
    wrap_mode: WrapMode,
    wrap_width: Option<usize>,
    viewport: Viewport,
    lines: Vec<VirtualLine>,
    /// Global character offset of each virtual line start.
    line_starts: Vec<usize>,
    line_widths: Vec<usize>,
    max_width: usize,
    /// First virtual line of each source line.
    first_vline: Vec<usize>,
    built: Option<BuildStamp>,
}

impl Default for View {
    fn default() -> View {
        View::new()
    }
}

impl View {
    pub fn new() -> View {
        View {
            wrap_mode: WrapMode::None,
            wrap_width: None,
            viewport: Viewport::default(),
            lines: Vec::new(),
            line_starts: Vec::new(),
            line_widths: Vec::new(),
            max_width: 0,
            first_vline: Vec::new(),
            built: None,
        }
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    pub fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    /// An explicit wrap width; `None` slaves wrapping to the viewport
    /// width.
    pub fn set_wrap_width(&mut self, width: Option<usize>) -> Result<()> {
        if width == Some(0) {
            return Err(Error::InvalidDimensions("wrap width must be nonzero"));
        }
        self.wrap_width = width;
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn effective_wrap_width(&self) -> Result<Option<usize>> {
        if self.wrap_mode == WrapMode::None {
            return Ok(None);
        }
        match self.wrap_width.or(Some(self.viewport.width)) {
            Some(0) => Err(Error::InvalidDimensions("wrapping requires a nonzero width")),
            w => Ok(w),
        }
    }

    fn stamp(&self, buffer: &TextBuffer) -> BuildStamp {
        BuildStamp {
            version: buffer.version(),
            mode: self.wrap_mode,
            wrap_width: self.wrap_width,
            viewport_width: self.viewport.width,
        }
    }

    /// Rebuild the virtual-line cache if the buffer or settings moved.
    pub fn rebuild(&mut self, buffer: &TextBuffer) -> Result<()> {
        let stamp = self.stamp(buffer);
        if self.built == Some(stamp) {
            return Ok(());
        }
        let wrap_width = self.effective_wrap_width()?;

        self.lines.clear();
        self.line_starts.clear();
        self.line_widths.clear();
        self.first_vline.clear();
        self.max_width = 0;

        for line in 0..buffer.line_count() {
            self.first_vline.push(self.lines.len());
            let line_char_offset = buffer.line_char_offset(line)?;
            match wrap_width {
                None => self.emit_unwrapped(buffer, line)?,
                Some(width) => self.emit_wrapped(buffer, line, width)?,
            }
            // Fill the flat caches for the virtual lines just added.
            for vline in &self.lines[*self.first_vline.last().unwrap()..] {
                self.line_starts.push(line_char_offset + vline.source_char_offset);
                self.line_widths.push(vline.width);
                self.max_width = self.max_width.max(vline.width);
            }
        }
        debug!(
            "view rebuild: {} source lines -> {} virtual lines (mode {:?}, width {:?})",
            buffer.line_count(),
            self.lines.len(),
            self.wrap_mode,
            wrap_width,
        );
        self.built = Some(stamp);
        Ok(())
    }

    fn emit_unwrapped(&mut self, buffer: &TextBuffer, line: usize) -> Result<()> {
        let mut vline = VirtualLine { source_line: line, ..VirtualLine::default() };
        for (chunk_ref, chunk) in buffer.line_chunks(line)? {
            vline.chunks.push(VirtualChunk {
                chunk_ref,
                mem_id: chunk.mem_id,
                byte_start: chunk.byte_start,
                byte_end: chunk.byte_end,
                char_start: 0,
                char_count: chunk.clusters as usize,
                width: chunk.width as usize,
            });
            vline.width += chunk.width as usize;
        }
        self.lines.push(vline);
        Ok(())
    }

    fn emit_wrapped(&mut self, buffer: &TextBuffer, line: usize, wrap_width: usize) -> Result<()> {
        let clusters = line_clusters(buffer, line)?;
        if clusters.is_empty() {
            self.lines.push(VirtualLine { source_line: line, ..VirtualLine::default() });
            return Ok(());
        }

        let mut start = 0;
        let mut col_offset = 0;
        let mut char_offset = 0;
        while start < clusters.len() {
            let take = match self.wrap_mode {
                WrapMode::Word => fit_words(&clusters[start..], wrap_width),
                _ => fit_clusters(&clusters[start..], wrap_width),
            };
            debug_assert!(take > 0);
            let end = start + take;
            let vline = assemble_vline(&clusters[start..end], line, col_offset, char_offset);
            col_offset += vline.width;
            char_offset += take;
            self.lines.push(vline);
            start = end;
        }
        Ok(())
    }

    /// All virtual lines, rebuilding first if stale.
    pub fn get_virtual_lines(&mut self, buffer: &TextBuffer) -> Result<&[VirtualLine]> {
        self.rebuild(buffer)?;
        Ok(&self.lines)
    }

    /// The virtual lines intersecting the viewport rows `[y, y+height)`.
    pub fn get_viewport_lines(&mut self, buffer: &TextBuffer) -> Result<&[VirtualLine]> {
        self.rebuild(buffer)?;
        let from = self.viewport.y.min(self.lines.len());
        let to = (self.viewport.y + self.viewport.height).min(self.lines.len());
        Ok(&self.lines[from..to])
    }

    /// The flat caches: virtual-line start character offsets, widths, and
    /// the maximum width.
    pub fn cached_line_info(&mut self, buffer: &TextBuffer) -> Result<(&[usize], &[usize], usize)> {
        self.rebuild(buffer)?;
        Ok((&self.line_starts, &self.line_widths, self.max_width))
    }

    /// Index of the virtual line showing `(row, col)` of the source text.
    pub fn find_visual_line_index(
        &mut self,
        buffer: &TextBuffer,
        row: usize,
        col: usize,
    ) -> Result<usize> {
        self.rebuild(buffer)?;
        let count = buffer.line_count();
        if row >= count {
            return Err(Error::InvalidIndex { index: row, limit: count });
        }
        let first = self.first_vline[row];
        let end = self.first_vline.get(row + 1).copied().unwrap_or(self.lines.len());
        for idx in first..end {
            let vline = &self.lines[idx];
            if col <= vline.source_col_offset + vline.width || idx + 1 == end {
                return Ok(idx);
            }
        }
        Ok(first)
    }

    /// Map a logical `(row, col)` to visual `(vrow, vcol)`.
    pub fn logical_to_visual(
        &mut self,
        buffer: &TextBuffer,
        row: usize,
        col: usize,
    ) -> Result<(usize, usize)> {
        let idx = self.find_visual_line_index(buffer, row, col)?;
        let vline = &self.lines[idx];
        Ok((idx, col.saturating_sub(vline.source_col_offset)))
    }

    /// Map a visual `(vrow, vcol)` back to logical `(row, col)`; both
    /// coordinates clamp into range.
    pub fn visual_to_logical(
        &mut self,
        buffer: &TextBuffer,
        vrow: usize,
        vcol: usize,
    ) -> Result<(usize, usize)> {
        self.rebuild(buffer)?;
        if self.lines.is_empty() {
            return Ok((0, 0));
        }
        let vline = &self.lines[vrow.min(self.lines.len() - 1)];
        Ok((vline.source_line, vline.source_col_offset + vcol.min(vline.width)))
    }

    /// Resolve a visual anchor/focus pair into the buffer's selection.
    /// Returns whether the resolved character range changed.
    pub fn set_local_selection(
        &mut self,
        buffer: &mut TextBuffer,
        anchor: (usize, usize),
        focus: (usize, usize),
        fg: Option<crate::styles::Rgba>,
        bg: Option<crate::styles::Rgba>,
    ) -> Result<bool> {
        // (x, y) order: column first, matching screen coordinates.
        let (arow, acol) = self.visual_to_logical(buffer, anchor.1, anchor.0)?;
        let (frow, fcol) = self.visual_to_logical(buffer, focus.1, focus.0)?;
        let a = buffer.line_col_to_char(arow, acol)?;
        let f = buffer.line_col_to_char(frow, fcol)?;
        let (start, end) = if a <= f { (a, f) } else { (f, a) };
        let before = buffer.get_selection().map(|s| (s.start, s.end));
        if start == end {
            buffer.reset_selection();
        } else {
            buffer.set_selection(start, end, fg, bg)?;
        }
        let after = buffer.get_selection().map(|s| (s.start, s.end));
        Ok(before != after)
    }
}

/// Flatten one line into cluster references with wrap-point flags.
fn line_clusters(buffer: &TextBuffer, line: usize) -> Result<Vec<ClusterRef>> {
    let config = buffer.config();
    let mut out = Vec::new();
    for (chunk_ref, chunk) in buffer.line_chunks(line)? {
        let bytes = buffer.chunk_bytes(&chunk)?;
        push_chunk_clusters(&mut out, chunk_ref, &chunk, bytes, config.tab_width, config.width_method);
    }
    Ok(out)
}

fn push_chunk_clusters(
    out: &mut Vec<ClusterRef>,
    chunk_ref: usize,
    chunk: &TextChunk,
    bytes: &[u8],
    tab_width: usize,
    method: weft_unicode::WidthMethod,
) {
    for (chunk_char, cluster) in Clusters::new(bytes, tab_width, method).enumerate() {
        let cluster_bytes = &bytes[cluster.byte_start..cluster.byte_end()];
        out.push(ClusterRef {
            chunk_ref,
            mem_id: chunk.mem_id,
            byte_start: chunk.byte_start + cluster.byte_start,
            byte_len: cluster.byte_len,
            chunk_char,
            width: cluster.width,
            wrap_after: scan::is_wrap_point(cluster_bytes),
        });
    }
}

/// Greedy cluster fit: as many clusters as stay within `wrap_width`,
/// never splitting one; a leading cluster wider than the whole width is
/// placed alone.
fn fit_clusters(clusters: &[ClusterRef], wrap_width: usize) -> usize {
    let mut width = 0;
    let mut take = 0;
    for cluster in clusters {
        if take > 0 && width + cluster.width > wrap_width {
            break;
        }
        width += cluster.width;
        take += 1;
        if width >= wrap_width {
            break;
        }
    }
    take.max(1)
}

/// Greedy word fit: whole words (runs ending just after a wrap point)
/// while they stay within `wrap_width`; a single word wider than the
/// width falls back to the cluster fit.
fn fit_words(clusters: &[ClusterRef], wrap_width: usize) -> usize {
    let mut width = 0;
    let mut take = 0;
    let mut word_start = 0;
    while word_start < clusters.len() {
        let mut word_end = word_start;
        let mut word_width = 0;
        loop {
            word_width += clusters[word_end].width;
            word_end += 1;
            if word_end == clusters.len() || clusters[word_end - 1].wrap_after {
                break;
            }
        }
        if width + word_width > wrap_width {
            if take == 0 {
                // Single-word overflow: cut inside the word.
                return fit_clusters(clusters, wrap_width);
            }
            break;
        }
        width += word_width;
        take = word_end;
        if width >= wrap_width {
            break;
        }
        word_start = word_end;
    }
    take.max(1)
}

/// Group a cluster run into per-chunk virtual chunks.
fn assemble_vline(
    clusters: &[ClusterRef],
    source_line: usize,
    source_col_offset: usize,
    source_char_offset: usize,
) -> VirtualLine {
    let mut vline = VirtualLine {
        source_line,
        source_col_offset,
        source_char_offset,
        ..VirtualLine::default()
    };
    for cluster in clusters {
        vline.width += cluster.width;
        if let Some(last) = vline.chunks.last_mut() {
            if last.chunk_ref == cluster.chunk_ref {
                last.byte_end = cluster.byte_start + cluster.byte_len;
                last.char_count += 1;
                last.width += cluster.width;
                continue;
            }
        }
        vline.chunks.push(VirtualChunk {
            chunk_ref: cluster.chunk_ref,
            mem_id: cluster.mem_id,
            byte_start: cluster.byte_start,
            byte_end: cluster.byte_start + cluster.byte_len,
            char_start: cluster.chunk_char,
            char_count: 1,
            width: cluster.width,
        });
    }
    vline
}
