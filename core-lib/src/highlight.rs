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

//! Highlights and their materialization into disjoint style spans.
//!
//! A highlight is a styling request over a column range of one logical
//! line, with a priority; many may overlap. The renderer wants the
//! opposite shape: consecutive disjoint runs, each with one winning style.
//! Materialization is a left-to-right sweep over start/end events,
//! emitting the max-priority active style per gap; rebuilds are lazy per
//! line, keyed by a dirty bit.

use std::collections::HashMap;

use crate::styles::{StyleId, STYLE_DEFAULT};

/// A styling request on one line; columns are a half-open range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Highlight {
    pub col_start: usize,
    pub col_end: usize,
    pub style_id: StyleId,
    pub priority: u8,
    /// Owner reference for bulk removal; 0 means unowned.
    pub hl_ref: u32,
}

/// A materialized run: columns `[col, next_col)` render with `style_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StyleSpan {
    pub col: usize,
    pub style_id: StyleId,
    pub next_col: usize,
}

#[derive(Default)]
struct LineState {
    highlights: Vec<Highlight>,
    spans: Vec<StyleSpan>,
    dirty: bool,
}

/// Per-line highlight storage with lazily rebuilt spans.
#[derive(Default)]
pub struct HighlightMap {
    lines: HashMap<usize, LineState>,
    in_transaction: bool,
}

impl HighlightMap {
    pub fn new() -> HighlightMap {
        HighlightMap::default()
    }

    /// Add one highlight. Empty ranges are ignored.
    pub fn add(&mut self, line: usize, highlight: Highlight) {
        if highlight.col_end <= highlight.col_start {
            return;
        }
        let state = self.lines.entry(line).or_default();
        state.highlights.push(highlight);
        state.dirty = true;
    }

    /// Remove every highlight with the given owner ref, on any line.
    pub fn remove_by_ref(&mut self, hl_ref: u32) {
        for state in self.lines.values_mut() {
            let before = state.highlights.len();
            state.highlights.retain(|h| h.hl_ref != hl_ref);
            if state.highlights.len() != before {
                state.dirty = true;
            }
        }
        self.lines.retain(|_, state| !state.highlights.is_empty());
    }

    pub fn clear_line(&mut self, line: usize) {
        self.lines.remove(&line);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn has_highlights(&self, line: usize) -> bool {
        self.lines.contains_key(&line)
    }

    /// Begin a bulk update; span rebuilds are deferred anyway (they are
    /// lazy), so this only suppresses per-add bookkeeping until `commit`.
    pub fn begin_transaction(&mut self) {
        self.in_transaction = true;
    }

    pub fn end_transaction(&mut self) {
        self.in_transaction = false;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// The materialized spans of `line`, rebuilding if stale. Returns an
    /// empty slice when the line has no highlights.
    pub fn spans(&mut self, line: usize, line_width: usize) -> &[StyleSpan] {
        match self.lines.get_mut(&line) {
            Some(state) => {
                if state.dirty {
                    state.spans = build_spans(&state.highlights, line_width);
                    state.dirty = false;
                }
                &state.spans
            }
            None => &[],
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    // Ends sort before starts at the same column, so zero-width overlap
    // artifacts cannot occur.
    End,
    Start,
}

/// Deterministic sweep turning overlapping highlights into disjoint spans
/// covering `[0, max(line_width, last_end))` whenever at least one
/// highlight exists. Adjacent spans with the same winning style merge.
pub fn build_spans(highlights: &[Highlight], line_width: usize) -> Vec<StyleSpan> {
    if highlights.is_empty() {
        return Vec::new();
    }

    let mut events: Vec<(usize, EventKind, usize)> = Vec::with_capacity(highlights.len() * 2);
    for (idx, h) in highlights.iter().enumerate() {
        events.push((h.col_start, EventKind::Start, idx));
        events.push((h.col_end, EventKind::End, idx));
    }
    events.sort();

    let mut spans: Vec<StyleSpan> = Vec::new();
    let mut active: Vec<usize> = Vec::new();
    let mut last_col = 0;

    for (col, kind, idx) in events {
        if col > last_col {
            push_merged(&mut spans, last_col, winning_style(&active, highlights), col);
            last_col = col;
        }
        match kind {
            EventKind::Start => active.push(idx),
            EventKind::End => active.retain(|&i| i != idx),
        }
    }
    if last_col < line_width {
        push_merged(&mut spans, last_col, STYLE_DEFAULT, line_width);
    }
    spans
}

/// Highest priority wins; at equal priority, the earliest-added highlight.
fn winning_style(active: &[usize], highlights: &[Highlight]) -> StyleId {
    let mut best: Option<&Highlight> = None;
    for &idx in active {
        let h = &highlights[idx];
        match best {
            Some(b) if b.priority >= h.priority => {}
            _ => best = Some(h),
        }
    }
    best.map(|h| h.style_id).unwrap_or(STYLE_DEFAULT)
}

fn push_merged(spans: &mut Vec<StyleSpan>, col: usize, style_id: StyleId, next_col: usize) {
    if let Some(last) = spans.last_mut() {
        if last.style_id == style_id && last.next_col == col {
            last.next_col = next_col;
            return;
        }
    }
    spans.push(StyleSpan { col, style_id, next_col });
}
