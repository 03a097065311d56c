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

//! The edit façade: logical cursors driving char-addressed buffer edits.
//!
//! Cursors live in `(row, col)` logical coordinates with a sticky
//! `desired_col` for vertical motion. Every mutating operation snapshots
//! undo state first with a meta tag naming the kind of edit, translates
//! each cursor to a character offset, splices the rope through the
//! buffer, and re-derives the cursor position from the result.

use log::trace;

use crate::buffer::{count_chars, TextBuffer};
use crate::error::Result;
use crate::scan;

/// One logical cursor. `desired_col` survives vertical moves across
/// short lines; horizontal moves reset it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
    desired_col: usize,
}

impl Cursor {
    pub fn at(row: usize, col: usize) -> Cursor {
        Cursor { row, col, desired_col: col }
    }
}

/// An ordered multi-cursor editor over one buffer.
pub struct Editor {
    cursors: Vec<Cursor>,
}

impl Default for Editor {
    fn default() -> Editor {
        Editor::new()
    }
}

impl Editor {
    pub fn new() -> Editor {
        Editor { cursors: vec![Cursor::default()] }
    }

    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }

    pub fn set_cursor(&mut self, row: usize, col: usize) {
        self.cursors = vec![Cursor::at(row, col)];
    }

    /// Add a cursor, keeping the list ordered by position.
    pub fn add_cursor(&mut self, row: usize, col: usize) {
        self.cursors.push(Cursor::at(row, col));
        self.cursors.sort_by_key(|c| (c.row, c.col));
        self.cursors.dedup_by_key(|c| (c.row, c.col));
    }

    pub fn collapse_to_primary(&mut self) {
        self.cursors.truncate(1);
    }

    fn clamp_cursors(&mut self, buffer: &TextBuffer) {
        let last_row = buffer.line_count().saturating_sub(1);
        for cursor in &mut self.cursors {
            cursor.row = cursor.row.min(last_row);
            let width = buffer.line_width(cursor.row).unwrap_or(0);
            cursor.col = cursor.col.min(width);
        }
    }

    /// Cursor indexes in reverse document order, so earlier offsets stay
    /// valid while later ones are edited.
    fn reverse_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cursors.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse((self.cursors[i].row, self.cursors[i].col)));
        order
    }

    /// Insert `text` at every cursor.
    pub fn insert_text(&mut self, buffer: &mut TextBuffer, text: &[u8]) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        buffer.store_undo("insert");
        let inserted_chars = count_chars(text);
        for i in self.reverse_order() {
            let cursor = self.cursors[i];
            let offset = buffer.line_col_to_char(cursor.row, cursor.col)?;
            buffer.insert_at_char(offset, text)?;
            let (row, col) = buffer.char_to_line_col(offset + inserted_chars)?;
            self.cursors[i] = Cursor::at(row, col);
        }
        trace!("insert_text: {} bytes at {} cursors", text.len(), self.cursors.len());
        Ok(())
    }

    /// Delete the character before each cursor; cursors at the start of a
    /// line join it to the previous one.
    pub fn backspace(&mut self, buffer: &mut TextBuffer) -> Result<()> {
        buffer.store_undo("backspace");
        for i in self.reverse_order() {
            let cursor = self.cursors[i];
            let offset = buffer.line_col_to_char(cursor.row, cursor.col)?;
            if offset == 0 {
                continue;
            }
            buffer.delete_char_range(offset - 1, offset)?;
            let (row, col) = buffer.char_to_line_col(offset - 1)?;
            self.cursors[i] = Cursor::at(row, col);
        }
        Ok(())
    }

    /// Delete the character after each cursor.
    pub fn delete_forward(&mut self, buffer: &mut TextBuffer) -> Result<()> {
        buffer.store_undo("delete");
        for i in self.reverse_order() {
            let cursor = self.cursors[i];
            let offset = buffer.line_col_to_char(cursor.row, cursor.col)?;
            if offset >= buffer.char_count() {
                continue;
            }
            buffer.delete_char_range(offset, offset + 1)?;
            let (row, col) = buffer.char_to_line_col(offset)?;
            self.cursors[i] = Cursor::at(row, col);
        }
        Ok(())
    }

    pub fn move_left(&mut self, buffer: &TextBuffer) -> Result<()> {
        for cursor in &mut self.cursors {
            let offset = buffer.line_col_to_char(cursor.row, cursor.col)?;
            if offset == 0 {
                continue;
            }
            let (row, col) = buffer.char_to_line_col(offset - 1)?;
            *cursor = Cursor::at(row, col);
        }
        Ok(())
    }

    pub fn move_right(&mut self, buffer: &TextBuffer) -> Result<()> {
        let total = buffer.char_count();
        for cursor in &mut self.cursors {
            let offset = buffer.line_col_to_char(cursor.row, cursor.col)?;
            if offset >= total {
                continue;
            }
            let (row, col) = buffer.char_to_line_col(offset + 1)?;
            *cursor = Cursor::at(row, col);
        }
        Ok(())
    }

    pub fn move_up(&mut self, buffer: &TextBuffer) -> Result<()> {
        for cursor in &mut self.cursors {
            if cursor.row == 0 {
                continue;
            }
            cursor.row -= 1;
            let width = buffer.line_width(cursor.row)?;
            cursor.col = cursor.desired_col.min(width);
        }
        Ok(())
    }

    pub fn move_down(&mut self, buffer: &TextBuffer) -> Result<()> {
        let last_row = buffer.line_count().saturating_sub(1);
        for cursor in &mut self.cursors {
            if cursor.row >= last_row {
                continue;
            }
            cursor.row += 1;
            let width = buffer.line_width(cursor.row)?;
            cursor.col = cursor.desired_col.min(width);
        }
        Ok(())
    }

    pub fn move_line_start(&mut self, _buffer: &TextBuffer) {
        for cursor in &mut self.cursors {
            *cursor = Cursor::at(cursor.row, 0);
        }
    }

    pub fn move_line_end(&mut self, buffer: &TextBuffer) -> Result<()> {
        for cursor in &mut self.cursors {
            let width = buffer.line_width(cursor.row)?;
            *cursor = Cursor::at(cursor.row, width);
        }
        Ok(())
    }

    /// Move to the start of the previous word on the line, or the line
    /// start, or the end of the previous line.
    pub fn move_word_left(&mut self, buffer: &TextBuffer) -> Result<()> {
        for cursor in &mut self.cursors {
            let char_in_line = line_char_at(buffer, cursor.row, cursor.col)?;
            if char_in_line == 0 {
                if cursor.row > 0 {
                    let row = cursor.row - 1;
                    let width = buffer.line_width(row)?;
                    *cursor = Cursor::at(row, width);
                }
                continue;
            }
            let boundaries = line_word_boundaries(buffer, cursor.row)?;
            let target = boundaries.into_iter().filter(|&b| b < char_in_line).max().unwrap_or(0);
            let col = line_col_of_char(buffer, cursor.row, target)?;
            *cursor = Cursor::at(cursor.row, col);
        }
        Ok(())
    }

    /// Move to the start of the next word, or the line end, or the start
    /// of the next line.
    pub fn move_word_right(&mut self, buffer: &TextBuffer) -> Result<()> {
        let last_row = buffer.line_count().saturating_sub(1);
        for cursor in &mut self.cursors {
            let line_len = buffer.line_char_len(cursor.row)?;
            let char_in_line = line_char_at(buffer, cursor.row, cursor.col)?;
            if char_in_line >= line_len {
                if cursor.row < last_row {
                    *cursor = Cursor::at(cursor.row + 1, 0);
                }
                continue;
            }
            let boundaries = line_word_boundaries(buffer, cursor.row)?;
            let target =
                boundaries.into_iter().find(|&b| b > char_in_line).unwrap_or(line_len);
            let col = line_col_of_char(buffer, cursor.row, target)?;
            *cursor = Cursor::at(cursor.row, col);
        }
        Ok(())
    }

    /// Undo the last edit, returning its meta tag.
    pub fn undo(&mut self, buffer: &mut TextBuffer) -> Option<String> {
        let meta = buffer.undo()?;
        self.clamp_cursors(buffer);
        Some(meta)
    }

    pub fn redo(&mut self, buffer: &mut TextBuffer) -> Option<String> {
        let meta = buffer.redo()?;
        self.clamp_cursors(buffer);
        Some(meta)
    }
}

/// Character offset within the line at a display column.
fn line_char_at(buffer: &TextBuffer, row: usize, col: usize) -> Result<usize> {
    let offset = buffer.line_col_to_char(row, col)?;
    Ok(offset - buffer.line_char_offset(row)?)
}

/// Display column of a character offset within the line.
fn line_col_of_char(buffer: &TextBuffer, row: usize, char_in_line: usize) -> Result<usize> {
    let offset = buffer.line_char_offset(row)? + char_in_line;
    let (_, col) = buffer.char_to_line_col(offset)?;
    Ok(col)
}

/// Word-start character offsets within the line (positions just after
/// each wrap point).
fn line_word_boundaries(buffer: &TextBuffer, row: usize) -> Result<Vec<usize>> {
    let start = buffer.line_char_offset(row)?;
    let len = buffer.line_char_len(row)?;
    let bytes = buffer.char_range_bytes(start, start + len)?;
    let mut breaks = Vec::new();
    scan::find_wrap_breaks(&bytes, buffer.config().width_method, &mut breaks);
    Ok(breaks.into_iter().map(|b| b.char_offset).filter(|&c| c < len).collect())
}
