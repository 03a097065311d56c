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

//! The visual selection model: an anchor and a focus in visual
//! coordinates, resolved through a view into the buffer's character
//! range.

use crate::buffer::TextBuffer;
use crate::error::Result;
use crate::styles::Rgba;
use crate::view::View;

/// An in-progress selection. Coordinates are visual `(x, y)` pairs:
/// column then virtual row. The anchor is where the drag started; the
/// focus follows the pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub anchor: (usize, usize),
    pub focus: (usize, usize),
    pub active: bool,
}

impl Selection {
    pub fn begin(anchor: (usize, usize)) -> Selection {
        Selection { anchor, focus: anchor, active: true }
    }

    pub fn drag(&mut self, focus: (usize, usize)) {
        self.focus = focus;
    }

    pub fn clear(&mut self) {
        *self = Selection::default();
    }

    /// Push the current corners through the view into the buffer's
    /// resolved selection. Returns whether the resolved range changed.
    pub fn apply(
        &self,
        view: &mut View,
        buffer: &mut TextBuffer,
        fg: Option<Rgba>,
        bg: Option<Rgba>,
    ) -> Result<bool> {
        if !self.active {
            let had = buffer.get_selection().is_some();
            buffer.reset_selection();
            return Ok(had);
        }
        view.set_local_selection(buffer, self.anchor, self.focus, fg, bg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_resolves_and_clears() {
        let mut buffer = TextBuffer::new();
        buffer.set_text(b"alpha\nbeta").unwrap();
        let mut view = View::new();

        let mut selection = Selection::begin((2, 0));
        selection.drag((2, 1));
        assert!(selection.apply(&mut view, &mut buffer, None, None).unwrap());
        let range = buffer.get_selection().unwrap();
        // "pha\nbe": chars 2..8.
        assert_eq!((range.start, range.end), (2, 8));

        selection.clear();
        assert!(selection.apply(&mut view, &mut buffer, None, None).unwrap());
        assert!(buffer.get_selection().is_none());
    }

    #[test]
    fn reversed_corners_normalize() {
        let mut buffer = TextBuffer::new();
        buffer.set_text(b"alpha").unwrap();
        let mut view = View::new();
        let mut selection = Selection::begin((4, 0));
        selection.drag((1, 0));
        selection.apply(&mut view, &mut buffer, None, None).unwrap();
        let range = buffer.get_selection().unwrap();
        assert_eq!((range.start, range.end), (1, 4));
    }

    #[test]
    fn empty_selection_resets() {
        let mut buffer = TextBuffer::new();
        buffer.set_text(b"alpha").unwrap();
        let mut view = View::new();
        let selection = Selection::begin((3, 0));
        selection.apply(&mut view, &mut buffer, None, None).unwrap();
        assert!(buffer.get_selection().is_none());
    }
}
