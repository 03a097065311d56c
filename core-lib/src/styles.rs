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

//! Styles and the interning registry handing out dense style ids.

use serde::{Deserialize, Serialize};

/// Attribute bits; extensible.
pub const ATTR_BOLD: u8 = 1;
pub const ATTR_ITALIC: u8 = 1 << 1;
pub const ATTR_UNDERLINE: u8 = 1 << 2;

/// A color with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Rgba {
        Rgba { r, g, b, a }
    }

    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
}

/// A resolved style: optional colors plus an attribute bitset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Style {
    pub fg: Option<Rgba>,
    pub bg: Option<Rgba>,
    pub attributes: u8,
}

impl Style {
    pub fn fg(color: Rgba) -> Style {
        Style { fg: Some(color), ..Style::default() }
    }

    pub fn is_default(&self) -> bool {
        self.fg.is_none() && self.bg.is_none() && self.attributes == 0
    }
}

/// Identifier handed out by the registry; 0 is the default (no style).
pub type StyleId = u32;

pub const STYLE_DEFAULT: StyleId = 0;

/// Interns styles into dense ids. Identical styles share an id; the
/// default style is pre-registered as id 0.
#[derive(Debug)]
pub struct StyleRegistry {
    styles: Vec<Style>,
}

impl Default for StyleRegistry {
    fn default() -> StyleRegistry {
        StyleRegistry { styles: vec![Style::default()] }
    }
}

impl StyleRegistry {
    pub fn new() -> StyleRegistry {
        StyleRegistry::default()
    }

    pub fn intern(&mut self, style: Style) -> StyleId {
        if let Some(id) = self.styles.iter().position(|s| *s == style) {
            return id as StyleId;
        }
        self.styles.push(style);
        (self.styles.len() - 1) as StyleId
    }

    pub fn get(&self, id: StyleId) -> Option<&Style> {
        self.styles.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Drop everything except the default style.
    pub fn reset(&mut self) {
        self.styles.truncate(1);
    }
}
