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

//! Grapheme cluster segmentation and terminal display-width measurement.
//!
//! The unit of text here is the grapheme cluster (UAX #29): one or more
//! scalar values rendering as one user-perceived character. Each cluster
//! occupies 0, 1, or 2 terminal cells, except `\t`, which advances to the
//! next tab stop. Malformed UTF-8 never panics: every invalid sequence
//! decodes as one replacement cluster of width 1.

use std::str;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

/// The replacement character emitted for malformed UTF-8.
pub const REPLACEMENT: char = '\u{FFFD}';

/// How East Asian Ambiguous characters are measured.
///
/// `Unicode` follows UAX #11 recommendations (ambiguous = narrow), which
/// modern terminals use. `WcWidth` treats ambiguous characters as wide,
/// matching legacy wcwidth(3) in CJK locales.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidthMethod {
    Unicode,
    WcWidth,
}

impl Default for WidthMethod {
    fn default() -> WidthMethod {
        WidthMethod::Unicode
    }
}

#[inline]
fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

/// Display width of a single scalar value, ignoring tab and position.
///
/// Control characters and other unprintables measure 0; the replacement
/// character is pinned to 1 under both methods.
pub fn char_width(c: char, method: WidthMethod) -> usize {
    if c == REPLACEMENT {
        return 1;
    }
    let w = match method {
        WidthMethod::Unicode => UnicodeWidthChar::width(c),
        WidthMethod::WcWidth => UnicodeWidthChar::width_cjk(c),
    };
    w.unwrap_or(0)
}

/// Columns a `\t` starting at `col` advances: to the next multiple of
/// `tab_width`. `tab_width` must be nonzero.
#[inline]
pub fn tab_advance(col: usize, tab_width: usize) -> usize {
    debug_assert!(tab_width > 0);
    tab_width - col % tab_width
}

/// Display width of one grapheme cluster (no tabs, position-independent):
/// the width of the first nonzero-width scalar, except that a
/// Regional-Indicator pair (flag emoji) is wide.
pub fn cluster_width(cluster: &str, method: WidthMethod) -> usize {
    let mut chars = cluster.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return 0,
    };
    if is_regional_indicator(first) && chars.clone().next().map_or(false, is_regional_indicator) {
        return 2;
    }
    let mut w = char_width(first, method);
    let mut rest = chars;
    while w == 0 {
        match rest.next() {
            Some(c) => w = char_width(c, method),
            None => return 0,
        }
    }
    w
}

/// One grapheme cluster located in the source bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub byte_start: usize,
    pub byte_len: usize,
    /// Display width in columns: 0, 1, 2, or a tab advance.
    pub width: usize,
}

impl Cluster {
    pub fn byte_end(&self) -> usize {
        self.byte_start + self.byte_len
    }
}

/// Lazy cluster sequence over raw bytes.
///
/// Tracks the running column so tab clusters measure their actual
/// advance; `start_col` seeds the position for byte ranges that do not
/// begin a line.
pub struct Clusters<'a> {
    bytes: &'a [u8],
    pos: usize,
    col: usize,
    tab_width: usize,
    method: WidthMethod,
    /// The validated UTF-8 run starting at `pos`; empty means the decoder
    /// must look ahead again.
    valid: &'a str,
}

impl<'a> Clusters<'a> {
    pub fn new(bytes: &'a [u8], tab_width: usize, method: WidthMethod) -> Clusters<'a> {
        Clusters::with_start_col(bytes, 0, tab_width, method)
    }

    pub fn with_start_col(
        bytes: &'a [u8],
        start_col: usize,
        tab_width: usize,
        method: WidthMethod,
    ) -> Clusters<'a> {
        Clusters { bytes, pos: 0, col: start_col, tab_width, method, valid: "" }
    }

    /// The column just past the last yielded cluster.
    pub fn col(&self) -> usize {
        self.col
    }

    fn refill(&mut self) -> Option<Cluster> {
        debug_assert!(self.valid.is_empty());
        match str::from_utf8(&self.bytes[self.pos..]) {
            Ok(s) => {
                self.valid = s;
                None
            }
            Err(e) => {
                if e.valid_up_to() > 0 {
                    self.valid =
                        str::from_utf8(&self.bytes[self.pos..self.pos + e.valid_up_to()])
                            .expect("validated prefix");
                    None
                } else {
                    // Emit the invalid sequence as one replacement cluster.
                    let len = e.error_len().unwrap_or(self.bytes.len() - self.pos);
                    let cluster = Cluster { byte_start: self.pos, byte_len: len, width: 1 };
                    self.pos += len;
                    self.col += 1;
                    Some(cluster)
                }
            }
        }
    }
}

impl<'a> Iterator for Clusters<'a> {
    type Item = Cluster;

    fn next(&mut self) -> Option<Cluster> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        if self.valid.is_empty() {
            if let Some(replacement) = self.refill() {
                return Some(replacement);
            }
            if self.pos >= self.bytes.len() {
                return None;
            }
        }
        let cluster_str = self.valid.graphemes(true).next().expect("nonempty valid run");
        let byte_start = self.pos;
        let byte_len = cluster_str.len();
        let width = if cluster_str == "\t" {
            tab_advance(self.col, self.tab_width)
        } else {
            cluster_width(cluster_str, self.method)
        };
        self.pos += byte_len;
        self.col += width;
        self.valid = &self.valid[byte_len..];
        Some(Cluster { byte_start, byte_len, width })
    }
}

/// Total display width of `bytes` starting at column 0.
pub fn measure_width(bytes: &[u8], tab_width: usize, method: WidthMethod) -> usize {
    let mut clusters = Clusters::new(bytes, tab_width, method);
    let mut total = 0;
    for cluster in &mut clusters {
        total += cluster.width;
    }
    total
}

/// Number of grapheme clusters in `bytes`.
pub fn count_clusters(bytes: &[u8], method: WidthMethod) -> usize {
    Clusters::new(bytes, 8, method).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(s: &str) -> Vec<usize> {
        Clusters::new(s.as_bytes(), 4, WidthMethod::Unicode).map(|c| c.width).collect()
    }

    #[test]
    fn ascii_is_one_column_each() {
        assert_eq!(widths("abc"), vec![1, 1, 1]);
        assert_eq!(measure_width(b"hello", 4, WidthMethod::Unicode), 5);
    }

    #[test]
    fn cjk_is_wide() {
        assert_eq!(widths("歴史"), vec![2, 2]);
        assert_eq!(measure_width("科学的".as_bytes(), 4, WidthMethod::Unicode), 6);
    }

    #[test]
    fn combining_marks_join_their_base() {
        // e + U+0301 is one cluster of width 1.
        let s = "e\u{0301}x";
        assert_eq!(widths(s), vec![1, 1]);
        assert_eq!(count_clusters(s.as_bytes(), WidthMethod::Unicode), 2);
    }

    #[test]
    fn flag_emoji_is_one_wide_cluster() {
        let flag = "\u{1F1EF}\u{1F1F5}"; // JP
        assert_eq!(widths(flag), vec![2]);
        assert_eq!(count_clusters(flag.as_bytes(), WidthMethod::Unicode), 1);
    }

    #[test]
    fn tab_advances_to_next_stop() {
        // "AB\tCD" with tab width 4: the tab starts at column 2 and fills
        // columns 2 and 3.
        assert_eq!(widths("AB\tCD"), vec![1, 1, 2, 1, 1]);
        assert_eq!(measure_width(b"AB\tCD", 4, WidthMethod::Unicode), 6);
        // At a stop boundary the tab advances a full stop.
        assert_eq!(widths("ABCD\tE"), vec![1, 1, 1, 1, 4, 1]);
    }

    #[test]
    fn start_col_offsets_tab_stops() {
        let mut clusters = Clusters::with_start_col(b"\tX", 3, 4, WidthMethod::Unicode);
        let tab = clusters.next().unwrap();
        assert_eq!(tab.width, 1);
        assert_eq!(clusters.next().unwrap().width, 1);
        assert_eq!(clusters.col(), 5);
    }

    #[test]
    fn malformed_bytes_become_replacement_clusters() {
        let bytes = b"a\xFF\xFEb";
        let clusters: Vec<Cluster> =
            Clusters::new(bytes, 4, WidthMethod::Unicode).collect();
        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().all(|c| c.width == 1));
        assert_eq!(clusters[1].byte_len, 1);
        // Truncated multibyte sequence at the end.
        let tail = b"ok\xE4\xB8";
        let clusters: Vec<Cluster> = Clusters::new(tail, 4, WidthMethod::Unicode).collect();
        assert_eq!(clusters.last().unwrap().byte_len, 2);
        assert_eq!(clusters.last().unwrap().width, 1);
    }

    #[test]
    fn replacement_char_is_width_one_under_both_methods() {
        assert_eq!(char_width(REPLACEMENT, WidthMethod::Unicode), 1);
        assert_eq!(char_width(REPLACEMENT, WidthMethod::WcWidth), 1);
    }

    #[test]
    fn wcwidth_widens_ambiguous() {
        // U+00B1 PLUS-MINUS SIGN is East Asian Ambiguous.
        assert_eq!(char_width('±', WidthMethod::Unicode), 1);
        assert_eq!(char_width('±', WidthMethod::WcWidth), 2);
    }

    #[test]
    fn zero_width_scalars_measure_zero() {
        assert_eq!(char_width('\u{200B}', WidthMethod::Unicode), 0);
        assert_eq!(char_width('\u{0301}', WidthMethod::Unicode), 0);
        assert_eq!(cluster_width("\u{0301}", WidthMethod::Unicode), 0);
    }

    #[test]
    fn concat_stability_at_cluster_boundaries() {
        let s = "ae\u{0301}歴\tb";
        let whole: Vec<Cluster> = Clusters::new(s.as_bytes(), 4, WidthMethod::Unicode).collect();
        for cluster in &whole {
            let split = cluster.byte_start;
            let left: Vec<Cluster> =
                Clusters::new(&s.as_bytes()[..split], 4, WidthMethod::Unicode).collect();
            let right_start_col: usize = left.iter().map(|c| c.width).sum();
            let right: Vec<Cluster> = Clusters::with_start_col(
                &s.as_bytes()[split..],
                right_start_col,
                4,
                WidthMethod::Unicode,
            )
            .collect();
            let rejoined: Vec<(usize, usize)> = left
                .iter()
                .map(|c| (c.byte_start, c.width))
                .chain(right.iter().map(|c| (c.byte_start + split, c.width)))
                .collect();
            let expected: Vec<(usize, usize)> =
                whole.iter().map(|c| (c.byte_start, c.width)).collect();
            assert_eq!(rejoined, expected, "split at {}", split);
        }
    }
}
