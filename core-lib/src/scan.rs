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

//! Byte scanners over raw UTF-8: line breaks, wrap opportunities, tab
//! stops, and width-bounded positions.
//!
//! All scanners are pure: they read a byte slice and append to a
//! caller-owned buffer or return positions. Hot paths run on vectorized
//! searches (`memchr`) or 16-byte chunks; the per-cluster tail paths keep
//! character offsets exact. Scalar reference implementations live in the
//! test module and every scanner is checked against them.

use memchr::{memchr, memchr2_iter, memchr_iter};

use weft_unicode::{Cluster, Clusters, WidthMethod};

/// Kind of line terminator found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineBreakKind {
    Lf,
    Cr,
    CrLf,
}

/// A line terminator; `pos` is the index of the final byte of the
/// terminator, so a CRLF pair is reported once, at the LF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineBreak {
    pub pos: usize,
    pub kind: LineBreakKind,
}

/// Append every line terminator in `bytes` to `out`.
pub fn find_line_breaks(bytes: &[u8], out: &mut Vec<LineBreak>) {
    let mut last_was_cr = false;
    for pos in memchr2_iter(b'\n', b'\r', bytes) {
        match bytes[pos] {
            b'\n' => {
                // A CR immediately before folds into one CRLF terminator.
                let kind = if last_was_cr && out.last().map(|b| b.pos) == Some(pos - 1) {
                    out.pop();
                    LineBreakKind::CrLf
                } else {
                    LineBreakKind::Lf
                };
                out.push(LineBreak { pos, kind });
                last_was_cr = false;
            }
            _ => {
                out.push(LineBreak { pos, kind: LineBreakKind::Cr });
                last_was_cr = true;
            }
        }
    }
}

/// Append the position of every `\t` to `out`.
pub fn find_tab_stops(bytes: &[u8], out: &mut Vec<usize>) {
    out.extend(memchr_iter(b'\t', bytes));
}

/// Whether every byte is printable ASCII (`0x20..=0x7E`): one byte per
/// cluster, one column per byte, no tabs. Checked 16 bytes at a time.
pub fn is_ascii_only(bytes: &[u8]) -> bool {
    let mut chunks = bytes.chunks_exact(16);
    for chunk in &mut chunks {
        let mut ok = true;
        for &b in chunk {
            ok &= (0x20..=0x7E).contains(&b);
        }
        if !ok {
            return false;
        }
    }
    chunks.remainder().iter().all(|b| (0x20..=0x7E).contains(b))
}

// Break opportunities after these ASCII bytes, one bit per byte value.
const ASCII_WRAP: u128 = {
    let chars = b" \t-/\\.,;:!?()[]{}<>";
    let mut mask = 0u128;
    let mut i = 0;
    while i < chars.len() {
        mask |= 1 << chars[i];
        i += 1;
    }
    mask
};

#[inline]
fn is_ascii_wrap_byte(b: u8) -> bool {
    b < 0x80 && ASCII_WRAP & (1 << b) != 0
}

fn is_unicode_wrap_char(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}'          // no-break space (treated as a wrap point here)
        | '\u{1680}'        // ogham space mark
        | '\u{2000}'..='\u{200A}'
        | '\u{202F}'
        | '\u{205F}'
        | '\u{3000}'
        | '\u{200B}'        // zero-width space
        | '\u{00AD}'        // soft hyphen
        | '\u{2010}'
        | '\u{2012}'..='\u{2014}'
    )
}

/// A place a wrapped line may begin: just past a wrap character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapBreak {
    pub byte_offset: usize,
    pub char_offset: usize,
}

/// Append every wrap opportunity in `bytes` to `out`.
///
/// Pure-ASCII input takes a bitmask path where character offsets equal
/// byte offsets; otherwise the scan advances cluster by cluster to keep
/// `char_offset` exact.
pub fn find_wrap_breaks(bytes: &[u8], method: WidthMethod, out: &mut Vec<WrapBreak>) {
    if is_ascii_only(bytes) {
        for (i, &b) in bytes.iter().enumerate() {
            if is_ascii_wrap_byte(b) {
                out.push(WrapBreak { byte_offset: i + 1, char_offset: i + 1 });
            }
        }
        return;
    }
    let mut char_offset = 0;
    for cluster in Clusters::new(bytes, 1, method) {
        char_offset += 1;
        if is_wrap_cluster(bytes, &cluster) {
            out.push(WrapBreak { byte_offset: cluster.byte_end(), char_offset });
        }
    }
}

fn is_wrap_cluster(bytes: &[u8], cluster: &Cluster) -> bool {
    is_wrap_point(&bytes[cluster.byte_start..cluster.byte_end()])
}

/// Whether a line may wrap just after a cluster with these bytes.
pub fn is_wrap_point(cluster: &[u8]) -> bool {
    match cluster.first() {
        Some(&b) if b < 0x80 => is_ascii_wrap_byte(b),
        Some(_) => std::str::from_utf8(cluster)
            .ok()
            .and_then(|s| s.chars().next())
            .map_or(false, is_unicode_wrap_char),
        None => false,
    }
}

/// Where a width-bounded scan stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WidthScan {
    pub byte_offset: usize,
    pub clusters: usize,
    pub columns: usize,
}

/// Scan until just before a cluster would push past `max_columns`: the
/// result never exceeds the limit. This is the fit computation for
/// wrapping; a leading cluster wider than the whole limit is refused
/// (zero-length result) so the caller can decide to overflow it alone.
pub fn find_wrap_pos_by_width(
    bytes: &[u8],
    max_columns: usize,
    start_col: usize,
    tab_width: usize,
    method: WidthMethod,
) -> WidthScan {
    if is_ascii_only(bytes) {
        let n = bytes.len().min(max_columns);
        return WidthScan { byte_offset: n, clusters: n, columns: n };
    }
    let mut scan = WidthScan::default();
    for cluster in Clusters::with_start_col(bytes, start_col, tab_width, method) {
        if scan.columns + cluster.width > max_columns {
            break;
        }
        scan.byte_offset = cluster.byte_end();
        scan.clusters += 1;
        scan.columns += cluster.width;
    }
    scan
}

/// Scan until the column budget is met or first exceeded: the cluster
/// that reaches (or crosses) `max_columns` is included. This maps a
/// visual column back to a character position, e.g. for selection.
pub fn find_pos_by_width(
    bytes: &[u8],
    max_columns: usize,
    start_col: usize,
    tab_width: usize,
    method: WidthMethod,
) -> WidthScan {
    if is_ascii_only(bytes) {
        let n = bytes.len().min(max_columns);
        return WidthScan { byte_offset: n, clusters: n, columns: n };
    }
    let mut scan = WidthScan::default();
    for cluster in Clusters::with_start_col(bytes, start_col, tab_width, method) {
        if scan.columns >= max_columns {
            break;
        }
        scan.byte_offset = cluster.byte_end();
        scan.clusters += 1;
        scan.columns += cluster.width;
    }
    scan
}

/// Position of the first `\n` or `\r`, if any.
pub fn first_line_break(bytes: &[u8]) -> Option<usize> {
    memchr(b'\n', bytes).into_iter().chain(memchr(b'\r', bytes)).min()
}

/// Number of `\n` bytes; vectorized count.
pub fn count_newlines(bytes: &[u8]) -> usize {
    bytecount::count(bytes, b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    // One-byte-at-a-time references the vectorized scanners must match.

    fn scalar_line_breaks(bytes: &[u8]) -> Vec<LineBreak> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    out.push(LineBreak { pos: i + 1, kind: LineBreakKind::CrLf });
                    i += 2;
                }
                b'\r' => {
                    out.push(LineBreak { pos: i, kind: LineBreakKind::Cr });
                    i += 1;
                }
                b'\n' => {
                    out.push(LineBreak { pos: i, kind: LineBreakKind::Lf });
                    i += 1;
                }
                _ => i += 1,
            }
        }
        out
    }

    fn scalar_is_ascii_only(bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| (0x20..=0x7E).contains(&b))
    }

    fn line_breaks(bytes: &[u8]) -> Vec<LineBreak> {
        let mut out = Vec::new();
        find_line_breaks(bytes, &mut out);
        out
    }

    #[test]
    fn line_breaks_match_scalar_reference() {
        let cases: Vec<&[u8]> = vec![
            b"",
            b"no breaks at all",
            b"a\nb",
            b"a\r\nb\r\nc",
            b"\r\r\n\n\r",
            b"mixed\rstyle\nendings\r\nhere\n",
            b"trailing\r",
            "unicode \u{6b74}\n史\r\n".as_bytes(),
        ];
        for bytes in cases {
            assert_eq!(line_breaks(bytes), scalar_line_breaks(bytes), "input {:?}", bytes);
        }
    }

    #[test]
    fn crlf_across_lane_boundary() {
        // CR as byte 15, LF as byte 16: the pair straddles a 16-byte lane.
        let mut bytes = vec![b'x'; 15];
        bytes.push(b'\r');
        bytes.push(b'\n');
        bytes.extend_from_slice(b"tail");
        assert_eq!(line_breaks(&bytes), scalar_line_breaks(&bytes));
        assert_eq!(line_breaks(&bytes), vec![LineBreak { pos: 16, kind: LineBreakKind::CrLf }]);
    }

    #[test]
    fn lone_cr_is_not_crlf() {
        let bytes = b"a\rb\nc";
        assert_eq!(
            line_breaks(bytes),
            vec![
                LineBreak { pos: 1, kind: LineBreakKind::Cr },
                LineBreak { pos: 3, kind: LineBreakKind::Lf },
            ]
        );
    }

    #[test]
    fn tab_stops() {
        let mut out = Vec::new();
        find_tab_stops(b"a\tbc\t\td", &mut out);
        assert_eq!(out, vec![1, 4, 5]);
    }

    #[test]
    fn ascii_only_matches_scalar_reference() {
        let cases: Vec<Vec<u8>> = vec![
            b"plain ascii text that is longer than sixteen bytes".to_vec(),
            b"short".to_vec(),
            b"".to_vec(),
            b"tab\there".to_vec(),
            "caf\u{e9}".as_bytes().to_vec(),
            {
                let mut v = vec![b'a'; 31];
                v.push(0x1F);
                v
            },
            {
                let mut v = vec![b'a'; 16];
                v[15] = 0x7F;
                v
            },
        ];
        for bytes in cases {
            assert_eq!(is_ascii_only(&bytes), scalar_is_ascii_only(&bytes), "input {:?}", bytes);
        }
    }

    #[test]
    fn wrap_breaks_ascii() {
        let mut out = Vec::new();
        find_wrap_breaks(b"one two-three/four", WidthMethod::Unicode, &mut out);
        let offsets: Vec<usize> = out.iter().map(|b| b.byte_offset).collect();
        assert_eq!(offsets, vec![4, 8, 14]);
        // ASCII path: char offsets equal byte offsets.
        assert!(out.iter().all(|b| b.byte_offset == b.char_offset));
    }

    #[test]
    fn wrap_breaks_unicode_offsets_count_clusters() {
        let text = "歴史 ok\u{00A0}x";
        let mut out = Vec::new();
        find_wrap_breaks(text.as_bytes(), WidthMethod::Unicode, &mut out);
        // Breaks after the ASCII space (cluster 3) and after NBSP
        // (cluster 6).
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].char_offset, 3);
        assert_eq!(out[0].byte_offset, 7);
        assert_eq!(out[1].char_offset, 6);
    }

    #[test]
    fn wrap_pos_stops_before_limit() {
        // "歴史的" is 2+2+2 columns.
        let scan =
            find_wrap_pos_by_width("歴史的".as_bytes(), 5, 0, 4, WidthMethod::Unicode);
        assert_eq!(scan.clusters, 2);
        assert_eq!(scan.columns, 4);
        assert_eq!(scan.byte_offset, 6);
    }

    #[test]
    fn pos_stops_at_or_after_limit() {
        let scan = find_pos_by_width("歴史的".as_bytes(), 5, 0, 4, WidthMethod::Unicode);
        // The cluster crossing column 5 is included.
        assert_eq!(scan.clusters, 3);
        assert_eq!(scan.columns, 6);
    }

    #[test]
    fn width_scans_ascii_fast_path() {
        let scan = find_wrap_pos_by_width(b"abcdefgh", 5, 0, 4, WidthMethod::Unicode);
        assert_eq!(scan, WidthScan { byte_offset: 5, clusters: 5, columns: 5 });
        let scan = find_pos_by_width(b"abc", 5, 0, 4, WidthMethod::Unicode);
        assert_eq!(scan, WidthScan { byte_offset: 3, clusters: 3, columns: 3 });
    }

    #[test]
    fn width_scans_match_cluster_reference() {
        let inputs: Vec<&str> = vec!["hello", "AB\tCD", "歴史 and more", "e\u{0301}abc"];
        for input in inputs {
            for limit in 0..10 {
                let wrap = find_wrap_pos_by_width(input.as_bytes(), limit, 0, 4, WidthMethod::Unicode);
                // Reference: accumulate clusters one at a time.
                let mut cols = 0;
                let mut clusters = 0;
                let mut bytes = 0;
                for c in weft_unicode::Clusters::new(input.as_bytes(), 4, WidthMethod::Unicode) {
                    if cols + c.width > limit {
                        break;
                    }
                    cols += c.width;
                    clusters += 1;
                    bytes = c.byte_end();
                }
                if is_ascii_only(input.as_bytes()) {
                    assert_eq!(wrap.columns, cols.min(limit), "input {:?} limit {}", input, limit);
                } else {
                    assert_eq!(
                        (wrap.byte_offset, wrap.clusters, wrap.columns),
                        (bytes, clusters, cols),
                        "input {:?} limit {}",
                        input,
                        limit
                    );
                }
            }
        }
    }

    #[test]
    fn wide_cluster_refused_when_it_would_overflow() {
        let scan = find_wrap_pos_by_width("歴".as_bytes(), 1, 0, 4, WidthMethod::Unicode);
        assert_eq!(scan.clusters, 0);
        assert_eq!(scan.byte_offset, 0);
    }

    #[test]
    fn newline_count() {
        assert_eq!(count_newlines(b"a\nb\nc\n"), 3);
        assert_eq!(count_newlines(b""), 0);
    }
}
