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

//! End-to-end scenarios across buffer, view, and editor.

use std::io::Write;

use weft_core_lib::{TextBuffer, View, Viewport, WrapMode};

fn buffer_with(text: &str) -> TextBuffer {
    let mut buffer = TextBuffer::new();
    buffer.set_text(text.as_bytes()).unwrap();
    buffer
}

fn text_of(buffer: &TextBuffer) -> String {
    String::from_utf8(buffer.get_plain_text().unwrap()).unwrap()
}

fn wrapped_widths(buffer: &TextBuffer, mode: WrapMode, width: usize) -> Vec<usize> {
    let mut view = View::new();
    view.set_wrap_mode(mode);
    view.set_wrap_width(Some(width)).unwrap();
    view.get_virtual_lines(buffer).unwrap().iter().map(|v| v.width).collect()
}

#[test]
fn two_line_document_counts() {
    let buffer = buffer_with("hello\nworld");
    assert_eq!(buffer.line_count(), 2);
    assert_eq!(buffer.length(), 10);
    assert_eq!(buffer.byte_size(), 11);

    let mut out = vec![0u8; buffer.byte_size()];
    let written = buffer.get_plain_text_into(&mut out).unwrap();
    assert_eq!(&out[..written], b"hello\nworld");
}

#[test]
fn insert_after_single_char() {
    let mut buffer = buffer_with("a");
    buffer.insert_at_char(1, b" b").unwrap();
    assert_eq!(text_of(&buffer), "a b");
    assert_eq!(buffer.length(), 3);
    assert_eq!(buffer.line_count(), 1);
}

#[test]
fn word_and_char_wrap_scenarios() {
    let buffer = buffer_with("hello world how");
    assert_eq!(wrapped_widths(&buffer, WrapMode::Word, 10), vec![6, 9]);
    assert_eq!(wrapped_widths(&buffer, WrapMode::Char, 10), vec![10, 5]);
}

#[test]
fn tab_fills_to_next_stop() {
    // Tab width 4, tab at column 2: cluster widths 1,1,2,1,1.
    let buffer = buffer_with("AB\tCD");
    assert_eq!(buffer.length(), 6);
}

#[test]
fn overlapping_highlights_resolve_by_priority() {
    let mut buffer = buffer_with("abcdefg");
    const ERR: u32 = 3;
    const WARN: u32 = 4;
    buffer.add_highlight(0, 0, 5, ERR, 10, 1).unwrap();
    buffer.add_highlight(0, 2, 4, WARN, 5, 2).unwrap();
    let spans = buffer.get_line_spans(0).unwrap();
    let triples: Vec<(usize, u32, usize)> =
        spans.iter().map(|s| (s.col, s.style_id, s.next_col)).collect();
    assert_eq!(triples, vec![(0, ERR, 5), (5, 0, 7)]);
}

#[test]
fn megabyte_file_lines_and_virtual_lines() {
    // 1 MiB of ASCII with an LF every 81st byte: 12945 full 80-column
    // lines plus a 31-byte tail line.
    const MIB: usize = 1 << 20;
    let mut content = Vec::with_capacity(MIB);
    while content.len() + 81 <= MIB {
        content.extend_from_slice(&[b'a'; 80]);
        content.push(b'\n');
    }
    let tail = MIB - content.len();
    content.extend(std::iter::repeat(b'a').take(tail));
    assert_eq!(content.len(), MIB);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&content).unwrap();

    let mut buffer = TextBuffer::new();
    buffer.load_file(file.path()).unwrap();
    let expected_lines = (MIB + 80) / 81;
    assert_eq!(buffer.line_count(), expected_lines);
    assert_eq!(buffer.byte_size(), MIB);

    let mut view = View::new();
    view.set_wrap_mode(WrapMode::Char);
    view.set_wrap_width(Some(40)).unwrap();
    let lines = view.get_virtual_lines(&buffer).unwrap();
    // Every 80-column line splits in exactly two 40-column halves; the
    // 31-column tail stays whole.
    assert_eq!(lines.len(), (expected_lines - 1) * 2 + 1);
    assert!(lines[..lines.len() - 1].iter().all(|v| v.width == 40));
    assert_eq!(lines.last().unwrap().width, tail);
}

#[test]
fn exact_double_wrap_when_lines_fill_evenly() {
    let content = vec!["b".repeat(80); 1000].join("\n");
    let buffer = buffer_with(&content);
    assert_eq!(buffer.line_count(), 1000);
    let widths = wrapped_widths(&buffer, WrapMode::Char, 40);
    assert_eq!(widths.len(), 2000);
    assert!(widths.iter().all(|&w| w == 40));
}

#[test]
fn wrap_reconstruction_property() {
    let buffer = buffer_with("The 歴史 of wrapping, in 2 scripts — and emoji \u{1F1EF}\u{1F1F5}!");
    for width in 2..20 {
        let mut view = View::new();
        view.set_wrap_mode(WrapMode::Char);
        view.set_wrap_width(Some(width)).unwrap();
        let lines = view.get_virtual_lines(&buffer).unwrap();
        let total_chars: usize = lines.iter().map(|v| {
            v.chunks.iter().map(|c| c.char_count).sum::<usize>()
        }).sum();
        assert_eq!(total_chars, buffer.char_count(), "width {}", width);
        for line in lines {
            let cluster_count: usize = line.chunks.iter().map(|c| c.char_count).sum();
            assert!(line.width <= width || cluster_count == 1, "width {}", width);
        }
    }
}

#[test]
fn selection_round_trip_through_view() {
    let mut buffer = buffer_with("alpha beta gamma\ndelta");
    let mut view = View::new();
    view.set_wrap_mode(WrapMode::Word);
    view.set_wrap_width(Some(8)).unwrap();
    let changed = view.set_local_selection(&mut buffer, (2, 0), (3, 2), None, None).unwrap();
    assert!(changed);
    let range = buffer.get_selection().unwrap();
    assert!(range.start < range.end);

    let mut out = vec![0u8; 64];
    let written = buffer.get_selected_text_into(&mut out).unwrap();
    assert!(written > 0);
    // The selected text is a contiguous slice of the plain text.
    let plain = text_of(&buffer);
    let selected = std::str::from_utf8(&out[..written]).unwrap();
    assert!(plain.contains(selected));
}

#[test]
fn editing_session_with_undo_tree() {
    let mut buffer = buffer_with("fn main() {}\n");
    let mut editor = weft_core_lib::Editor::new();
    editor.set_cursor(0, 12);
    editor.insert_text(&mut buffer, b"\n").unwrap();
    editor.insert_text(&mut buffer, b"    println!(\"hi\");").unwrap();
    let full = text_of(&buffer);

    assert_eq!(editor.undo(&mut buffer).as_deref(), Some("insert"));
    assert_eq!(editor.undo(&mut buffer).as_deref(), Some("insert"));
    assert_eq!(text_of(&buffer), "fn main() {}\n");

    // A divergent edit displaces the redo chain but must not corrupt
    // the document.
    editor.set_cursor(0, 0);
    editor.insert_text(&mut buffer, b"// entry\n").unwrap();
    assert!(editor.redo(&mut buffer).is_none());
    assert_eq!(text_of(&buffer), "// entry\nfn main() {}\n");
    assert_ne!(text_of(&buffer), full);
}

/// Deterministic pseudo-random edits checked against a plain string
/// model: the rope and the model must agree after every step.
#[test]
fn random_edits_match_reference_model() {
    let mut buffer = TextBuffer::new();
    buffer.set_text(b"seed line\nsecond\n").unwrap();
    let mut model = String::from("seed line\nsecond\n");

    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for step in 0..400 {
        let chars: Vec<char> = model.chars().collect();
        let r = next();
        if r % 3 == 0 && !chars.is_empty() {
            // Delete a short range.
            let start = (next() as usize) % chars.len();
            let len = ((next() as usize) % 4).min(chars.len() - start);
            let end = start + len;
            buffer.delete_char_range(start, end).unwrap();
            model = chars[..start].iter().chain(chars[end..].iter()).collect();
        } else {
            // Insert a short run, sometimes with a newline.
            let at = if chars.is_empty() { 0 } else { (next() as usize) % (chars.len() + 1) };
            let insert = match r % 5 {
                0 => "x",
                1 => "ab",
                2 => "\n",
                3 => "w z",
                _ => "q\nr",
            };
            buffer.insert_at_char(at, insert.as_bytes()).unwrap();
            let mut rebuilt: String = chars[..at].iter().collect();
            rebuilt.push_str(insert);
            rebuilt.extend(chars[at..].iter());
            model = rebuilt;
        }
        assert_eq!(text_of(&buffer), model, "diverged at step {}", step);
        assert_eq!(buffer.char_count(), model.chars().count(), "chars at step {}", step);
        assert_eq!(buffer.line_count(), model.split('\n').count(), "lines at step {}", step);
    }
}

#[test]
fn viewport_slice_tracks_buffer_edits() {
    let mut buffer = buffer_with("a\nb\nc\nd");
    let mut view = View::new();
    view.set_viewport(Viewport { x: 0, y: 0, width: 20, height: 2 });
    assert_eq!(view.get_viewport_lines(&buffer).unwrap().len(), 2);

    buffer.insert_at_char(0, b"top\n").unwrap();
    let slice = view.get_viewport_lines(&buffer).unwrap();
    assert_eq!(slice.len(), 2);
    assert_eq!(slice[0].source_line, 0);
    assert_eq!(buffer.line_count(), 5);
}
