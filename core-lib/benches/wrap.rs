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

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use weft_core_lib::{TextBuffer, View, WrapMode};

fn prose(lines: usize) -> String {
    let line = "the quick brown fox jumps over the lazy dog while the terminal wraps it ";
    let mut s = String::new();
    for _ in 0..lines {
        s.push_str(line);
        s.push_str(line);
        s.push('\n');
    }
    s
}

fn benchmark_ingest(c: &mut Criterion) {
    let text = prose(10_000);
    c.bench_function("benchmark_ingest_10k_lines", |b| {
        b.iter(|| {
            let mut buffer = TextBuffer::new();
            buffer.set_text(black_box(text.as_bytes())).unwrap();
            buffer
        })
    });
}

fn benchmark_word_wrap_rebuild(c: &mut Criterion) {
    let mut buffer = TextBuffer::new();
    buffer.set_text(prose(10_000).as_bytes()).unwrap();
    c.bench_function("benchmark_word_wrap_rebuild", |b| {
        b.iter(|| {
            let mut view = View::new();
            view.set_wrap_mode(WrapMode::Word);
            view.set_wrap_width(Some(black_box(60))).unwrap();
            view.get_virtual_lines(&buffer).unwrap().len()
        })
    });
}

fn benchmark_span_materialization(c: &mut Criterion) {
    let mut buffer = TextBuffer::new();
    buffer.set_text(prose(100).as_bytes()).unwrap();
    for line in 0..100 {
        for i in 0..8u32 {
            let start = (i as usize) * 15;
            buffer.add_highlight(line, start, start + 10, i + 1, (i % 4) as u8, 0).unwrap();
        }
    }
    c.bench_function("benchmark_span_materialization", |b| {
        b.iter(|| {
            let mut total = 0;
            for line in 0..100 {
                total += buffer.get_line_spans(black_box(line)).unwrap().len();
            }
            total
        })
    });
}

criterion_group!(
    benches,
    benchmark_ingest,
    benchmark_word_wrap_rebuild,
    benchmark_span_materialization
);
criterion_main!(benches);
