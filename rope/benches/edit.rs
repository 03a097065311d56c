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

use weft_rope::{Segment, SegmentBuilder, SegmentRope};

fn build_document(lines: usize, cols: usize) -> SegmentRope {
    let mut b = SegmentBuilder::new();
    for i in 0..lines {
        if i > 0 {
            b.push(Segment::Break);
        }
        b.push(Segment::LineStart);
        b.push(Segment::text(0, i * cols, (i + 1) * cols, cols as u32));
    }
    b.build()
}

fn benchmark_bulk_build(c: &mut Criterion) {
    c.bench_function("benchmark_bulk_build_100k_lines", |b| {
        b.iter(|| build_document(black_box(100_000), 80))
    });
}

fn benchmark_mid_document_edit(c: &mut Criterion) {
    let rope = build_document(100_000, 80);
    let insert = {
        let mut b = SegmentBuilder::new();
        b.push(Segment::Break);
        b.push(Segment::LineStart);
        b.push(Segment::text(1, 0, 5, 5));
        b.build()
    };
    c.bench_function("benchmark_mid_document_edit", |b| {
        b.iter(|| {
            let mut copy = rope.clone();
            let mid = copy.len() / 2;
            copy.edit(mid..mid, black_box(insert.clone()));
            copy
        })
    });
}

fn benchmark_line_lookup(c: &mut Criterion) {
    let rope = build_document(100_000, 80);
    c.bench_function("benchmark_line_lookup", |b| {
        b.iter(|| {
            let mut total = 0;
            for line in (0..100_000).step_by(1000) {
                total += rope.line_content_start(black_box(line));
            }
            total
        })
    });
}

criterion_group!(
    benches,
    benchmark_bulk_build,
    benchmark_mid_document_edit,
    benchmark_line_lookup
);
criterion_main!(benches);
