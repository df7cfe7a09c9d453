use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use csv_paged::{dialect::Dialect, parser::Tokenizer};

fn sample_lines(rows: usize) -> Vec<String> {
    (0..rows)
        .map(|i| format!("{i},name_{i},\"quoted, field {i}\",{}.5,true", i % 100))
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let lines = sample_lines(10_000);
    let mut group = c.benchmark_group("tokenize_10k_rows");

    group.bench_function("state_machine", |b| {
        b.iter(|| {
            let mut tokenizer = Tokenizer::new(Dialect::default());
            let mut fields = 0usize;
            for line in &lines {
                tokenizer.feed_line(black_box(line)).unwrap();
                fields += tokenizer.field_count();
            }
            black_box(fields)
        })
    });

    let joined = {
        let mut buf = String::new();
        for line in &lines {
            buf.push_str(line);
            buf.push('\n');
        }
        buf
    };
    group.bench_function("csv_crate", |b| {
        b.iter(|| {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(black_box(joined.as_bytes()));
            let mut record = csv::StringRecord::new();
            let mut fields = 0usize;
            while reader.read_record(&mut record).unwrap() {
                fields += record.len();
            }
            black_box(fields)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
