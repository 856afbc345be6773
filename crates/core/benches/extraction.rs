use criterion::{Criterion, black_box, criterion_group, criterion_main};
use distill_core::{clean_pdf_text, extract_from_html, reduce_long_content};

fn sample_page(paragraphs: usize) -> String {
    let mut body = String::new();
    for i in 0..paragraphs {
        body.push_str(&format!(
            "<p>Paragraph {} with enough prose to look like a real article. It keeps going with commas, clauses, and detail.</p>",
            i
        ));
    }
    format!(
        r#"<html><head><title>Bench</title></head><body><nav>nav</nav><article>{}</article><footer>f</footer></body></html>"#,
        body
    )
}

fn bench_extraction(c: &mut Criterion) {
    let small = sample_page(10);
    let large = sample_page(500);

    c.bench_function("extract_small_page", |b| {
        b.iter(|| extract_from_html(black_box(&small), "https://example.com/a"))
    });

    c.bench_function("extract_large_page", |b| {
        b.iter(|| extract_from_html(black_box(&large), "https://example.com/a"))
    });
}

fn bench_cleanup(c: &mut Criterion) {
    let noisy = "line one with   spacing-\ncontinuation Page 3 and dots...... 第 4 页\n\n\n\nnext".repeat(200);
    c.bench_function("clean_pdf_text", |b| b.iter(|| clean_pdf_text(black_box(&noisy))));

    let long = "0123456789".repeat(12_000);
    c.bench_function("reduce_long_content", |b| b.iter(|| reduce_long_content(black_box(&long))));
}

criterion_group!(benches, bench_extraction, bench_cleanup);
criterion_main!(benches);
