use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use citadel_css_sanitizer::{parse_css_block, xss_entity_decode, CssSanitizer, SanitizerConfig};

fn sanitize_newsletter(c: &mut Criterion) {
    let sanitizer = CssSanitizer::new(SanitizerConfig::new("rcmbody")).unwrap();

    let css = r#"
        body { margin: 0; padding: 0; background-color: #f4f4f4; }
        h1, h2, h3 { font-family: Georgia, "Times New Roman", serif; color: #333; }
        .header { background: url(data:image/png;base64,iVBORw0KGgo=) no-repeat; }
        .footer { position: fixed; bottom: 0; }
        table[class=w600] td { padding: 4px 8px; }
        @media only screen and (max-width: 600px) {
            body { width: 100% !important; }
            table[class=w600] { width: 100% !important; }
        }
    "#;

    c.bench_function("sanitize_newsletter", |b| {
        b.iter(|| {
            sanitizer.sanitize(black_box(css));
        })
    });
}

fn sanitize_hostile(c: &mut Criterion) {
    let sanitizer = CssSanitizer::new(SanitizerConfig::new("rcmbody").with_prefix("m")).unwrap();

    let css = r#"
        p { left: exp/**/ression(alert(1)); background: \75 \72 \6C (javascript:alert(1)); }
        .x { content: '</style><img src=x onerror=alert(1)>'; behavior: url(x.htc); }
        a[href] { background: image-set('//evil.test/a.png' 1x); position: fixed; }
    "#;

    c.bench_function("sanitize_hostile", |b| {
        b.iter(|| {
            sanitizer.sanitize(black_box(css));
        })
    });
}

fn decode_and_tokenize(c: &mut Criterion) {
    let style = "color: red; font-family: &quot;Arial&quot;; background: u\\r\\l(data:image/gif;base64,R0lGOD==); margin: 0 auto";

    c.bench_function("decode_and_tokenize", |b| {
        b.iter(|| {
            parse_css_block(&xss_entity_decode(black_box(style)));
        })
    });
}

/// Running time must grow linearly with pathological input size
fn pathological_linearity(c: &mut Criterion) {
    let sanitizer = CssSanitizer::new(SanitizerConfig::new("c")).unwrap();
    let mut group = c.benchmark_group("pathological_linearity");

    for size in [1_000usize, 10_000, 100_000] {
        let parens = format!("p {{ x: {} }}", "url(".repeat(size / 4));
        let nested = format!("p {}{}", "{ a ".repeat(size / 4), "}".repeat(size / 4));
        let quotes = format!("p {{ content: {} }}", "'\\'".repeat(size / 3));

        group.bench_with_input(BenchmarkId::new("parens", size), &parens, |b, css| {
            b.iter(|| sanitizer.sanitize(black_box(css)))
        });
        group.bench_with_input(BenchmarkId::new("nested_blocks", size), &nested, |b, css| {
            b.iter(|| sanitizer.sanitize(black_box(css)))
        });
        group.bench_with_input(BenchmarkId::new("quotes", size), &quotes, |b, css| {
            b.iter(|| sanitizer.sanitize(black_box(css)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    sanitize_newsletter,
    sanitize_hostile,
    decode_and_tokenize,
    pathological_linearity
);
criterion_main!(benches);
