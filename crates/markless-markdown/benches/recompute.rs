use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use markless_core::config::EditorFontConfig;
use markless_core::config::MarklessConfig;
use markless_core::host::ActiveDocument;
use markless_core::host::MemoryHost;
use markless_core::theme::ThemeKind;
use markless_markdown::controller::Controller;
use markless_markdown::parse::parse;

fn sample_markdown(sections: usize) -> String {
    let mut s = String::new();
    for i in 0..sections {
        s.push_str(&format!("# Section {i}\n\n"));
        s.push_str("Some text with `inline code` and $x^2 + y^2$ in it.\n\n");
        s.push_str("> A quoted line\n> and another\n\n");
        s.push_str("- first\n  - nested\n    - deeper\n- second\n\n");
        s.push_str("![diagram](img/diagram.png)\n\n");
        s.push_str("```mermaid\ngraph TD\n  A-->B\n```\n\n");
    }
    s
}

fn bench_parse(c: &mut Criterion) {
    let md = sample_markdown(40);
    c.bench_function("recompute/parse", |b| {
        b.iter(|| {
            let root = parse(black_box(&md));
            black_box(root.children.len());
        })
    });
}

fn bench_full_pass(c: &mut Criterion) {
    let md = sample_markdown(40);
    c.bench_function("recompute/full_pass", |b| {
        b.iter(|| {
            let mut host = MemoryHost::with_document(ActiveDocument::markdown(md.as_str()));
            let mut controller = Controller::new(
                MarklessConfig::default(),
                EditorFontConfig::default(),
                ThemeKind::Dark,
            );
            black_box(controller.recompute(&mut host));
        })
    });
}

fn bench_unchanged_pass(c: &mut Criterion) {
    let md = sample_markdown(40);
    let mut host = MemoryHost::with_document(ActiveDocument::markdown(md.as_str()));
    let mut controller = Controller::new(
        MarklessConfig::default(),
        EditorFontConfig::default(),
        ThemeKind::Dark,
    );
    controller.recompute(&mut host);
    c.bench_function("recompute/unchanged", |b| {
        b.iter(|| black_box(controller.recompute(&mut host)))
    });
}

fn bench_large_document_window(c: &mut Criterion) {
    let md = sample_markdown(400);
    let mut host = MemoryHost::with_document(ActiveDocument::markdown(md.as_str()));
    host.set_visible_lines(2000..2050);
    let mut controller = Controller::new(
        MarklessConfig::default(),
        EditorFontConfig::default(),
        ThemeKind::Dark,
    );
    c.bench_function("recompute/large_document_window", |b| {
        b.iter(|| black_box(controller.recompute(&mut host)))
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_full_pass,
    bench_unchanged_pass,
    bench_large_document_window
);
criterion_main!(benches);
