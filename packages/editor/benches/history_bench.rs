use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trellis_editor::{parse_stylesheet, Breakpoint, EditorSession, EngineConfig, NodePath, SerializedNode};

fn cards(count: usize) -> SerializedNode {
    (0..count).fold(SerializedNode::element("body"), |body, n| {
        body.with_child(
            SerializedNode::element("div")
                .with_attr("class", "card")
                .with_attr("data-tr-id", format!("card-{}", n))
                .with_child(SerializedNode::text(format!("Card {}", n))),
        )
    })
}

fn session(count: usize) -> EditorSession {
    let sheet = parse_stylesheet(".card { width: 200px; padding: 4px 8px; }").unwrap();
    EditorSession::new(EngineConfig::default(), "bench.html", &cards(count), sheet).unwrap()
}

fn style_edit_benchmark(c: &mut Criterion) {
    c.bench_function("set_style_unique_selector", |b| {
        b.iter_batched(
            || session(50),
            |mut session| {
                let target = NodePath::from_id("card-25");
                session
                    .set_style(black_box(&target), "width", "350px", &[Breakpoint::base()])
                    .unwrap();
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn undo_redo_benchmark(c: &mut Criterion) {
    let mut session = session(50);
    for n in 0..50 {
        let target = NodePath::from_id(format!("card-{}", n));
        session
            .set_style(&target, "padding-left", &format!("{}px", n), &[Breakpoint::named("tablet")])
            .unwrap();
    }

    c.bench_function("undo_redo_50_rule_edits", |b| {
        b.iter(|| {
            while session.undo().unwrap().is_some() {}
            while session.redo().unwrap().is_some() {}
            black_box(session.history().undo_levels())
        })
    });
}

fn mirror_benchmark(c: &mut Criterion) {
    let mut session = session(200);
    session.activate_breakpoint(Breakpoint::named("tablet")).unwrap();
    session.activate_breakpoint(Breakpoint::named("mobile")).unwrap();
    let target = NodePath::from_id("card-100");

    let mut n = 0u64;
    c.bench_function("attribute_edit_with_two_mirrors", |b| {
        b.iter(|| {
            n += 1;
            session
                .set_attribute(black_box(&target), "title", Some(&n.to_string()))
                .unwrap()
        })
    });
}

criterion_group!(benches, style_edit_benchmark, undo_redo_benchmark, mirror_benchmark);
criterion_main!(benches);
