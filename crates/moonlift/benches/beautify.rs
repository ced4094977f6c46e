use criterion::{Criterion, black_box, criterion_group, criterion_main};
use moonlift::{Settings, beautify, decompile};

/// A synthetic script exercising every statement kind the pipeline lowers.
fn sample_source() -> String {
    let mut src = String::new();
    for i in 0..50 {
        src.push_str(&format!(
            "local v{i} = {i} + 1\n\
             while v{i} do\n\
               if v{i} > 10 then v{i} = v{i} - 1 else break end\n\
             end\n\
             for j = 1, v{i} do v{i} = v{i} + j end\n"
        ));
    }
    src
}

fn bench_beautify(c: &mut Criterion) {
    let src = sample_source();
    // sanity: the input must actually go through the pipeline
    beautify(&src, &Settings::default()).expect("benchmark source beautifies");

    c.bench_function("beautify_plain", |b| {
        b.iter(|| black_box(beautify(black_box(&src), &Settings::default()).expect("beautify")));
    });

    let fold = Settings {
        fold_constants: true,
        ..Settings::default()
    };
    c.bench_function("beautify_folded", |b| {
        b.iter(|| black_box(beautify(black_box(&src), &fold).expect("beautify")));
    });

    c.bench_function("decompile_via_ssa", |b| {
        b.iter(|| black_box(decompile(black_box(&src)).expect("decompile")));
    });
}

criterion_group!(benches, bench_beautify);
criterion_main!(benches);
