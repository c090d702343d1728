use core_lexer::tokenize;
use core_report::Reporter;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn sample_script() -> String {
    let mut script = String::from("events.onflag() {\n");
    for i in 0..200 {
        script.push_str(&format!(
            "var.set(\"v{i}\", {i} + 2 * $seed - 3)\ncontrol.if($seed > {i} && !$done) {{\nlooks.say(op.join(\"row \", {i}))\n}}\n"
        ));
    }
    script.push_str("}\n");
    script
}

fn bench_tokenize(c: &mut Criterion) {
    let script = sample_script();
    c.bench_function("tokenize_800_statements", |b| {
        b.iter(|| {
            let mut reporter = Reporter::new();
            black_box(tokenize(black_box(&script), &mut reporter))
        })
    });
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
