use criterion::{Criterion, criterion_group, criterion_main};
use mf_flows::transforms::MaskKind;
use mf_flows::{Flow, LayerConfig, LinearInit, NullReporter, PieConfig, build_pie_with_reporter};
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

fn bench_pie(c: &mut Criterion) {
    let mut cfg = PieConfig::new(16, 4);
    cfg.seed = 7;
    cfg.outer = vec![
        LayerConfig::ActNorm,
        LayerConfig::AffineCoupling { hidden: 32, layers: 2, mask: MaskKind::Even },
        LayerConfig::Linear { init: LinearInit::RandomOrthogonal },
        LayerConfig::AffineCoupling { hidden: 32, layers: 2, mask: MaskKind::Odd },
    ];
    cfg.inner = vec![LayerConfig::AffineCoupling { hidden: 16, layers: 1, mask: MaskKind::Even }];
    let pie = build_pie_with_reporter(&cfg, &NullReporter).unwrap();

    let x = DMatrix::from_fn(512, 16, |i, j| (((i * 16 + j) % 97) as f64) * 0.02 - 1.0);

    c.bench_function("pie_log_prob_512x16", |b| {
        b.iter(|| black_box(pie.log_prob(black_box(&x), false, None).unwrap()))
    });

    c.bench_function("pie_log_prob_slice_512x16", |b| {
        b.iter(|| black_box(pie.log_prob(black_box(&x), true, None).unwrap()))
    });

    c.bench_function("pie_sample_512", |b| {
        let mut rng = StdRng::seed_from_u64(0);
        b.iter(|| black_box(pie.sample(None, 512, None, true, &mut rng).unwrap()))
    });
}

criterion_group!(benches, bench_pie);
criterion_main!(benches);
