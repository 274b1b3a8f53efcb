use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use thermal_core::{FULL_SCALE, PidCfg, PidRegulator, PidState, SensorKind, ThermistorModel};

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // Quick runs without CLI flags:
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p thermal_core --bench conversion
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_conversion(c: &mut Criterion) {
    let mut g = c.benchmark_group("conversion");
    configure(&mut g);

    let thermistor = SensorKind::Thermistor(ThermistorModel::default());
    let linear = SensorKind::Linear {
        gain: 0.0625,
        offset: 0.0,
    };
    let raws: Vec<u16> = (0..FULL_SCALE).step_by(7).collect();
    let temps: Vec<f32> = (0..3000).map(|i| i as f32 * 0.1).collect();

    for (name, sensor) in [("thermistor", thermistor), ("linear", linear)] {
        g.bench_function(format!("raw_to_celsius_{name}"), |b| {
            b.iter(|| {
                for &r in &raws {
                    black_box(sensor.raw_to_celsius(black_box(r)));
                }
            })
        });
        g.bench_function(format!("celsius_to_raw_{name}"), |b| {
            b.iter(|| {
                for &t in &temps {
                    black_box(sensor.celsius_to_raw(black_box(t)));
                }
            })
        });
    }
    g.finish();
}

pub fn bench_pid(c: &mut Criterion) {
    let mut g = c.benchmark_group("pid");
    configure(&mut g);
    let reg = PidRegulator::new(&PidCfg::default(), 0.131);
    let inputs: Vec<f32> = (0..10_000).map(|i| 190.0 + (i as f32 * 0.01).sin() * 12.0).collect();

    g.bench_function("compute_in_band", |b| {
        b.iter_batched(
            PidState::default,
            |mut s| {
                for &x in &inputs {
                    black_box(reg.compute(&mut s, 200.0, black_box(x)));
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(conversion, bench_conversion, bench_pid);
criterion_main!(conversion);
