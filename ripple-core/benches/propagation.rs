//! Benchmarks for change propagation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{
    computed, reactive, watch, watch_sync_effect, EffectScope, LocalHost, Object, Ref, Value,
    WatchOptions, WatchSource,
};

fn bench_ref_set_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("ref_set_with_subscribers");
    for subscribers in [1, 10, 100] {
        let source = Ref::new(0_i64);
        let handles: Vec<_> = (0..subscribers)
            .map(|_| {
                let s = source.clone();
                watch_sync_effect(move |_| {
                    black_box(s.get());
                })
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    source.set(n)
                })
            },
        );

        for handle in handles {
            handle.stop();
        }
    }
    group.finish();
}

fn bench_computed_chain(c: &mut Criterion) {
    let base = Ref::new(0_i64);
    let mut tail = {
        let b = base.clone();
        computed(move || b.get() + 1)
    };
    for _ in 0..50 {
        let prev = tail.clone();
        tail = computed(move || prev.get() + 1);
    }

    c.bench_function("computed_chain_50", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            base.set(n);
            black_box(tail.get())
        })
    });
}

fn bench_deep_watch(c: &mut Criterion) {
    let root = Object::new();
    for i in 0..100 {
        root.insert(
            format!("item{i}"),
            Object::from_entries([("value", Value::from(i))]),
        );
    }
    let state = reactive(&root);

    c.bench_function("deep_watch_100_children", |b| {
        let view = state.clone();
        let handle = watch(
            WatchSource::getter(move || view.to_value()),
            |_, _, _| {},
            WatchOptions::default().deep(),
        );
        let leaf = state.child("item50").expect("item50 exists");
        let mut n = 0;
        b.iter(|| {
            n += 1;
            leaf.set("value", n);
        });
        handle.stop();
    });
}

fn bench_queued_flush(c: &mut Criterion) {
    let host = LocalHost::new();
    let scope = EffectScope::with_host(host.clone(), false);
    let sources: Vec<Ref<i64>> = (0..100).map(|_| Ref::new(0)).collect();
    scope.run(|| {
        for s in &sources {
            watch(s.clone(), |_, _, _| {}, WatchOptions::default());
        }
    });

    c.bench_function("pre_flush_100_watchers", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            for s in &sources {
                s.set(n);
            }
            host.tick()
        })
    });
    scope.stop();
}

criterion_group!(
    benches,
    bench_ref_set_with_subscribers,
    bench_computed_chain,
    bench_deep_watch,
    bench_queued_flush,
);
criterion_main!(benches);
