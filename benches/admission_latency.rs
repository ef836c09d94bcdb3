use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use quota_gate_hub::bench_support::{bench_account_id, GateBenchFixture};
use quota_gate::{Account, OperationClass};

const HIGH_CEILING: u32 = u32::MAX;

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    group
        .sample_size(500)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3))
        .sampling_mode(SamplingMode::Auto);

    for (name, fixture) in [
        ("memory", GateBenchFixture::memory()),
        ("sqlite", GateBenchFixture::sqlite()),
    ] {
        group.bench_function(BenchmarkId::new("admit_release", name), |b| {
            let gate = fixture.gate.clone();
            let account = Account::free("bench-hot-account");
            b.iter(|| {
                let decision =
                    gate.admit_account(&account, OperationClass::Report, Some(HIGH_CEILING));
                if let Some(reservation) = &decision.reservation {
                    gate.release(reservation);
                }
                black_box(decision)
            });
        });

        group.bench_function(BenchmarkId::new("admit_rejected", name), |b| {
            let gate = fixture.gate.clone();
            let account = Account::free("bench-exhausted-account");
            b.iter(|| black_box(gate.admit_account(&account, OperationClass::Report, Some(0))));
        });

        group.bench_function(BenchmarkId::new("admit_spread_accounts", name), |b| {
            let gate = fixture.gate.clone();
            let counter = AtomicUsize::new(0);
            b.iter(|| {
                let index = counter.fetch_add(1, Ordering::Relaxed) % 10_000;
                let account = Account::free(bench_account_id(index));
                let decision =
                    gate.admit_account(&account, OperationClass::CvPolish, Some(HIGH_CEILING));
                if let Some(reservation) = &decision.reservation {
                    gate.commit(reservation);
                }
                black_box(decision)
            });
        });
    }

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    group.sample_size(50);

    for (name, fixture) in [
        ("memory", GateBenchFixture::memory()),
        ("sqlite", GateBenchFixture::sqlite()),
    ] {
        group.bench_function(BenchmarkId::new("same_account_8_threads", name), |b| {
            let gate = fixture.gate.clone();
            b.iter(|| {
                let barrier = Arc::new(Barrier::new(8));
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let gate = Arc::clone(&gate);
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            barrier.wait();
                            let decision = gate.admit_account(
                                &Account::free("bench-contended"),
                                OperationClass::CoverLetter,
                                Some(HIGH_CEILING),
                            );
                            if let Some(reservation) = &decision.reservation {
                                gate.release(reservation);
                            }
                            decision.admitted
                        })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.join().expect("join bench thread"));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(admission_latency, bench_admission, bench_contention);
criterion_main!(admission_latency);
