//! Hot-path benchmarks
//!
//! Measures performance of:
//! - Rate limiter admission for one hot client and many distinct clients
//! - Circuit breaker permit acquisition while closed
//! - Audit digests

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ragguard_core::{AuditDigest, CircuitBreaker, RateLimiter};
use std::time::Duration;

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");

    let limiter = RateLimiter::new(u32::MAX, Duration::from_secs(60));
    group.bench_function("single_client", |b| {
        b.iter(|| black_box(limiter.admit(black_box("203.0.113.7"))))
    });

    for clients in [100usize, 10_000] {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let ids: Vec<String> = (0..clients).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
        group.throughput(Throughput::Elements(clients as u64));
        group.bench_with_input(BenchmarkId::new("many_clients", clients), &ids, |b, ids| {
            b.iter(|| {
                for id in ids {
                    black_box(limiter.admit(id));
                }
            })
        });
    }

    group.finish();
}

fn bench_breaker(c: &mut Criterion) {
    let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
    c.bench_function("breaker_acquire_closed", |b| {
        b.iter(|| {
            if let Ok(permit) = breaker.acquire() {
                permit.succeed();
            }
        })
    });
}

fn bench_digest(c: &mut Criterion) {
    let digest = AuditDigest::new(Some("pepper"));
    let question = "Quais são os requisitos de criptografia para dados em repouso?";
    c.bench_function("audit_digest", |b| b.iter(|| black_box(digest.digest(black_box(question)))));
}

criterion_group!(benches, bench_admission, bench_breaker, bench_digest);
criterion_main!(benches);
