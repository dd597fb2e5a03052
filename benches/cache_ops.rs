//! Criterion benchmark: fingerprinting and cache set/get.
//! Run with: cargo bench --bench cache_ops

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::TempDir;
use voxcache::{fingerprint, AudioCache, CacheOptions, CachedAudio};

fn sample_audio(size: usize) -> CachedAudio {
    CachedAudio {
        audio: vec![0x55; size],
        duration_estimate: 4.2,
        text_preview: "The quick brown fox jumps over the lazy dog".to_string(),
        voice: "en-US-Standard-F".to_string(),
    }
}

fn bench_fingerprint(c: &mut Criterion) {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
    c.bench_function("fingerprint_900_chars", |b| {
        b.iter(|| fingerprint(black_box(&text), black_box("en-US-Standard-F")))
    });
}

fn bench_cache_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_ops");
    if std::env::var("QUICK").is_ok() {
        group
            .sample_size(10)
            .measurement_time(Duration::from_secs(2));
    } else {
        group.sample_size(20);
    }

    let tmp = TempDir::new().unwrap();
    let mut cache = AudioCache::open(CacheOptions::new(tmp.path()).with_max_size_mb(64.0)).unwrap();
    let value = sample_audio(32 * 1024);
    let key = fingerprint("hot line", "en-US-Standard-F");
    assert!(cache.set(&key, &value));

    group.bench_function("get_hit_32kb", |b| {
        b.iter(|| black_box(cache.get(black_box(&key), true)))
    });

    let mut n = 0u64;
    group.bench_function("set_32kb", |b| {
        b.iter(|| {
            n += 1;
            let key = fingerprint(&format!("line {}", n), "en-US-Standard-F");
            black_box(cache.set(&key, &value))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_cache_ops);
criterion_main!(benches);
