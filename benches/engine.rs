use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use txs_ledger::{Account, EngineConfig, Store, StoreConfig, TransferEngine, TransferRequest};

/// Generates transfer requests cycling money around a ring of accounts.
///
/// Every `replay_every`-th request reuses the previous key (0 = never).
pub struct RequestGenerator {
    next_key: u64,
    num_accounts: u32,
    remaining: u64,
    replay_every: u64,
}

impl RequestGenerator {
    pub fn new(num_accounts: u32, count: u64, replay_every: u64) -> Self {
        Self {
            next_key: 0,
            num_accounts,
            remaining: count,
            replay_every,
        }
    }
}

impl Iterator for RequestGenerator {
    type Item = TransferRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let replay = self.replay_every > 0
            && self.next_key > 0
            && self.remaining % self.replay_every == 0;
        let key = if replay { self.next_key - 1 } else { self.next_key };
        if !replay {
            self.next_key += 1;
        }

        let from = (key % self.num_accounts as u64) as u32;
        let to = (from + 1) % self.num_accounts;
        Some(TransferRequest::new(
            format!("bench-{key}"),
            format!("acct-{from}"),
            format!("acct-{to}"),
            1,
        ))
    }
}

fn setup(rt: &Runtime, num_accounts: u32) -> (TransferEngine, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        url: format!("sqlite://{}", dir.path().join("bench.db").display()),
        ..StoreConfig::default()
    };
    let engine = rt.block_on(async {
        let store = Store::connect(&config).await.unwrap();
        store.bootstrap().await.unwrap();
        store
            .seed((0..num_accounts).map(|i| Account::new(format!("acct-{i}"), 1_000_000)))
            .await
            .unwrap();
        TransferEngine::new(store, EngineConfig::default())
    });
    (engine, dir)
}

fn bench_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, _dir) = setup(&rt, 2);
    let counter = AtomicU64::new(0);

    let mut group = c.benchmark_group("execute");

    group.bench_function("fresh_key", |b| {
        b.to_async(&rt).iter(|| async {
            let key = format!("fresh-{}", counter.fetch_add(1, Ordering::Relaxed));
            black_box(engine.execute(key, "acct-0", "acct-1", 1).await)
        });
    });

    rt.block_on(engine.execute("replayed", "acct-0", "acct-1", 1));
    group.bench_function("replayed_key", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(engine.execute("replayed", "acct-0", "acct-1", 1).await)
        });
    });

    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("run");
    group.sample_size(10);

    for (accounts, replay_every) in [(2u32, 0u64), (100, 0), (100, 4)] {
        let label = format!("{accounts}acct_replay{replay_every}");
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(accounts, replay_every),
            |b, &(accounts, replay_every)| {
                b.iter_batched(
                    || setup(&rt, accounts),
                    |(engine, dir)| {
                        let requests = RequestGenerator::new(accounts, 1_000, replay_every);
                        let summary = rt.block_on(engine.run(tokio_stream::iter(requests)));
                        black_box(summary);
                        drop(dir);
                    },
                    BatchSize::PerIteration,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_execute, bench_run);
criterion_main!(benches);
