use balance_keeper::db::Database;
use balance_keeper::{NewAccount, TransactionProcessor};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rust_decimal::Decimal;
use std::time::Duration;

const DEPOSITS: usize = 1_000;
const THREADS: usize = 8;

fn setup(accounts: usize) -> (TransactionProcessor, Vec<String>) {
    let processor = TransactionProcessor::new(&Database::in_memory("bench")).unwrap();
    let ids = (0..accounts)
        .map(|i| {
            processor
                .accounts()
                .create(NewAccount {
                    name: format!("bench{i}"),
                    email: format!("bench{i}@example.com"),
                    initial_balance: Decimal::ZERO,
                })
                .unwrap()
                .id
                .to_string()
        })
        .collect();
    (processor, ids)
}

fn process_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");

    group.throughput(Throughput::Elements(DEPOSITS as u64));
    group.measurement_time(Duration::from_secs(20));
    group.sample_size(20);

    group.bench_function("sequential_1K_deposits_one_account", |b| {
        b.iter_with_setup(
            || setup(1),
            |(processor, ids)| {
                for _ in 0..DEPOSITS {
                    processor.apply(&ids[0], "DEPOSIT", Decimal::ONE).unwrap();
                }
            },
        );
    });

    group.bench_function("contended_1K_deposits_one_account", |b| {
        b.iter_with_setup(
            || setup(1),
            |(processor, ids)| {
                std::thread::scope(|s| {
                    for _ in 0..THREADS {
                        s.spawn(|| {
                            for _ in 0..DEPOSITS / THREADS {
                                processor.apply(&ids[0], "DEPOSIT", Decimal::ONE).unwrap();
                            }
                        });
                    }
                });
            },
        );
    });

    group.bench_function("parallel_1K_deposits_8_accounts", |b| {
        b.iter_with_setup(
            || setup(THREADS),
            |(processor, ids)| {
                std::thread::scope(|s| {
                    for id in &ids {
                        let processor = &processor;
                        s.spawn(move || {
                            for _ in 0..DEPOSITS / THREADS {
                                processor.apply(id, "DEPOSIT", Decimal::ONE).unwrap();
                            }
                        });
                    }
                });
            },
        );
    });

    group.finish();
}

criterion_group!(benches, process_transactions);
criterion_main!(benches);
