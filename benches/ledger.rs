use bee_ledger::Amount;
use bee_ledger::ledger;
use bee_ledger::model::{Account, Accounts};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

/// Every user starts with enough coins that no transfer fails.
fn funded(users: u32) -> Accounts {
    (0..users)
        .map(|i| {
            (
                format!("user-{i}"),
                Account {
                    balance: Amount::new(1_000_000),
                    first_topup_used: true,
                },
            )
        })
        .collect()
}

/// Pairs of (sender, receiver) walking the ring of users.
fn ring(users: u32, transfers: u32) -> Vec<(String, String)> {
    (0..transfers)
        .map(|i| {
            let from = i % users;
            let to = (i + 1) % users;
            (format!("user-{from}"), format!("user-{to}"))
        })
        .collect()
}

fn bench_transfers(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfers");

    for (users, transfers) in [(10, 10_000), (1_000, 10_000), (10_000, 100_000)] {
        let label = format!("{users}u_{transfers}tx");
        let pairs = ring(users, transfers);
        group.bench_with_input(BenchmarkId::from_parameter(&label), &users, |b, &users| {
            b.iter(|| {
                let mut accounts = funded(users);
                for (from, to) in &pairs {
                    let _ = black_box(ledger::transfer(&mut accounts, from, to, Amount::new(3)));
                }
                accounts
            });
        });
    }

    group.finish();
}

fn bench_credit_debit(c: &mut Criterion) {
    c.bench_function("credit_debit_100k", |b| {
        b.iter(|| {
            let mut accounts = Accounts::new();
            for i in 0..100_000u32 {
                let user = format!("user-{}", i % 500);
                let _ = black_box(ledger::credit(&mut accounts, &user, Amount::new(10)));
                let _ = black_box(ledger::debit(&mut accounts, &user, Amount::new(7)));
            }
            accounts
        });
    });
}

criterion_group!(benches, bench_transfers, bench_credit_debit);
criterion_main!(benches);
