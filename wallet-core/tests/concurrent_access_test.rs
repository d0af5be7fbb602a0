//! Concurrent mutation tests
//!
//! Many tasks race on the same accounts through one DuckDB store. The
//! version guard must let exactly the non-conflicting writes through and
//! every successful write must have exactly one log record.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::sync::Barrier;
use uuid::Uuid;

use wallet_core::adapters::duckdb::DuckDbStore;
use wallet_core::config::LedgerSettings;
use wallet_core::ports::{AccountStore, TransactionLog};
use wallet_core::services::LedgerEngine;
use wallet_core::{Error, Principal, TransactionType};

/// Number of concurrent tasks for stress tests
const TASK_COUNT: usize = 8;

/// Upper bound on resubmissions for the retry test
const MAX_ATTEMPTS: usize = 200;

fn setup(temp_dir: &TempDir, settings: LedgerSettings) -> (Arc<DuckDbStore>, Arc<LedgerEngine>) {
    let store = DuckDbStore::new(&temp_dir.path().join("concurrent.duckdb")).unwrap();
    store.ensure_schema().unwrap();
    let store = Arc::new(store);
    let engine = Arc::new(LedgerEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        settings,
    ));
    (store, engine)
}

async fn create_account(store: &DuckDbStore, email: &str, balance: Decimal) -> Uuid {
    let account = store
        .upsert_profile(&Principal::new(Uuid::new_v4(), email))
        .await
        .unwrap();
    store.force_update_balance(account.id, balance).await.unwrap();
    account.id
}

/// Test: TASK_COUNT deposits start together against one account.
///
/// Conflicts are expected. Whatever succeeds must be reflected exactly once
/// in the balance and in the log, and nothing else may leak through.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_never_lose_updates() {
    let temp_dir = TempDir::new().unwrap();
    let (store, engine) = setup(&temp_dir, LedgerSettings::default());
    let account_id = create_account(&store, "ana@example.com", dec!(100)).await;

    let barrier = Arc::new(Barrier::new(TASK_COUNT));
    let mut handles = Vec::new();
    for i in 0..TASK_COUNT {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let amount = Decimal::from(i as u64 + 1);
            let result = engine
                .deposit_or_withdraw("ana@example.com", amount, TransactionType::Deposit)
                .await;
            (amount, result)
        }));
    }

    let mut credited = Decimal::ZERO;
    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        let (amount, result) = handle.await.unwrap();
        match result {
            Ok(_) => {
                credited += amount;
                successes += 1;
            }
            Err(Error::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error class: {}", e),
        }
    }

    println!("successes={} conflicts={}", successes, conflicts);
    assert!(successes >= 1);
    assert_eq!(successes + conflicts, TASK_COUNT);

    let account = store.get("ana@example.com").await.unwrap();
    assert_eq!(account.balance, dec!(100) + credited);
    assert_eq!(
        store.list_for_account(account_id).await.unwrap().len(),
        successes
    );
}

/// Test: callers that resubmit on conflict all get through eventually.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_on_conflict_converges() {
    let temp_dir = TempDir::new().unwrap();
    let (store, engine) = setup(&temp_dir, LedgerSettings::default());
    create_account(&store, "ana@example.com", dec!(0)).await;

    let mut handles = Vec::new();
    for _ in 0..TASK_COUNT {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            for _ in 0..MAX_ATTEMPTS {
                match engine
                    .deposit_or_withdraw("ana@example.com", dec!(1.5), TransactionType::Deposit)
                    .await
                {
                    Ok(_) => return true,
                    Err(e) if e.is_retryable() => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            false
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap(), "deposit never got through");
    }

    let expected = dec!(1.5) * Decimal::from(TASK_COUNT as u64);
    assert_eq!(store.get("ana@example.com").await.unwrap().balance, expected);
}

/// Test: concurrent withdrawals can never overdraw.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let temp_dir = TempDir::new().unwrap();
    let (store, engine) = setup(&temp_dir, LedgerSettings::default());
    create_account(&store, "ana@example.com", dec!(30)).await;

    let barrier = Arc::new(Barrier::new(TASK_COUNT));
    let mut handles = Vec::new();
    for _ in 0..TASK_COUNT {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine
                .deposit_or_withdraw("ana@example.com", dec!(20), TransactionType::Withdraw)
                .await
        }));
    }

    let mut withdrawn = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => withdrawn += 1,
            Err(Error::Conflict(_)) | Err(Error::Validation(_)) => {}
            Err(e) => panic!("unexpected error class: {}", e),
        }
    }

    assert!(withdrawn <= 1);
    let balance = store.get("ana@example.com").await.unwrap().balance;
    assert!(balance >= Decimal::ZERO);
    assert_eq!(balance, dec!(30) - dec!(20) * Decimal::from(withdrawn as u64));
}

/// Test: with the recipient leg guarded, transfers fanning into one account
/// conserve the total across all accounts.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guarded_transfers_conserve_total() {
    let temp_dir = TempDir::new().unwrap();
    let settings = LedgerSettings {
        guard_recipient_leg: true,
        ..LedgerSettings::default()
    };
    let (store, engine) = setup(&temp_dir, settings);

    create_account(&store, "sink@example.com", dec!(0)).await;
    for i in 0..TASK_COUNT {
        create_account(&store, &format!("user{}@example.com", i), dec!(10)).await;
    }

    let barrier = Arc::new(Barrier::new(TASK_COUNT));
    let mut handles = Vec::new();
    for i in 0..TASK_COUNT {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine
                .transfer(&format!("user{}@example.com", i), "sink@example.com", dec!(4))
                .await
        }));
    }

    let mut moved = 0u64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => moved += 1,
            Err(Error::Conflict(_)) => {}
            Err(e) => panic!("unexpected error class: {}", e),
        }
    }

    let mut total = store.get("sink@example.com").await.unwrap().balance;
    for i in 0..TASK_COUNT {
        total += store
            .get(&format!("user{}@example.com", i))
            .await
            .unwrap()
            .balance;
    }
    assert_eq!(total, dec!(10) * Decimal::from(TASK_COUNT as u64));
    assert_eq!(
        store.get("sink@example.com").await.unwrap().balance,
        dec!(4) * Decimal::from(moved)
    );
}
