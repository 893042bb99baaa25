//! Concurrent write tests
//!
//! The engine owns two conditional writes: the versioned budget alert state
//! and the goal celebration flag. These tests race many threads against one
//! gateway and check that exactly one writer wins each race.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{NaiveDate, Utc};
use tempfile::TempDir;

use nudge_core::adapters::duckdb::DuckDbGateway;
use nudge_core::domain::{AlertStateKey, BillingPeriod, BudgetAlertState, Goal};

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 8;

fn create_test_gateway(temp_dir: &TempDir) -> Arc<DuckDbGateway> {
    let db_path = temp_dir.path().join("test_concurrent.duckdb");
    let gateway = DuckDbGateway::new(&db_path).unwrap();
    gateway.ensure_schema().unwrap();
    Arc::new(gateway)
}

fn test_key() -> AlertStateKey {
    let period = BillingPeriod::containing(NaiveDate::from_ymd_opt(2024, 11, 15).unwrap());
    AlertStateKey::new("user-1", "dining", period)
}

/// Run `op` on every thread at once, returning how many calls reported success
fn race<F>(op: F) -> (usize, usize)
where
    F: Fn(usize) -> nudge_core::domain::result::Result<bool> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let op = Arc::new(op);
    let won = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let op = Arc::clone(&op);
            let won = Arc::clone(&won);
            let errors = Arc::clone(&errors);
            thread::spawn(move || {
                barrier.wait();
                match op(thread_id) {
                    Ok(true) => {
                        won.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        println!("Thread {}: error: {}", thread_id, e);
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    (won.load(Ordering::SeqCst), errors.load(Ordering::SeqCst))
}

/// Every thread saw "no state yet" and tries to create it; one insert wins
#[test]
fn test_first_alert_state_insert_has_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = create_test_gateway(&temp_dir);

    let shared = Arc::clone(&gateway);
    let (won, errors) = race(move |thread_id| {
        let state = BudgetAlertState {
            last_percentage: 80 + thread_id as i64,
            last_alert_date: Utc::now(),
        };
        shared.compare_and_set_alert_state(&test_key(), &state, None)
    });

    assert_eq!(errors, 0);
    assert_eq!(won, 1, "exactly one creator should win");

    let stored = gateway.load_alert_state(&test_key()).unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

/// Every thread read version 1 and tries to advance it; one update wins
#[test]
fn test_versioned_update_has_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = create_test_gateway(&temp_dir);
    let initial = BudgetAlertState {
        last_percentage: 85,
        last_alert_date: Utc::now(),
    };
    assert!(gateway
        .compare_and_set_alert_state(&test_key(), &initial, None)
        .unwrap());

    let shared = Arc::clone(&gateway);
    let (won, errors) = race(move |_| {
        let state = BudgetAlertState {
            last_percentage: 104,
            last_alert_date: Utc::now(),
        };
        shared.compare_and_set_alert_state(&test_key(), &state, Some(1))
    });

    assert_eq!(errors, 0);
    assert_eq!(won, 1, "exactly one updater should win");

    let stored = gateway.load_alert_state(&test_key()).unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.state.last_percentage, 104);
}

/// The stored percentage never moves down, even with a matching version
#[test]
fn test_update_cannot_lower_percentage() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = create_test_gateway(&temp_dir);
    let high = BudgetAlertState {
        last_percentage: 101,
        last_alert_date: Utc::now(),
    };
    assert!(gateway
        .compare_and_set_alert_state(&test_key(), &high, None)
        .unwrap());

    let low = BudgetAlertState {
        last_percentage: 82,
        last_alert_date: Utc::now(),
    };
    assert!(!gateway
        .compare_and_set_alert_state(&test_key(), &low, Some(1))
        .unwrap());
    let stored = gateway.load_alert_state(&test_key()).unwrap().unwrap();
    assert_eq!(stored.state.last_percentage, 101);
}

/// Overlapping daily runs flip the celebration flag once
#[test]
fn test_goal_celebration_flag_flips_once() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = create_test_gateway(&temp_dir);
    let goal = Goal::new("user-1", "Emergency fund").complete();
    gateway.upsert_goal(&goal).unwrap();

    let shared = Arc::clone(&gateway);
    let goal_id = goal.goal_id.clone();
    let (won, errors) = race(move |_| shared.mark_goal_celebrated("user-1", &goal_id));

    assert_eq!(errors, 0);
    assert_eq!(won, 1);
    let goals = gateway.load_goals("user-1").unwrap();
    assert!(goals[0].celebration_sent);
}
