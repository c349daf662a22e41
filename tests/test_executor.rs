//! Tests for the worker executor pool

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use palisade::executor::ExecutorPool;

#[test]
fn test_pool_reports_size() {
    let pool = ExecutorPool::new(3, false).unwrap();
    assert_eq!(pool.size(), 3);
    pool.stop();
}

#[test]
fn test_pool_minimum_one_worker() {
    let pool = ExecutorPool::new(0, false).unwrap();
    assert_eq!(pool.size(), 1);
    pool.stop();
}

#[test]
fn test_get_executor_round_robin() {
    let pool = ExecutorPool::new(2, false).unwrap();

    // Two consecutive grabs land on the two distinct workers, the third
    // wraps back around to the first
    let a = pool.get_executor();
    let b = pool.get_executor();
    let c = pool.get_executor();

    assert_ne!(a.handle().id(), b.handle().id());
    assert_eq!(a.handle().id(), c.handle().id());

    pool.stop();
}

#[test]
fn test_spawned_tasks_run_on_workers() {
    let pool = ExecutorPool::new(2, false).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = std::sync::mpsc::channel();

    for _ in 0..10 {
        let counter = Arc::clone(&counter);
        let tx = tx.clone();
        pool.get_executor().spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });
    }

    for _ in 0..10 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10);

    pool.stop();
}

#[test]
fn test_workers_drive_timers() {
    let pool = ExecutorPool::new(1, false).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    pool.get_executor().spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(());
    });

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    pool.stop();
}

#[test]
fn test_stop_is_idempotent() {
    let pool = ExecutorPool::new(2, false).unwrap();
    pool.stop();
    pool.stop();
}

#[test]
fn test_run_returns_after_stop() {
    let pool = Arc::new(ExecutorPool::new(2, false).unwrap());

    let runner = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || pool.run())
    };

    std::thread::sleep(Duration::from_millis(50));
    pool.stop();

    runner.join().unwrap();
}
