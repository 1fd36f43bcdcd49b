//! Event Channel Integration Tests
//!
//! Tests for the channel that carries controller events from worker threads
//! to async callers.
//!
//! # Test Scenarios
//! - Channel creation and basic communication
//! - Event ordering across a worker thread
//! - Multiple publishers
//! - Capacity and drop behaviour
//!
//! Run with: `cargo test -p common --test event_channel_tests`

use common::channel::EVENT_CHANNEL_CAPACITY;
use common::{ControllerEvent, create_event_channel};
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Basic Flow
// ============================================================================

#[test]
fn test_create_event_channel() {
    let (tx, rx) = create_event_channel();
    drop(tx);
    assert!(rx.try_recv().is_none());
}

#[tokio::test]
async fn test_measurements_arrive_in_order() {
    let (tx, rx) = create_event_channel();

    let worker = thread::spawn(move || {
        for step in 0..10u32 {
            tx.publish(ControllerEvent::MeasurementReady {
                step,
                magnitude: step * 2,
                phase: step * 3,
            });
        }
    });

    for expected in 0..10u32 {
        let event = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match event {
            ControllerEvent::MeasurementReady { step, magnitude, phase } => {
                assert_eq!(step, expected);
                assert_eq!(magnitude, expected * 2);
                assert_eq!(phase, expected * 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    worker.join().unwrap();
}

#[test]
fn test_recv_blocking_from_thread() {
    let (tx, rx) = create_event_channel();
    let reader = thread::spawn(move || rx.recv_blocking().unwrap());

    tx.publish(ControllerEvent::Disconnected);
    assert_eq!(reader.join().unwrap(), ControllerEvent::Disconnected);
}

// ============================================================================
// Multiple Publishers
// ============================================================================

#[test]
fn test_cloned_senders_share_channel() {
    let (tx, rx) = create_event_channel();
    let hotplug = tx.clone();

    let a = thread::spawn(move || tx.publish(ControllerEvent::Connected));
    let b = thread::spawn(move || {
        hotplug.publish(ControllerEvent::ScanHalted {
            step: 1,
            reason: "write failed".to_string(),
        })
    });
    a.join().unwrap();
    b.join().unwrap();

    let events = rx.drain();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&ControllerEvent::Connected));
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_full_channel_drops_instead_of_blocking() {
    let (tx, rx) = create_event_channel();

    for _ in 0..EVENT_CHANNEL_CAPACITY + 10 {
        tx.publish(ControllerEvent::Connected);
    }

    assert_eq!(rx.drain().len(), EVENT_CHANNEL_CAPACITY);
}

#[tokio::test]
async fn test_recv_fails_after_all_senders_dropped() {
    let (tx, rx) = create_event_channel();
    drop(tx);

    assert!(rx.recv().await.is_err());
}
