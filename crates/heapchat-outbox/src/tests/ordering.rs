//! Ordering guarantees.
//!
//! - Commands accepted on their first attempt arrive in submission order
//! - Enqueues during an active drain land behind what is already queued
//! - Tail placement lets later commands overtake a retried one
//! - Head placement keeps submission order at the cost of blocking

use super::harness::{settle, TestChannel};
use crate::{ChannelConfig, DeliveryEvent, RetryPlacement};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_ready_channel_delivers_in_submission_order() {
    let harness = TestChannel::ready();

    let expected: Vec<String> = (0..10).map(|i| format!("user-{i}")).collect();
    for user in &expected {
        harness.login(user);
    }

    harness.wait_idle().await;

    assert_eq!(harness.received_user_ids(), expected);
    assert_eq!(harness.transport.attempt_count(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_during_drain_appends_behind() {
    let harness = TestChannel::ready();

    harness.login("a");
    assert!(harness.channel.is_draining());

    // Drain task has not run yet; these only append.
    harness.login("b");
    harness.login("c");
    assert_eq!(harness.channel.pending(), 3);

    settle().await;

    assert_eq!(harness.received_user_ids(), vec!["a", "b", "c"]);
    assert!(!harness.channel.is_draining());
}

#[tokio::test(start_paused = true)]
async fn test_tail_retry_lets_later_commands_overtake() {
    let mut harness = TestChannel::ready();
    harness.transport.reject_next(1);

    let first = harness.login("first");
    let second = harness.login("second");

    let event = harness.next_event().await;
    assert!(matches!(event, DeliveryEvent::Retrying { id, attempt: 1, .. } if id == first));

    harness.wait_idle().await;

    // "first" failed once and was moved behind "second".
    assert_eq!(harness.received_user_ids(), vec!["second", "first"]);

    let mut delivered = Vec::new();
    while let Ok(event) = harness.events.try_recv() {
        if let DeliveryEvent::Delivered { id, attempts, .. } = event {
            delivered.push((id, attempts));
        }
    }
    assert_eq!(delivered, vec![(second, 1), (first, 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_head_retry_preserves_submission_order() {
    let harness = TestChannel::ready_with_config(ChannelConfig {
        retry_placement: RetryPlacement::Head {
            max_stall: Duration::from_secs(10),
        },
        ..Default::default()
    });
    harness.transport.reject_next(1);

    harness.login("first");
    harness.login("second");

    settle().await;
    // "first" is backing off at the head and "second" waits behind it.
    assert_eq!(harness.transport.received_count(), 0);
    assert_eq!(harness.channel.pending(), 2);

    harness.wait_idle().await;
    assert_eq!(harness.received_user_ids(), vec!["first", "second"]);
}
