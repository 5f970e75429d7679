#![cfg(feature = "test-utils")]

mod common;

use std::sync::Arc;

use labsync::concurrency::{create_shutdown_channel, mailbox};
use labsync::dispatch::{DispatchLoop, DispatchState};
use labsync::test_utils::fixtures::{
    NEW_REQUEST_SUBJECT, UPDATED_SAMPLE_SUBJECT, quoted_json, request, sample,
};
use labsync::test_utils::log::Recorded;
use labsync::types::MessageFamily;
use labsync_telemetry::tracing::init_test_tracing;

use crate::common::{Harness, Options};

#[tokio::test]
async fn shutdown_drains_in_flight_deliveries_of_every_family_before_closing_broker() {
    init_test_tracing();
    let harness = Harness::new();
    harness.store.pause();
    let mut gateway = harness.start(Options::default()).await;

    let held = harness
        .log
        .notify_on(|events| {
            events
                .iter()
                .filter(|event| matches!(event, Recorded::PutHeld { .. }))
                .count()
                >= 3
        })
        .await;
    let mut sequences = Vec::new();
    for (subject, payload) in [
        (NEW_REQUEST_SUBJECT, quoted_json(&request("R1", &[]))),
        (NEW_REQUEST_SUBJECT, quoted_json(&request("R2", &[]))),
        (UPDATED_SAMPLE_SUBJECT, quoted_json(&vec![sample("R3", "R3_1")])),
    ] {
        sequences.push(harness.broker.publish(subject, payload).await.unwrap());
    }
    held.notified().await;

    gateway.shutdown_tx.shutdown();
    gateway
        .state
        .wait_for(|state| *state == DispatchState::Draining)
        .await
        .unwrap();
    assert!(!gateway.handle.is_finished());

    // Mailboxes are closed once draining starts.
    let late = harness
        .broker
        .publish(UPDATED_SAMPLE_SUBJECT, quoted_json(&vec![sample("R4", "R4_1")]))
        .await
        .unwrap();

    for sequence in &sequences {
        assert_eq!(harness.log.acks(*sequence).await, 0);
    }
    assert_eq!(harness.log.count(|e| *e == Recorded::BrokerShutdown).await, 0);

    harness.store.resume();
    gateway.handle.await.unwrap().unwrap();

    for sequence in &sequences {
        assert_eq!(harness.log.acks(*sequence).await, 1);
    }
    assert_eq!(harness.log.acks(late).await, 0);
    assert_eq!(*gateway.state.borrow(), DispatchState::Stopped);

    let events = harness.log.events().await;
    assert_eq!(events.last(), Some(&Recorded::BrokerShutdown));
}

#[tokio::test]
async fn shutdown_with_nothing_in_flight_stops_at_once() {
    init_test_tracing();
    let harness = Harness::new();
    let gateway = harness.start(Options::default()).await;
    let mut state = gateway.state.clone();

    gateway.stop().await.unwrap();

    assert_eq!(*state.borrow_and_update(), DispatchState::Stopped);
    assert_eq!(harness.log.events().await, vec![Recorded::BrokerShutdown]);
}

#[tokio::test]
async fn loop_ends_when_every_mailbox_closes() {
    init_test_tracing();
    let harness = Harness::new();
    let (sender, mailbox) = mailbox::<u32>(MessageFamily::UpdatedSample);
    let delivered = harness.log.clone();
    let lane = mailbox.into_lane(move |value| {
        let log = delivered.clone();
        async move {
            log.record(Recorded::Notified {
                text: value.to_string(),
            })
            .await;
        }
    });

    let dispatch = DispatchLoop::new(vec![lane], Arc::new(harness.broker.clone()));
    let state = dispatch.state_watcher();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handle = tokio::spawn(dispatch.run(shutdown_rx));

    sender.send(7).await.unwrap();
    drop(sender);
    handle.await.unwrap().unwrap();

    assert_eq!(*state.borrow(), DispatchState::Stopped);
    assert_eq!(
        harness.log.events().await,
        vec![
            Recorded::Notified {
                text: "7".to_string()
            },
            Recorded::BrokerShutdown
        ]
    );
}
