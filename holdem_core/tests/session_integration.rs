//! Table session integration: seating, readiness auto-start, personalized
//! broadcast, chat, reconnection, timeouts, and grace-expiry eviction,
//! all through a live actor with the in-memory store and test-mode
//! directory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use holdem_core::cache::{hand_key, HandStore, MemoryHandStore};
use holdem_core::directory::{DirectoryClient, ServiceMode};
use holdem_core::game::entities::{Action, SeatView, Stage};
use holdem_core::game::hand::HandView;
use holdem_core::table::{ServerEvent, TableConfig, TableRegistry};

struct Harness {
    store: Arc<MemoryHandStore>,
    registry: Arc<TableRegistry>,
    config: TableConfig,
}

fn harness(config: TableConfig) -> Harness {
    let store = Arc::new(MemoryHandStore::default());
    let directory = Arc::new(DirectoryClient::new(
        "http://localhost:0".to_string(),
        ServiceMode::Test,
        Some("session-integration-secret".to_string()),
    ));
    let registry = TableRegistry::new(store.clone(), directory);
    Harness {
        store,
        registry,
        config,
    }
}

async fn seat_and_connect(
    h: &Harness,
    table_id: &str,
    user_id: i64,
    name: &str,
    seat: usize,
) -> mpsc::Receiver<ServerEvent> {
    h.registry
        .seat_player(
            table_id,
            None,
            h.config.clone(),
            user_id,
            name.to_string(),
            seat,
            h.config.initial_stack,
        )
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(64);
    let routed = h
        .registry
        .connect_user(user_id, Uuid::new_v4(), tx)
        .await;
    assert_eq!(routed.as_deref(), Some(table_id));
    rx
}

async fn wait_for<F>(rx: &mut mpsc::Receiver<ServerEvent>, mut pred: F) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn state_of(event: &ServerEvent) -> Option<&HandView> {
    match event {
        ServerEvent::TableStateUpdate { state } => Some(state),
        _ => None,
    }
}

/// User to act, read off a snapshot.
fn current_user(view: &HandView) -> i64 {
    let seat_no = view.current_seat.expect("betting stage");
    view.seats
        .iter()
        .find_map(|s| match s {
            SeatView::Public(p) if p.seat == seat_no => Some(p.user_id),
            SeatView::Private(p) if p.seat == seat_no => Some(p.user_id),
            _ => None,
        })
        .expect("current seat present")
}

#[tokio::test]
async fn two_connected_seats_start_a_hand_with_private_cards() {
    let h = harness(TableConfig::default());
    let mut rx1 = seat_and_connect(&h, "table_1", 1, "alice", 0).await;
    let mut rx2 = seat_and_connect(&h, "table_1", 2, "bob", 1).await;

    let event = wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Preflop)
    })
    .await;
    let view = state_of(&event).unwrap();

    // Alice sees her own hole cards and only a count for bob.
    let mut saw_private = false;
    for seat in &view.seats {
        match seat {
            SeatView::Private(p) => {
                assert_eq!(p.user_id, 1);
                assert_eq!(p.hole_cards.len(), 2);
                saw_private = true;
            }
            SeatView::Public(p) => {
                assert_eq!(p.user_id, 2);
                assert_eq!(p.hole_card_count, 2);
            }
        }
    }
    assert!(saw_private);

    wait_for(&mut rx2, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Preflop)
    })
    .await;

    // The hand was persisted before it was broadcast.
    assert!(h.store.exists(&hand_key("table_1")).await.unwrap());
}

#[tokio::test]
async fn admitted_actions_broadcast_and_finish_hands() {
    let h = harness(TableConfig::default());
    let mut rx1 = seat_and_connect(&h, "table_1", 1, "alice", 0).await;
    let mut rx2 = seat_and_connect(&h, "table_1", 2, "bob", 1).await;

    let event = wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Preflop)
    })
    .await;
    let actor = current_user(state_of(&event).unwrap());

    // Whoever is first to act folds; the other seat wins the blinds.
    h.registry.submit_action(actor, Action::Fold).await.unwrap();

    let complete = wait_for(&mut rx2, |e| matches!(e, ServerEvent::HandComplete { .. })).await;
    let ServerEvent::HandComplete { winners, pot } = complete else {
        unreachable!();
    };
    assert_eq!(pot, 30);
    assert_eq!(winners.len(), 1);
    assert_ne!(winners[0].user_id, actor);

    // A second submission of the same action is out of turn now.
    let err = h.registry.submit_action(actor, Action::Fold).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn chat_fans_out_and_replays_on_reconnect() {
    let h = harness(TableConfig::default());
    let mut rx1 = seat_and_connect(&h, "table_1", 1, "alice", 0).await;
    let mut rx2 = seat_and_connect(&h, "table_1", 2, "bob", 1).await;

    h.registry
        .chat(1, "good luck!".to_string(), None)
        .await;
    let event = wait_for(&mut rx2, |e| matches!(e, ServerEvent::ChatMessage { .. })).await;
    let ServerEvent::ChatMessage { message } = event else {
        unreachable!();
    };
    assert_eq!(message.sender, "alice");
    assert_eq!(message.text, "good luck!");

    // Bob drops and comes back on a new socket within grace.
    let old_socket = Uuid::new_v4();
    h.registry.disconnect_user(2, old_socket).await;
    // The disconnect used a socket id the registry never bound for bob,
    // so it must be ignored; use the real flow instead: bind, drop, bind.
    let (tx2b, rx2b) = mpsc::channel(64);
    let socket_b = Uuid::new_v4();
    h.registry.connect_user(2, socket_b, tx2b).await.unwrap();
    h.registry.disconnect_user(2, socket_b).await;

    wait_for(&mut rx1, |e| {
        matches!(e, ServerEvent::PlayerDisconnected { name, .. } if name == "bob")
    })
    .await;

    let (tx2c, mut rx2c) = mpsc::channel(64);
    h.registry
        .connect_user(2, Uuid::new_v4(), tx2c)
        .await
        .unwrap();

    let event = wait_for(&mut rx2c, |e| matches!(e, ServerEvent::Reconnected { .. })).await;
    let ServerEvent::Reconnected { table_id, .. } = event else {
        unreachable!();
    };
    assert_eq!(table_id, "table_1");

    let event = wait_for(&mut rx2c, |e| matches!(e, ServerEvent::ChatHistory { .. })).await;
    let ServerEvent::ChatHistory { messages } = event else {
        unreachable!();
    };
    assert!(messages.iter().any(|m| m.text == "good luck!"));

    wait_for(&mut rx1, |e| {
        matches!(e, ServerEvent::PlayerReconnected { name } if name == "bob")
    })
    .await;

    // rx2b went stale when the newer socket took over.
    drop(rx2b);
    drop(rx2);
}

#[tokio::test]
async fn action_timeout_auto_checks_and_advances() {
    let config = TableConfig {
        action_timeout_secs: 1,
        ..TableConfig::default()
    };
    let h = harness(config);
    let mut rx1 = seat_and_connect(&h, "table_1", 1, "alice", 0).await;
    let _rx2 = seat_and_connect(&h, "table_1", 2, "bob", 1).await;

    let event = wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Preflop)
    })
    .await;
    let actor = current_user(state_of(&event).unwrap());

    // The small blind calls; the big blind then idles past the deadline
    // and is auto-checked into the flop.
    h.registry.submit_action(actor, Action::Call).await.unwrap();

    wait_for(&mut rx1, |e| matches!(e, ServerEvent::ActionTimeout { .. })).await;
    wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Flop)
    })
    .await;
}

#[tokio::test]
async fn grace_expiry_evicts_the_seat() {
    let config = TableConfig {
        reconnect_grace_ms: 300,
        ..TableConfig::default()
    };
    let h = harness(config);
    let mut rx1 = seat_and_connect(&h, "table_1", 1, "alice", 0).await;
    let (tx2, rx2) = mpsc::channel(64);
    h.registry
        .seat_player(
            "table_1",
            None,
            h.config.clone(),
            2,
            "bob".to_string(),
            1,
            h.config.initial_stack,
        )
        .await
        .unwrap();
    let socket2 = Uuid::new_v4();
    h.registry.connect_user(2, socket2, tx2).await.unwrap();

    wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.stage == Stage::Preflop)
    })
    .await;

    h.registry.disconnect_user(2, socket2).await;
    drop(rx2);

    // Grace is 300ms and the session ticks every second: bob's seat is
    // folded out of the hand and removed, then the hand ends with alice
    // winning.
    let event = wait_for(&mut rx1, |e| {
        state_of(e).is_some_and(|v| v.seats.len() == 1)
    })
    .await;
    let view = state_of(&event).unwrap();
    assert_eq!(view.stage, Stage::Complete);
    wait_for(&mut rx1, |e| matches!(e, ServerEvent::HandComplete { .. })).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.registry.table_for_user(2).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("bob should be unindexed after eviction");
}

#[tokio::test]
async fn empty_table_deletes_cache_entry() {
    let h = harness(TableConfig::default());
    let _rx1 = seat_and_connect(&h, "table_9", 1, "alice", 0).await;
    assert!(h.store.exists(&hand_key("table_9")).await.unwrap());

    h.registry.leave(1).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !h.store.exists(&hand_key("table_9")).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("cache entry should be deleted when the table empties");
}
