// Registry behavior of the hub loop, driven without any sockets.

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use yijing_core::Envelope;
use yijing_server::hub_task::{Hub, Member};
use yijing_server::types::{connection, ConnectionHandle, ConnectionId, Mailbox};

const QUIET_TICK: Duration = Duration::from_secs(3600);

fn conn(id: &str, capacity: usize) -> (ConnectionHandle<Envelope>, Mailbox<Envelope>) {
    connection(ConnectionId::from(id), capacity)
}

/// Commands are applied asynchronously; poll until the count settles.
async fn wait_for_len<T: Member>(hub: &Hub<T>, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while hub.len().await != expected {
        if Instant::now() > deadline {
            panic!("hub len stuck at {}, expected {}", hub.len().await, expected);
        }
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn register_sends_connect_welcome() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);
    let (handle, mut mailbox) = conn("client_1", 4);

    hub.register(handle).await.unwrap();
    wait_for_len(&hub, 1).await;

    assert_eq!(mailbox.try_recv(), Some(Envelope::connect("client_1")));
}

#[tokio::test]
async fn double_unregister_does_not_underflow() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);
    let (a, _ma) = conn("a", 4);
    let (b, _mb) = conn("b", 4);
    let (c, _mc) = conn("c", 4);

    hub.register(a.clone()).await.unwrap();
    hub.register(b.clone()).await.unwrap();
    hub.register(c.clone()).await.unwrap();
    wait_for_len(&hub, 3).await;

    hub.unregister(ConnectionId::from("b")).await.unwrap();
    hub.unregister(ConnectionId::from("b")).await.unwrap();
    hub.unregister(ConnectionId::from("never-registered")).await.unwrap();
    wait_for_len(&hub, 2).await;

    assert!(b.is_closed());
    assert!(!a.is_closed());
    assert!(hub.contains(&ConnectionId::from("c")).await);
    assert!(!hub.contains(&ConnectionId::from("b")).await);
}

#[tokio::test]
async fn register_then_unregister_from_one_producer_keeps_order() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);

    for i in 0..20 {
        let id = format!("conn_{}", i);
        let (handle, _mailbox) = conn(&id, 4);
        hub.register(handle).await.unwrap();
        hub.unregister(ConnectionId::from(id.as_str())).await.unwrap();
    }

    wait_for_len(&hub, 0).await;
}

#[tokio::test]
async fn slow_consumer_is_evicted_and_closed() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);
    let capacity = 3;
    let (slow, _slow_mailbox) = conn("slow", capacity);
    let (fast, mut fast_mailbox) = conn("fast", 64);

    hub.register(slow.clone()).await.unwrap();
    hub.register(fast.clone()).await.unwrap();
    wait_for_len(&hub, 2).await;

    // Nobody drains `slow`; the welcome already holds one slot.
    for n in 0..capacity + 2 {
        hub.broadcast(Envelope::error("test", format!("msg {}", n)))
            .await
            .unwrap();
    }
    wait_for_len(&hub, 1).await;

    assert!(slow.is_closed());
    assert!(!hub.contains(&ConnectionId::from("slow")).await);
    assert!(!fast.is_closed());

    // The fast consumer got its welcome, every broadcast and the departure.
    let mut received = Vec::new();
    while let Some(msg) = fast_mailbox.try_recv() {
        received.push(msg);
    }
    assert_eq!(received.len(), 1 + capacity + 2 + 1);
    assert!(received.contains(&Envelope::disconnect("slow")));
}

#[tokio::test]
async fn closed_mailbox_is_removed_on_broadcast() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);
    let (handle, mailbox) = conn("gone", 4);

    hub.register(handle.clone()).await.unwrap();
    wait_for_len(&hub, 1).await;

    drop(mailbox);
    handle.close();
    hub.broadcast(Envelope::error("test", "after close")).await.unwrap();
    wait_for_len(&hub, 0).await;
}

#[tokio::test]
async fn tick_broadcasts_client_count() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, Duration::from_millis(50));
    let (handle, mut mailbox) = conn("watcher", 16);

    hub.register(handle).await.unwrap();
    wait_for_len(&hub, 1).await;

    let heartbeat = timeout(Duration::from_secs(2), async {
        loop {
            match mailbox.try_recv() {
                Some(Envelope::Heartbeat(info)) => return info,
                _ => sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("no heartbeat within deadline");

    assert_eq!(heartbeat.clients, Some(1));
    assert!(heartbeat.timestamp > 0);
}

#[tokio::test]
async fn unregister_announces_departure_to_the_rest() {
    let hub = Hub::<ConnectionHandle<Envelope>>::spawn("test", 16, QUIET_TICK);
    let (stay, mut stay_mailbox) = conn("stay", 8);
    let (leave, mut leave_mailbox) = conn("leave", 8);

    hub.register(stay).await.unwrap();
    hub.register(leave).await.unwrap();
    wait_for_len(&hub, 2).await;
    hub.unregister(ConnectionId::from("leave")).await.unwrap();
    wait_for_len(&hub, 1).await;

    assert_eq!(stay_mailbox.try_recv(), Some(Envelope::connect("stay")));
    assert_eq!(stay_mailbox.try_recv(), Some(Envelope::disconnect("leave")));
    assert_eq!(stay_mailbox.try_recv(), None);

    // The one leaving is not told about itself.
    assert_eq!(leave_mailbox.try_recv(), Some(Envelope::connect("leave")));
    assert_eq!(leave_mailbox.try_recv(), None);
}
