use hostdesk::events::EventHub;

#[test]
fn test_connected_envelope_first() {
    let hub = EventHub::new();
    let mut handle = hub.connect();

    let envelope = handle.receiver.try_recv().unwrap();
    assert_eq!(envelope["type"], "connected");
    assert!(envelope["timestamp"].is_string());
    assert!(envelope["client_id"].is_string());
}

#[test]
fn test_broadcast_reaches_every_client_in_order() {
    let hub = EventHub::new();
    let mut a = hub.connect();
    let mut b = hub.connect();
    assert_eq!(hub.client_count(), 2);

    let count = hub.broadcast_refresh("conversations", "test");
    assert_eq!(count, 2);
    let count = hub.broadcast_refresh("dashboard", "test");
    assert_eq!(count, 2);

    for handle in [&mut a, &mut b] {
        let first = handle.receiver.try_recv().unwrap();
        assert_eq!(first["type"], "connected");
        let second = handle.receiver.try_recv().unwrap();
        assert_eq!(second["type"], "refresh");
        assert_eq!(second["scope"], "conversations");
        assert_eq!(second["reason"], "test");
        assert!(second["timestamp"].is_string());
        let third = handle.receiver.try_recv().unwrap();
        assert_eq!(third["scope"], "dashboard");
    }
}

#[test]
fn test_disconnect_shrinks_the_set() {
    let hub = EventHub::new();
    let a = hub.connect();
    let _b = hub.connect();

    hub.disconnect(&a.client_id);
    assert_eq!(hub.client_count(), 1);
    assert_eq!(hub.broadcast_refresh("all", "after_disconnect"), 1);
}

#[test]
fn test_dead_transport_removed_on_broadcast() {
    let hub = EventHub::new();
    let a = hub.connect();
    let _b = hub.connect();

    // Dropping the receiver simulates a failed transport.
    drop(a.receiver);

    let count = hub.broadcast_refresh("all", "prune");
    assert_eq!(count, 1);
    assert_eq!(hub.client_count(), 1);
}

#[test]
fn test_broadcast_with_no_clients() {
    let hub = EventHub::new();
    assert_eq!(hub.broadcast_refresh("all", "empty"), 0);
}
