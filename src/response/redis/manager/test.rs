use super::*;
use tokio::sync::mpsc::UnboundedReceiver;

const INTERVAL: Duration = Duration::from_secs(360);

fn manager() -> (Manager, UnboundedReceiver<RedisCmd>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Manager::new(tx, INTERVAL), rx)
}

fn drain(rx: &mut UnboundedReceiver<RedisCmd>) -> Vec<RedisCmd> {
    let mut cmds = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        cmds.push(cmd);
    }
    cmds
}

fn heartbeat(channel: &str) -> RedisCmd {
    RedisCmd::Heartbeat {
        channel: Channel::new(channel),
        ttl: INTERVAL * 3,
    }
}

#[test]
fn first_listener_subscribes_and_last_unsubscribes() {
    let (mut manager, mut rx) = manager();
    let public = Channel::new("timeline:public");
    let (a, b) = (ListenerId::new(), ListenerId::new());
    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();

    manager.subscribe(&public, a, tx_a);
    assert_eq!(
        drain(&mut rx),
        vec![RedisCmd::Subscribe(public.clone()), heartbeat("timeline:public")]
    );

    manager.subscribe(&public, b, tx_b);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(manager.listener_count(&public), 2);

    manager.unsubscribe(&public, a);
    assert!(drain(&mut rx).is_empty());

    manager.unsubscribe(&public, b);
    assert_eq!(drain(&mut rx), vec![RedisCmd::Unsubscribe(public.clone())]);
    assert_eq!(manager.channel_count(), 0);
}

#[test]
fn admin_channels_get_no_heartbeat() {
    let (mut manager, mut rx) = manager();
    let system = Channel::system(crate::event::Id(1));
    let (tx, _keep) = mpsc::unbounded_channel();
    manager.subscribe(&system, ListenerId::new(), tx);
    assert_eq!(drain(&mut rx), vec![RedisCmd::Subscribe(system)]);

    manager.send_heartbeats(Instant::now() + INTERVAL * 2);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn broadcast_reaches_every_listener_once() {
    let (mut manager, _rx) = manager();
    let channel = Channel::new("timeline:1");
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    manager.subscribe(&channel, ListenerId::new(), tx_a);
    manager.subscribe(&channel, ListenerId::new(), tx_b);

    manager.broadcast(&channel, Arc::new(Event::Delete("9".to_string())));
    assert_eq!(*rx_a.try_recv().expect("delivered"), Event::Delete("9".to_string()));
    assert_eq!(*rx_b.try_recv().expect("delivered"), Event::Delete("9".to_string()));
    assert!(rx_a.try_recv().is_err());
}

#[test]
fn dead_listeners_are_pruned_on_broadcast() {
    let (mut manager, mut rx) = manager();
    let channel = Channel::new("timeline:1");
    let (tx, listener_rx) = mpsc::unbounded_channel();
    manager.subscribe(&channel, ListenerId::new(), tx);
    drain(&mut rx);

    drop(listener_rx);
    manager.broadcast(&channel, Arc::new(Event::Kill));
    assert_eq!(manager.channel_count(), 0);
    assert_eq!(drain(&mut rx), vec![RedisCmd::Unsubscribe(channel)]);
}

#[test]
fn broadcast_to_unknown_channel_is_ignored() {
    let (mut manager, mut rx) = manager();
    manager.broadcast(&Channel::new("timeline:404"), Arc::new(Event::Kill));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn heartbeats_are_tracked_per_channel() {
    let (mut manager, mut rx) = manager();
    let (tx, _keep) = mpsc::unbounded_channel();
    manager.subscribe(&Channel::new("timeline:1"), ListenerId::new(), tx.clone());
    let start = Instant::now();
    drain(&mut rx);

    manager.send_heartbeats(start + INTERVAL / 2);
    assert!(drain(&mut rx).is_empty());

    manager.send_heartbeats(start + INTERVAL);
    assert_eq!(drain(&mut rx), vec![heartbeat("timeline:1")]);

    manager.subscribe(&Channel::new("timeline:2"), ListenerId::new(), tx);
    drain(&mut rx);

    // timeline:1 was refreshed half an interval ago; timeline:2 has been waiting longer
    manager.send_heartbeats(start + INTERVAL + INTERVAL / 2);
    assert_eq!(drain(&mut rx), vec![heartbeat("timeline:2")]);
}

#[test]
fn unsubscribing_an_unknown_listener_is_harmless() {
    let (mut manager, mut rx) = manager();
    manager.unsubscribe(&Channel::new("timeline:1"), ListenerId::new());
    assert!(drain(&mut rx).is_empty());
}
