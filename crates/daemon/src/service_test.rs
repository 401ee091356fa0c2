use std::sync::atomic::Ordering;
use std::sync::Arc;

use beacon_config::{Config, NodeRole};
use beacon_pipeline::{OverflowPolicy, RingQueue};
use beacon_protocol::{
    encode_announce, pack, Frame, Metadata, MsgType, ProcessId, Publication, Role, ValueData,
    ValueType,
};

use crate::service::DaemonService;
use crate::subscription::Pattern;

fn daemon_config() -> Config {
    let mut config = Config::default();
    config.node.role = NodeRole::Daemon;
    config.global.guid_start = 1000;
    config.global.guid_max = 9999;
    config.global.guid_block_size = 100;
    config
}

fn client_pub(guid: u64) -> Publication {
    let mut publication = Publication::new(guid, "app.stats", ProcessId::default());
    publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    publication
}

#[test]
fn test_register_grants_disjoint_blocks() {
    let service = DaemonService::new(&daemon_config());
    let origin = ProcessId::default();

    let first = service
        .handle_frame(Frame::register(&origin, Role::Client))
        .unwrap()
        .unwrap();
    let second = service
        .handle_frame(Frame::register(&origin, Role::Client))
        .unwrap()
        .unwrap();

    let (a_start, a_count) = first.guid_grant().unwrap();
    let (b_start, b_count) = second.guid_grant().unwrap();
    assert_eq!((a_start, a_count), (1000, 100));
    assert_eq!((b_start, b_count), (1100, 100));
    assert_eq!(service.metrics().clients_registered.load(Ordering::Relaxed), 2);
}

#[test]
fn test_announce_is_acked_and_mirrored() {
    let service = DaemonService::new(&daemon_config());
    let publication = client_pub(1);

    let reply = service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap()
        .unwrap();

    assert_eq!(reply.header.msg_type, MsgType::Acknowledge);
    assert_eq!(reply.acked_msg_type(), Some(MsgType::Announce));
    assert_eq!(reply.header.pub_guid, 1);
    assert_eq!(service.mirrors().len(), 1);
}

#[test]
fn test_value_applied_silently() {
    let service = DaemonService::new(&daemon_config());
    let mut publication = client_pub(1);
    service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap();

    publication.write("x", ValueData::Double(1.25)).unwrap();
    let frame = pack(&mut publication, Role::Client).unwrap();

    // value frames are fire-and-forget: no reply
    assert!(service.handle_frame(frame).unwrap().is_none());

    let mirror = service.mirrors().get(1).unwrap();
    assert_eq!(
        mirror.lock().get_val("x").unwrap(),
        Some(&ValueData::Double(1.25))
    );
}

#[test]
fn test_value_without_mirror_requests_announce() {
    let service = DaemonService::new(&daemon_config());
    let mut publication = client_pub(44);
    publication.write("x", ValueData::Double(1.0)).unwrap();
    let frame = pack(&mut publication, Role::Client).unwrap();

    let reply = service.handle_frame(frame).unwrap().unwrap();
    assert_eq!(reply.header.msg_type, MsgType::AnnounceRequest);
    assert_eq!(reply.header.pub_guid, 44);
    assert_eq!(service.metrics().schema_mismatches.load(Ordering::Relaxed), 1);
}

#[test]
fn test_stale_value_requests_reannounce() {
    let service = DaemonService::new(&daemon_config());
    let small = client_pub(1);
    service
        .handle_frame(encode_announce(&small, Role::Client, true))
        .unwrap();

    // sender grew its schema but the daemon never saw the re-announce
    let mut grown = client_pub(1);
    grown
        .add_element("extra", ValueType::Integer, Metadata::default())
        .unwrap();
    grown.write("extra", ValueData::Integer(5)).unwrap();
    let frame = pack(&mut grown, Role::Client).unwrap();

    let reply = service.handle_frame(frame).unwrap().unwrap();
    assert_eq!(reply.header.msg_type, MsgType::AnnounceRequest);
}

#[test]
fn test_type_mismatch_drops_frame() {
    let service = DaemonService::new(&daemon_config());
    let announced = client_pub(1);
    service
        .handle_frame(encode_announce(&announced, Role::Client, true))
        .unwrap();

    // same guid, same index, integer instead of double
    let mut wrong = Publication::new(1, "app.stats", ProcessId::default());
    wrong
        .add_element("x", ValueType::Integer, Metadata::default())
        .unwrap();
    wrong.write("x", ValueData::Integer(3)).unwrap();
    let frame = pack(&mut wrong, Role::Client).unwrap();

    // dropped, not applied, no reply
    assert!(service.handle_frame(frame).unwrap().is_none());
    assert_eq!(service.metrics().type_mismatches.load(Ordering::Relaxed), 1);
    let mirror = service.mirrors().get(1).unwrap();
    assert_eq!(mirror.lock().get_val("x").unwrap(), None);
}

#[tokio::test]
async fn test_subscription_receives_schema_then_values() {
    let service = DaemonService::new(&daemon_config());
    let mut handle = service.subscribe(Pattern::any().title("app"), 16);

    let mut publication = client_pub(1);
    service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap();

    publication.write("x", ValueData::Double(0.5)).unwrap();
    let frame = pack(&mut publication, Role::Client).unwrap();
    service.handle_frame(frame).unwrap();

    let first = handle.frames.recv().await.unwrap();
    assert_eq!(first.header.msg_type, MsgType::Announce);
    let second = handle.frames.recv().await.unwrap();
    assert_eq!(second.header.msg_type, MsgType::Value);
}

#[test]
fn test_unannounce_drops_mirror_and_matches() {
    let service = DaemonService::new(&daemon_config());
    let publication = client_pub(1);
    service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap();
    assert_eq!(service.mirrors().len(), 1);

    let unannounce = Frame::empty(MsgType::Unannounce, Role::Client, 1, 1);
    assert!(service.handle_frame(unannounce).unwrap().is_none());
    assert!(service.mirrors().is_empty());
}

#[test]
fn test_daemon_relays_upstream() {
    let upstream = Arc::new(RingQueue::new(16, OverflowPolicy::default()));
    let service = DaemonService::new(&daemon_config()).with_upstream(Arc::clone(&upstream));

    let mut publication = client_pub(1);
    service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap();
    publication.write("x", ValueData::Double(2.0)).unwrap();
    service
        .handle_frame(pack(&mut publication, Role::Client).unwrap())
        .unwrap();

    // both schema and value frames relay unchanged toward the leader
    assert_eq!(upstream.len(), 2);
    let first = upstream.pop().unwrap();
    assert_eq!(first.frame.header.msg_type, MsgType::Announce);
    let second = upstream.pop().unwrap();
    assert_eq!(second.frame.header.msg_type, MsgType::Value);
    assert_eq!(second.frame.header.pub_guid, 1);
}

#[test]
fn test_leader_does_not_relay() {
    let mut config = daemon_config();
    config.node.role = NodeRole::Leader;
    config.node.upstream = None;

    let upstream = Arc::new(RingQueue::new(16, OverflowPolicy::default()));
    let service = DaemonService::new(&config).with_upstream(Arc::clone(&upstream));

    let publication = client_pub(1);
    service
        .handle_frame(encode_announce(&publication, Role::Client, true))
        .unwrap();

    assert!(upstream.is_empty());
}

#[test]
fn test_check_in_counted() {
    let service = DaemonService::new(&daemon_config());
    let frame = Frame::empty(MsgType::CheckIn, Role::Client, 0, 0);
    assert!(service.handle_frame(frame).unwrap().is_none());
    assert_eq!(service.metrics().check_ins.load(Ordering::Relaxed), 1);
}
