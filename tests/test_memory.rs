//! Integration tests for session memory: caps, isolation, sweeping and
//! snapshots.
//!
//! Run with:
//!   cargo test --test test_memory

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tempfile::TempDir;

use concierge_bot::subsystems::memory::{Channel, ConversationTurn, MemoryConfig, Role, SessionMemory};

fn memory(cap: usize) -> SessionMemory {
    SessionMemory::new(MemoryConfig { history_cap: cap })
}

#[test]
fn history_is_capped_and_ordered() {
    let mem = memory(30);
    for i in 0..31 {
        mem.append("s1", Channel::Consulting, Role::User, &format!("tin {i}"));
    }
    let history = mem.get_history("s1", Channel::Consulting);
    assert_eq!(history.len(), 30);
    assert_eq!(history.first().unwrap().content, "tin 1");
    assert_eq!(history.last().unwrap().content, "tin 30");
}

#[test]
fn channels_and_sessions_are_isolated() {
    let mem = memory(30);
    mem.append("s1", Channel::Consulting, Role::User, "sơn 2k");
    mem.append("s1", Channel::CreateOrder, Role::User, "đặt 2 thùng");
    mem.append("s2", Channel::Consulting, Role::Assistant, "dạ");

    assert_eq!(mem.get_history("s1", Channel::Consulting).len(), 1);
    assert_eq!(mem.get_history("s1", Channel::CreateOrder)[0].content, "đặt 2 thùng");
    assert!(mem.get_history("s1", Channel::CheckOrder).is_empty());
    assert_eq!(mem.get_history("s2", Channel::Consulting)[0].role, Role::Assistant);
}

#[test]
fn empty_session_id_is_never_stored() {
    let mem = memory(30);
    mem.append("", Channel::Classify, Role::User, "xin chào");
    assert!(mem.get_history("", Channel::Classify).is_empty());
    assert_eq!(mem.active_sessions(), 0);
}

#[test]
fn clear_channel_keeps_others() {
    let mem = memory(30);
    mem.append("s1", Channel::Consulting, Role::User, "a");
    mem.append("s1", Channel::Classify, Role::User, "b");

    assert!(mem.clear("s1", Some(Channel::Consulting)));
    assert!(mem.get_history("s1", Channel::Consulting).is_empty());
    assert_eq!(mem.get_history("s1", Channel::Classify).len(), 1);

    assert!(mem.clear("s1", None));
    assert!(!mem.clear("s1", None));
}

#[test]
fn sweep_removes_only_idle_sessions() {
    let mem = memory(30);
    mem.append("fresh", Channel::Consulting, Role::User, "mới");
    mem.ensure("empty");
    let old = mem.ensure("old").unwrap();
    old.append_turn(
        Channel::Consulting,
        ConversationTurn::at(Role::User, "cũ", Utc::now() - TimeDelta::hours(25)),
    );

    let removed = mem.sweep(Duration::from_secs(24 * 3600));
    assert_eq!(removed, 2);
    assert!(mem.get("fresh").is_some());
    assert!(mem.get("old").is_none());
    assert!(mem.get("empty").is_none());
}

#[test]
fn concurrent_appends_are_all_recorded() {
    let mem = Arc::new(memory(1000));
    let workers: Vec<_> = (0..8)
        .map(|w| {
            let mem = Arc::clone(&mem);
            std::thread::spawn(move || {
                for i in 0..50 {
                    mem.append("shared", Channel::Consulting, Role::User, &format!("{w}-{i}"));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(mem.get_history("shared", Channel::Consulting).len(), 400);
}

#[test]
fn snapshot_survives_restart_and_respects_new_cap() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state").join("memory.json");

    let before = memory(30);
    for i in 0..10 {
        before.append("s1", Channel::Consulting, Role::User, &format!("tin {i}"));
    }
    before.append("s2", Channel::CheckOrder, Role::Assistant, "đơn hàng đang giao");
    before.save_snapshot(&path).expect("save");

    let after = memory(5);
    assert_eq!(after.load_snapshot(&path).expect("load"), 2);
    let history = after.get_history("s1", Channel::Consulting);
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].content, "tin 5");
    assert_eq!(after.get_history("s2", Channel::CheckOrder)[0].content, "đơn hàng đang giao");
}

#[test]
fn missing_snapshot_restores_nothing() {
    let tmp = TempDir::new().unwrap();
    let mem = memory(30);
    assert_eq!(mem.load_snapshot(&tmp.path().join("none.json")).unwrap(), 0);
}
