//! Memory subsystem: per-session, per-channel conversation logs.
//!
//! ```text
//! SessionMemory
//! └── sessions: session_id -> SessionLogs
//!                              ├── classify      [turn, turn, …]  (≤ cap)
//!                              ├── create_order  […]
//!                              ├── consulting    […]
//!                              └── check_order   […]
//! ```
//!
//! Sessions are materialised lazily and whole: the first [`SessionMemory::ensure`]
//! creates empty logs for every [`Channel`]. A session disappears only through
//! [`SessionMemory::clear`] or an idle [`SessionMemory::sweep`].
//!
//! Locking: the session map sits behind an `RwLock` held only for lookup,
//! insert and remove. Each session has its own `Mutex`, taken by
//! [`SessionHandle`] for one read or write at a time.
//!
//! A sweep may remove a session that a concurrent request is about to write
//! to; that write lands in the detached logs and is lost. Conversation history
//! is best effort, so this race is accepted.

pub mod handle;
pub mod sweeper;
pub mod types;

pub use handle::{ChannelInfo, SessionHandle, SessionInfo};
pub use types::{Channel, ChannelLog, ConversationTurn, Role};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppError;
use handle::SessionLogs;

/// Default number of turns kept per channel.
pub const DEFAULT_HISTORY_CAP: usize = 30;

/// Configuration for the memory subsystem.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum turns per (session, channel) log.
    pub history_cap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { history_cap: DEFAULT_HISTORY_CAP }
    }
}

/// On-disk shape of a memory snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub saved_at: Option<DateTime<Utc>>,
    pub sessions: BTreeMap<String, BTreeMap<Channel, Vec<ConversationTurn>>>,
}

type SessionMap = HashMap<String, Arc<Mutex<SessionLogs>>>;

/// Called with the id of every session removed by a sweep or a whole-session
/// clear, after the session map lock is released.
pub type EvictHook = Box<dyn Fn(&str) + Send + Sync>;

/// Central conversation store. Constructed once at startup, shared via `Arc`.
pub struct SessionMemory {
    sessions: RwLock<SessionMap>,
    history_cap: usize,
    on_evict: Option<EvictHook>,
}

impl SessionMemory {
    pub fn new(config: MemoryConfig) -> Self {
        info!(history_cap = config.history_cap, "session memory initialised");
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_cap: config.history_cap,
            on_evict: None,
        }
    }

    /// Register per-session state held elsewhere (e.g. retrieval topics)
    /// for cleanup when a session goes away.
    pub fn with_evict_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    fn evicted(&self, session_id: &str) {
        if let Some(hook) = &self.on_evict {
            hook(session_id);
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, SessionMap> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, session_id: &str, logs: &Arc<Mutex<SessionLogs>>) -> SessionHandle {
        SessionHandle::new(session_id.to_string(), Arc::clone(logs), self.history_cap)
    }

    /// Return a handle to `session_id`, creating empty logs for every channel
    /// if the session is unseen. Idempotent.
    ///
    /// Returns `None` for an empty session id: anonymous calls get no memory.
    pub fn ensure(&self, session_id: &str) -> Option<SessionHandle> {
        if session_id.is_empty() {
            return None;
        }

        if let Some(logs) = self.read_sessions().get(session_id) {
            return Some(self.handle(session_id, logs));
        }

        let mut sessions = self.write_sessions();
        let logs = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(%session_id, "session created");
            Arc::new(Mutex::new(SessionLogs::default()))
        });
        Some(self.handle(session_id, logs))
    }

    /// Look up an existing session without creating it.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.read_sessions()
            .get(session_id)
            .map(|logs| self.handle(session_id, logs))
    }

    /// Turns recorded for (`session_id`, `channel`), oldest first.
    ///
    /// Ensures the session exists. An empty `session_id` yields an empty
    /// history and creates nothing.
    pub fn get_history(&self, session_id: &str, channel: Channel) -> Vec<ConversationTurn> {
        match self.ensure(session_id) {
            Some(handle) => {
                let history = handle.history(channel);
                debug!(%session_id, %channel, count = history.len(), "history read");
                history
            }
            None => Vec::new(),
        }
    }

    /// Append a turn to (`session_id`, `channel`), evicting the oldest turns
    /// beyond the configured cap. No-op for an empty `session_id`.
    pub fn append(&self, session_id: &str, channel: Channel, role: Role, content: &str) {
        match self.ensure(session_id) {
            Some(handle) => handle.append(channel, role, content),
            None => warn!(%channel, %role, "append without session id ignored"),
        }
    }

    /// Append a user turn and its reply atomically. No-op for an empty
    /// `session_id`.
    pub fn append_exchange(&self, session_id: &str, channel: Channel, user: &str, reply: &str) {
        match self.ensure(session_id) {
            Some(handle) => handle.append_exchange(channel, user, reply),
            None => warn!(%channel, "exchange without session id ignored"),
        }
    }

    /// Clear one channel of a session, or the whole session when `channel`
    /// is `None`. Returns whether the session existed.
    pub fn clear(&self, session_id: &str, channel: Option<Channel>) -> bool {
        match channel {
            Some(channel) => match self.get(session_id) {
                Some(handle) => {
                    handle.clear_channel(channel);
                    info!(%session_id, %channel, "channel history cleared");
                    true
                }
                None => {
                    warn!(%session_id, %channel, "clear on unknown session");
                    false
                }
            },
            None => {
                let existed = self.write_sessions().remove(session_id).is_some();
                if existed {
                    info!(%session_id, "session cleared");
                    self.evicted(session_id);
                } else {
                    warn!(%session_id, "clear on unknown session");
                }
                existed
            }
        }
    }

    /// Remove every session idle for longer than `max_idle`, including
    /// sessions that never recorded a turn. Returns the number removed.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        self.sweep_at(Utc::now(), max_idle)
    }

    /// [`sweep`](Self::sweep) against an explicit clock reading.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let is_stale = |logs: &Mutex<SessionLogs>| {
            let last = logs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last_activity();
            match last {
                // Future timestamps count as fresh.
                Some(ts) => (now - ts).to_std().unwrap_or_default() > max_idle,
                None => true,
            }
        };

        let candidates: Vec<String> = self
            .read_sessions()
            .iter()
            .filter(|(_, logs)| is_stale(logs))
            .map(|(id, _)| id.clone())
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        // Re-check under the write lock: a session touched since the scan
        // survives.
        let removed: Vec<String> = {
            let mut sessions = self.write_sessions();
            let removed: Vec<String> = candidates
                .into_iter()
                .filter(|id| sessions.get(id).is_some_and(|logs| is_stale(logs)))
                .collect();
            for id in &removed {
                sessions.remove(id);
                debug!(session_id = %id, "idle session evicted");
            }
            if !removed.is_empty() {
                info!(removed = removed.len(), remaining = sessions.len(), "idle sessions swept");
            }
            removed
        };

        for id in &removed {
            self.evicted(id);
        }
        removed.len()
    }

    /// Number of live sessions.
    pub fn active_sessions(&self) -> usize {
        self.read_sessions().len()
    }

    /// Per-channel overview of a session; `None` if it does not exist.
    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.get(session_id).map(|h| h.info())
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    /// Copy every session into a serialisable image.
    pub fn snapshot(&self) -> MemorySnapshot {
        let sessions = self
            .read_sessions()
            .iter()
            .map(|(id, logs)| {
                let logs = logs.lock().unwrap_or_else(PoisonError::into_inner);
                let channels = Channel::ALL
                    .into_iter()
                    .map(|c| (c, logs.log(c).to_vec()))
                    .collect();
                (id.clone(), channels)
            })
            .collect();
        MemorySnapshot { saved_at: Some(Utc::now()), sessions }
    }

    /// Replace the sessions named in `snapshot`. Logs longer than the current
    /// cap keep their newest turns. Returns the number of sessions restored.
    pub fn restore(&self, snapshot: MemorySnapshot) -> usize {
        let mut sessions = self.write_sessions();
        let mut restored = 0;
        for (id, channels) in snapshot.sessions {
            if id.is_empty() {
                continue;
            }
            let mut logs = SessionLogs::default();
            for (channel, turns) in channels {
                let log = logs.log_mut(channel);
                *log = turns.into_iter().collect();
                log.truncate_front(self.history_cap);
            }
            sessions.insert(id, Arc::new(Mutex::new(logs)));
            restored += 1;
        }
        info!(restored, "session memory restored from snapshot");
        restored
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), AppError> {
        let data = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| AppError::Memory(format!("serialise snapshot: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
            .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", path.display())))?;
        info!(path = %path.display(), "memory snapshot saved");
        Ok(())
    }

    /// Restore from a snapshot file. A missing file restores nothing.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize, AppError> {
        if !path.exists() {
            debug!(path = %path.display(), "no memory snapshot to restore");
            return Ok(0);
        }
        let data = fs::read_to_string(path)
            .map_err(|e| AppError::Memory(format!("cannot read {}: {e}", path.display())))?;
        let snapshot: MemorySnapshot = serde_json::from_str(&data)
            .map_err(|e| AppError::Memory(format!("malformed {}: {e}", path.display())))?;
        Ok(self.restore(snapshot))
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl std::fmt::Debug for SessionMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMemory")
            .field("history_cap", &self.history_cap)
            .field("sessions", &self.active_sessions())
            .field("evict_hook", &self.on_evict.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory(cap: usize) -> SessionMemory {
        SessionMemory::new(MemoryConfig { history_cap: cap })
    }

    #[test]
    fn empty_session_id_is_a_noop() {
        let mem = memory(5);
        assert!(mem.get_history("", Channel::Consulting).is_empty());
        mem.append("", Channel::Consulting, Role::User, "hello");
        assert!(mem.ensure("").is_none());
        assert_eq!(mem.active_sessions(), 0);
    }

    #[test]
    fn ensure_is_idempotent_and_whole() {
        let mem = memory(5);
        let a = mem.ensure("s1").unwrap();
        a.append(Channel::CheckOrder, Role::User, "mã đơn 20241203-N-789");
        let b = mem.ensure("s1").unwrap();
        assert_eq!(b.history(Channel::CheckOrder).len(), 1);
        assert_eq!(mem.active_sessions(), 1);

        let info = mem.session_info("s1").unwrap();
        assert_eq!(info.channels.len(), Channel::ALL.len());
    }

    #[test]
    fn read_on_unseen_session_materialises_no_turns() {
        let mem = memory(5);
        assert!(mem.get_history("fresh", Channel::Consulting).is_empty());
        assert!(mem.get_history("fresh", Channel::Consulting).is_empty());
        assert_eq!(mem.active_sessions(), 1);
    }

    #[test]
    fn cap_keeps_newest_in_order() {
        let mem = memory(30);
        for i in 1..=31 {
            mem.append("s", Channel::Consulting, Role::User, &format!("turn #{i}"));
        }
        let history = mem.get_history("s", Channel::Consulting);
        assert_eq!(history.len(), 30);
        assert_eq!(history[0].content, "turn #2");
        assert_eq!(history[29].content, "turn #31");
    }

    #[test]
    fn clear_channel_reports_existence() {
        let mem = memory(5);
        assert!(!mem.clear("nobody", Some(Channel::Consulting)));

        mem.append("s", Channel::Consulting, Role::User, "a");
        mem.append("s", Channel::CreateOrder, Role::User, "b");
        assert!(mem.clear("s", Some(Channel::Consulting)));
        assert!(mem.get_history("s", Channel::Consulting).is_empty());
        assert_eq!(mem.get_history("s", Channel::CreateOrder).len(), 1);
    }

    #[test]
    fn clear_session_empties_every_channel() {
        let mem = memory(5);
        for c in Channel::ALL {
            mem.append("s", c, Role::User, "x");
        }
        assert!(mem.clear("s", None));
        assert!(!mem.clear("s", None));
        for c in Channel::ALL {
            assert!(mem.get_history("s", c).is_empty());
        }
    }

    #[test]
    fn evict_hook_sees_swept_and_cleared_sessions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mem = memory(5).with_evict_hook(move |id| sink.lock().unwrap().push(id.to_string()));

        mem.append("kept", Channel::Consulting, Role::User, "a");
        mem.append("dropped", Channel::Consulting, Role::User, "b");
        mem.ensure("idle");

        assert!(mem.clear("kept", Some(Channel::Consulting)));
        assert!(mem.clear("dropped", None));
        assert!(!mem.clear("dropped", None));
        assert_eq!(*seen.lock().unwrap(), ["dropped"]);

        let later = Utc::now() + chrono::Duration::hours(48);
        assert_eq!(mem.sweep_at(later, Duration::from_secs(3600)), 2);
        let mut all = seen.lock().unwrap().clone();
        all.sort();
        assert_eq!(all, ["dropped", "idle", "kept"]);
    }

    #[test]
    fn sweep_removes_idle_and_empty_sessions() {
        let mem = memory(5);
        let now = Utc::now();
        let old = now - chrono::Duration::hours(25);

        mem.ensure("stale")
            .unwrap()
            .append_turn(Channel::Consulting, ConversationTurn::at(Role::User, "cũ", old));
        mem.ensure("fresh")
            .unwrap()
            .append_turn(Channel::CreateOrder, ConversationTurn::at(Role::User, "mới", now));
        mem.ensure("empty");

        let removed = mem.sweep_at(now, Duration::from_secs(24 * 3600));
        assert_eq!(removed, 2);
        assert!(mem.get("stale").is_none());
        assert!(mem.get("empty").is_none());
        assert!(mem.get("fresh").is_some());
    }

    #[test]
    fn sweep_uses_most_recent_channel() {
        let mem = memory(5);
        let now = Utc::now();
        let h = mem.ensure("s").unwrap();
        h.append_turn(
            Channel::Classify,
            ConversationTurn::at(Role::User, "a", now - chrono::Duration::hours(48)),
        );
        h.append_turn(
            Channel::Consulting,
            ConversationTurn::at(Role::User, "b", now - chrono::Duration::hours(1)),
        );
        assert_eq!(mem.sweep_at(now, Duration::from_secs(24 * 3600)), 0);
    }

    #[test]
    fn snapshot_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory").join("snapshot.json");

        let mem = memory(5);
        mem.append("s1", Channel::Consulting, Role::User, "sơn 2k");
        mem.append("s1", Channel::Consulting, Role::Assistant, "dạ");
        mem.save_snapshot(&path).unwrap();

        let restored = memory(1);
        assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
        let history = restored.get_history("s1", Channel::Consulting);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "dạ");
    }

    #[test]
    fn missing_snapshot_restores_nothing() {
        let dir = TempDir::new().unwrap();
        let mem = memory(5);
        assert_eq!(mem.load_snapshot(&dir.path().join("absent.json")).unwrap(), 0);
    }

    #[test]
    fn malformed_snapshot_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = memory(5).load_snapshot(&path).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
