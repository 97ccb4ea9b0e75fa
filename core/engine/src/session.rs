use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::types::ConversationState;

pub const SESSION_COOKIE: &str = "chat_session";
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct SessionEntry {
    state: ConversationState,
    last_seen: Instant,
}

/// 服务端会话表：session id -> 会话状态
///
/// 引擎本身无状态，传输层在每轮前读取、每轮后写回。同一会话的并发请求不做排序保证。
/// 会话 id 只由 `create()` 生成；空闲超时的会话在下次访问时清掉，
/// 表满时淘汰最久未访问的会话。
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        // 表里只有 Copy 值，锁中毒时数据仍然一致
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_live(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.duration_since(entry.last_seen) <= self.idle_timeout
    }

    /// 新建会话，初始状态为 `general`
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut sessions = self.guard();

        sessions.retain(|_, entry| self.is_live(entry, now));
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    sessions.remove(&oldest);
                }
                None => break,
            }
        }

        sessions.insert(
            id.clone(),
            SessionEntry {
                state: ConversationState::General,
                last_seen: now,
            },
        );
        id
    }

    /// 已知且未过期的会话才算存在；过期的顺手删掉
    pub fn contains(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.guard();
        let live = match sessions.get(id) {
            Some(entry) => self.is_live(entry, now),
            None => return false,
        };
        if !live {
            sessions.remove(id);
        }
        live
    }

    /// 把已有会话重置为 `general`；未知 id 不会被加入表中
    pub fn reset(&self, id: &str) -> bool {
        self.set(id, ConversationState::General)
    }

    /// 未知或已过期的会话视为 `general`
    pub fn get(&self, id: &str) -> ConversationState {
        let now = Instant::now();
        let mut sessions = self.guard();
        let live = match sessions.get(id) {
            Some(entry) => self.is_live(entry, now),
            None => return ConversationState::default(),
        };
        if !live {
            sessions.remove(id);
            return ConversationState::default();
        }
        match sessions.get_mut(id) {
            Some(entry) => {
                entry.last_seen = now;
                entry.state
            }
            None => ConversationState::default(),
        }
    }

    /// 只更新已有会话；返回是否写入成功
    pub fn set(&self, id: &str, state: ConversationState) -> bool {
        let now = Instant::now();
        match self.guard().get_mut(id) {
            Some(entry) if self.is_live(&*entry, now) => {
                entry.state = state;
                entry.last_seen = now;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

/// 从 `Cookie` 头里取出会话 id
pub fn session_id_from_cookie(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

pub fn session_cookie(id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_and_unknown_sessions_start_general() {
        let store = SessionStore::new();
        let id = store.create();
        assert_eq!(store.get(&id), ConversationState::General);
        assert_eq!(store.get("missing"), ConversationState::General);
    }

    #[test]
    fn set_and_reset() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(store.set(&id, ConversationState::AwaitingEmail));
        assert_eq!(store.get(&id), ConversationState::AwaitingEmail);
        assert!(store.reset(&id));
        assert_eq!(store.get(&id), ConversationState::General);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn client_chosen_ids_are_never_stored() {
        let store = SessionStore::new();
        for i in 0..1_000 {
            let id = format!("client-{i}");
            assert!(!store.reset(&id));
            assert!(!store.set(&id, ConversationState::HasEmail));
            assert!(!store.contains(&id));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn store_is_capped_and_evicts_least_recent() {
        let store = SessionStore::with_limits(3, DEFAULT_IDLE_TIMEOUT);
        let first = store.create();
        std::thread::sleep(Duration::from_millis(2));
        let second = store.create();
        std::thread::sleep(Duration::from_millis(2));
        let third = store.create();
        std::thread::sleep(Duration::from_millis(2));
        // 访问 first，让 second 成为最久未访问的会话
        store.get(&first);
        std::thread::sleep(Duration::from_millis(2));

        for _ in 0..100 {
            store.create();
            assert!(store.len() <= 3);
        }
        assert!(!store.contains(&second));
        assert!(!store.contains(&third));
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::with_limits(100, Duration::from_millis(1));
        let id = store.create();
        assert!(store.set(&id, ConversationState::HasEmail));
        std::thread::sleep(Duration::from_millis(20));

        assert!(!store.contains(&id));
        assert_eq!(store.get(&id), ConversationState::General);
        assert!(store.is_empty());
    }

    #[test]
    fn cookie_parsing() {
        assert_eq!(
            session_id_from_cookie("theme=dark; chat_session=abc-123; other=1"),
            Some("abc-123".to_string())
        );
        assert_eq!(session_id_from_cookie("chat_session="), None);
        assert_eq!(session_id_from_cookie("theme=dark"), None);
        assert!(session_cookie("abc").starts_with("chat_session=abc;"));
    }
}
