use domain::{SessionId, Timestamp, UserId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ServerEvent;

/// 每个会话最多积压的下行事件数
pub const SESSION_OUTBOUND_CAPACITY: usize = 64;

/// 单个传输会话的下行句柄。
///
/// 事件通过有界通道交给连接的写任务。连接断开（通道关闭）或积压已满时，
/// `emit` 丢弃事件并返回 `false`。
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    connected_at: Timestamp,
    outbound: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(connected_at: Timestamp) -> (Self, mpsc::Receiver<ServerEvent>) {
        Self::with_capacity(connected_at, SESSION_OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(
        connected_at: Timestamp,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: SessionId::new(),
            connected_at,
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn emit(&self, event: ServerEvent) -> bool {
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    session_id = %self.id,
                    event = event.name(),
                    "session outbound queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(
                    session_id = %self.id,
                    event = event.name(),
                    "session closed, event dropped"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session {session_id} is already bound to identity {bound}")]
    AlreadyBound { session_id: SessionId, bound: UserId },
}

/// 会话注册表：身份 -> 当前在线会话集合（一个身份可以有多个设备会话）。
///
/// 所有操作彼此原子；连接断开后 `unbind` 返回时，`sessions_for` 不会再返回该会话。
#[async_trait::async_trait]
pub trait SessionRegistry: Send + Sync {
    /// 绑定会话到身份。同一身份重复绑定是幂等的；换绑其他身份返回错误。
    async fn bind(&self, session: SessionHandle, identity: UserId) -> Result<(), RegistryError>;

    /// 移除会话，对未知或已移除的会话是空操作
    async fn unbind(&self, session_id: SessionId);

    /// 当前绑定到身份的在线会话
    async fn sessions_for(&self, identity: UserId) -> Vec<SessionHandle>;

    /// 会话当前绑定的身份
    async fn identity_of(&self, session_id: SessionId) -> Option<UserId>;
}

/// 内存实现的会话注册表
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    struct BoundSession {
        identity: UserId,
        handle: SessionHandle,
    }

    #[derive(Default)]
    struct RegistryState {
        sessions: HashMap<SessionId, BoundSession>,
        by_identity: HashMap<UserId, HashSet<SessionId>>,
    }

    #[derive(Default)]
    pub struct MemorySessionRegistry {
        state: RwLock<RegistryState>,
    }

    impl MemorySessionRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn session_count(&self) -> usize {
            self.state.read().await.sessions.len()
        }
    }

    #[async_trait::async_trait]
    impl SessionRegistry for MemorySessionRegistry {
        async fn bind(
            &self,
            session: SessionHandle,
            identity: UserId,
        ) -> Result<(), RegistryError> {
            let session_id = session.id();
            let mut state = self.state.write().await;

            if let Some(existing) = state.sessions.get(&session_id) {
                if existing.identity == identity {
                    return Ok(());
                }
                return Err(RegistryError::AlreadyBound {
                    session_id,
                    bound: existing.identity,
                });
            }

            state.sessions.insert(
                session_id,
                BoundSession {
                    identity,
                    handle: session,
                },
            );
            state
                .by_identity
                .entry(identity)
                .or_default()
                .insert(session_id);

            tracing::info!(session_id = %session_id, user_id = %identity, "session bound to identity");
            Ok(())
        }

        async fn unbind(&self, session_id: SessionId) {
            let mut state = self.state.write().await;
            let Some(bound) = state.sessions.remove(&session_id) else {
                return;
            };

            if let Some(ids) = state.by_identity.get_mut(&bound.identity) {
                ids.remove(&session_id);
                if ids.is_empty() {
                    state.by_identity.remove(&bound.identity);
                }
            }

            tracing::info!(session_id = %session_id, user_id = %bound.identity, "session unbound");
        }

        async fn sessions_for(&self, identity: UserId) -> Vec<SessionHandle> {
            let state = self.state.read().await;
            state
                .by_identity
                .get(&identity)
                .into_iter()
                .flatten()
                .filter_map(|id| state.sessions.get(id))
                .filter(|bound| !bound.handle.is_closed())
                .map(|bound| bound.handle.clone())
                .collect()
        }

        async fn identity_of(&self, session_id: SessionId) -> Option<UserId> {
            let state = self.state.read().await;
            state.sessions.get(&session_id).map(|bound| bound.identity)
        }
    }

}
