use async_trait::async_trait;
use domain::{Message, MessageId, NewMessage, RepositoryError, UserId};

/// 消息存储：持久、有序的消息日志。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化消息，分配 ID 与创建时间（秒精度）。返回时写入已完成。
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// 接收方标记已读。消息不存在或调用者不是接收方时返回 `RepositoryError::NotFound`。
    /// 重复标记不报错。
    async fn mark_read(&self, id: MessageId, reader: UserId) -> Result<(), RepositoryError>;

    // 根据ID查找消息
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
}

/// 内存实现的消息存储（用于测试和本地开发）
pub mod memory {
    use super::*;
    use crate::clock::Clock;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct StoreState {
        last_id: i64,
        messages: BTreeMap<MessageId, Message>,
    }

    pub struct InMemoryMessageRepository {
        state: Mutex<StoreState>,
        clock: Arc<dyn Clock>,
    }

    impl InMemoryMessageRepository {
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                state: Mutex::new(StoreState::default()),
                clock,
            }
        }

        pub async fn len(&self) -> usize {
            self.state.lock().await.messages.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.len().await == 0
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
            let created_at = domain::truncate_to_seconds(self.clock.now());
            let mut state = self.state.lock().await;
            state.last_id += 1;
            let id = MessageId(state.last_id);
            let stored = message.into_message(id, created_at);
            state.messages.insert(id, stored.clone());
            Ok(stored)
        }

        async fn mark_read(&self, id: MessageId, reader: UserId) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().await;
            let message = state
                .messages
                .get_mut(&id)
                .ok_or(RepositoryError::NotFound)?;
            if message.mark_read_by(reader) {
                Ok(())
            } else {
                Err(RepositoryError::NotFound)
            }
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            Ok(self.state.lock().await.messages.get(&id).cloned())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::clock::SystemClock;

        fn repo() -> InMemoryMessageRepository {
            InMemoryMessageRepository::new(Arc::new(SystemClock))
        }

        fn new_message(sender: i64, receiver: i64, body: &str) -> NewMessage {
            NewMessage::new(UserId(sender), UserId(receiver), body, None, None).unwrap()
        }

        #[tokio::test]
        async fn append_assigns_increasing_ids() {
            let repo = repo();
            let first = repo.append(new_message(1, 2, "a")).await.unwrap();
            let second = repo.append(new_message(1, 2, "b")).await.unwrap();

            assert!(second.id > first.id);
            assert!(!first.is_read);
            assert_eq!(first.created_at.timestamp_subsec_nanos(), 0);
            assert_eq!(repo.len().await, 2);
        }

        #[tokio::test]
        async fn mark_read_is_idempotent_for_receiver() {
            let repo = repo();
            let stored = repo.append(new_message(1, 2, "a")).await.unwrap();

            repo.mark_read(stored.id, UserId(2)).await.unwrap();
            repo.mark_read(stored.id, UserId(2)).await.unwrap();

            let found = repo.find_by_id(stored.id).await.unwrap().unwrap();
            assert!(found.is_read);
        }

        #[tokio::test]
        async fn mark_read_by_non_receiver_is_not_found() {
            let repo = repo();
            let stored = repo.append(new_message(1, 2, "a")).await.unwrap();

            let err = repo.mark_read(stored.id, UserId(1)).await.unwrap_err();
            assert!(matches!(err, RepositoryError::NotFound));
            let err = repo.mark_read(MessageId(999), UserId(2)).await.unwrap_err();
            assert!(matches!(err, RepositoryError::NotFound));

            let found = repo.find_by_id(stored.id).await.unwrap().unwrap();
            assert!(!found.is_read);
        }
    }
}
