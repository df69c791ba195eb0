//! 会话历史存储
//!
//! 按会话 ID 保存有界的 Turn 列表（默认 15 条）。DashMap 分片锁只用于取得条目句柄，
//! 每个会话自身的 Mutex 只覆盖 push / clone，不同会话之间互不阻塞，也不会跨网络调用持锁。
//!
//! 条目在首次 append / snapshot 时创建且从不删除：内存上限 = 不同会话数 × 容量（进程级缓存）。

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::core::AgentError;
use crate::memory::{ConversationId, ConversationMemory, Turn};

/// 默认每个会话保留的轮次数
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

type SharedMemory = Arc<Mutex<ConversationMemory>>;

/// 所有会话的历史
#[derive(Debug)]
pub struct HistoryStore {
    conversations: DashMap<ConversationId, SharedMemory>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn entry(&self, conversation_id: ConversationId) -> SharedMemory {
        self.conversations
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(ConversationMemory::new(self.capacity))))
            .clone()
    }

    /// 追加一个轮次，超出容量时丢弃最旧的
    pub fn append(&self, conversation_id: ConversationId, turn: Turn) {
        let memory = self.entry(conversation_id);
        lock(&memory).push(turn);
    }

    /// 返回历史副本；尚无任何轮次时返回 HistoryEmpty
    pub fn snapshot(&self, conversation_id: ConversationId) -> Result<Vec<Turn>, AgentError> {
        let memory = self.entry(conversation_id);
        let memory = lock(&memory);
        if memory.is_empty() {
            return Err(AgentError::HistoryEmpty);
        }
        Ok(memory.to_vec())
    }

    pub fn len(&self, conversation_id: ConversationId) -> usize {
        self.conversations
            .get(&conversation_id)
            .map(|m| lock(m.value()).len())
            .unwrap_or(0)
    }

    /// 已知会话数
    pub fn conversations(&self) -> usize {
        self.conversations.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// 临界区内不会 panic，中毒时直接取回数据
fn lock(memory: &Mutex<ConversationMemory>) -> MutexGuard<'_, ConversationMemory> {
    memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
