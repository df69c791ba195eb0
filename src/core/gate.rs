//! 处理闸门：每个会话同一时刻只允许一个请求在处理
//!
//! Idle -> Busy（try_acquire，仅当 Idle 时成功，忙则立即返回 None，不排队、不阻塞）；
//! Busy -> Idle（release，幂等）。GateGuard 在 Drop 时释放，保证所有退出路径（正常返回、工具错误、panic）都会解锁。
//! 后台清理任务定期删除非忙且超过 2 × timeout 的条目，防止一次性会话让 Map 无限增长。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::memory::ConversationId;

/// 默认处理超时（用于清理阈值 2 × timeout）
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(120);
/// 默认清理周期
pub const DEFAULT_JANITOR_PERIOD: Duration = Duration::from_secs(300);

/// 单个会话的处理状态
#[derive(Clone, Copy, Debug)]
pub struct ProcessingState {
    pub busy: bool,
    pub started_at: Instant,
    pub timeout: Duration,
}

impl ProcessingState {
    fn new(timeout: Duration) -> Self {
        Self {
            busy: false,
            started_at: Instant::now(),
            timeout,
        }
    }

    fn is_stale(&self) -> bool {
        !self.busy && self.started_at.elapsed() > self.timeout * 2
    }
}

/// 按会话 ID 加锁的非阻塞闸门
#[derive(Debug)]
pub struct ProcessingGate {
    states: DashMap<ConversationId, ProcessingState>,
    timeout: Duration,
}

impl ProcessingGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            states: DashMap::new(),
            timeout,
        }
    }

    /// 尝试进入处理状态；会话已在处理中时返回 None（不修改 started_at）
    pub fn try_acquire(&self, conversation_id: ConversationId) -> Option<GateGuard<'_>> {
        let mut state = self
            .states
            .entry(conversation_id)
            .or_insert_with(|| {
                tracing::debug!(conversation_id, "creating processing state");
                ProcessingState::new(self.timeout)
            });

        if state.busy {
            tracing::info!(conversation_id, "conversation is busy");
            return None;
        }

        state.busy = true;
        state.started_at = Instant::now();
        drop(state);

        tracing::debug!(conversation_id, "processing started");
        Some(GateGuard {
            gate: self,
            conversation_id,
        })
    }

    /// 释放处理状态；已空闲或不存在时为 no-op
    pub fn release(&self, conversation_id: ConversationId) {
        if let Some(mut state) = self.states.get_mut(&conversation_id) {
            state.busy = false;
        }
    }

    pub fn is_busy(&self, conversation_id: ConversationId) -> bool {
        self.states
            .get(&conversation_id)
            .map(|s| s.busy)
            .unwrap_or(false)
    }

    /// 读取状态快照（测试与诊断用）
    pub fn state(&self, conversation_id: ConversationId) -> Option<ProcessingState> {
        self.states.get(&conversation_id).map(|s| *s)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// 删除非忙且超过 2 × timeout 的条目，返回删除数量
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.states.retain(|_, state| {
            if state.is_stale() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// 启动后台清理任务，token 取消后退出
    pub fn spawn_janitor(self: Arc<Self>, period: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // interval 第一次 tick 立即返回
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("processing gate janitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = self.cleanup();
                        if removed > 0 {
                            tracing::info!(removed, remaining = self.len(), "processing gate cleanup");
                        }
                    }
                }
            }
        })
    }
}

impl Default for ProcessingGate {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_TIMEOUT)
    }
}

/// 持有期间会话处于 Busy，Drop 时释放
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a ProcessingGate,
    conversation_id: ConversationId,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(self.conversation_id);
        tracing::debug!(conversation_id = self.conversation_id, "processing released");
    }
}
