//! 会话存储抽象层
//!
//! 核心只依赖这个接口；文档库的线协议属于外部协作者。集合字段的写入必须是
//! 读-合并-写（集合并集），绝不整体盲写，这样后台抽取任务与主回合可以安全竞争。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::intel::merger;
use crate::session::{Session, StrategyState, TurnRecord};

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 按 ID 查会话，不存在返回 None
    async fn get(&self, id: &str) -> Result<Option<Session>, AgentError>;

    /// 写入新会话
    async fn create(&self, session: Session) -> Result<(), AgentError>;

    /// 确认诈骗：置位 scam_confirmed 并锁定人设（标量字段整体替换）
    async fn confirm_scam(&self, id: &str, persona: String) -> Result<(), AgentError>;

    /// 把一批原始情报并入会话（集合并集语义，读-合并-写）
    async fn merge_intel(
        &self,
        id: &str,
        raw: &HashMap<String, Vec<String>>,
    ) -> Result<(), AgentError>;

    /// 整体替换策略状态
    async fn set_strategy(&self, id: &str, strategy: StrategyState) -> Result<(), AgentError>;

    /// 追加一轮对话
    async fn append_history(&self, id: &str, turn: TurnRecord) -> Result<(), AgentError>;
}

/// 内存会话存储（参考实现，也用于测试）
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 持写锁定位会话并就地修改；会话不存在视为持久化层面的会话失踪
    async fn with_session<F>(&self, id: &str, f: F) -> Result<(), AgentError>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                f(session);
                Ok(())
            }
            None => Err(AgentError::InvalidSession(id.to_string())),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, AgentError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn create(&self, session: Session) -> Result<(), AgentError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn confirm_scam(&self, id: &str, persona: String) -> Result<(), AgentError> {
        self.with_session(id, |s| {
            s.scam_confirmed = true;
            s.persona_locked = persona;
        })
        .await
    }

    async fn merge_intel(
        &self,
        id: &str,
        raw: &HashMap<String, Vec<String>>,
    ) -> Result<(), AgentError> {
        self.with_session(id, |s| {
            merger::merge(&mut s.extracted, raw);
        })
        .await
    }

    async fn set_strategy(&self, id: &str, strategy: StrategyState) -> Result<(), AgentError> {
        self.with_session(id, |s| {
            s.strategy = strategy;
        })
        .await
    }

    async fn append_history(&self, id: &str, turn: TurnRecord) -> Result<(), AgentError> {
        self.with_session(id, |s| {
            s.history.push(turn);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_get_roundtrip() {
        let store = MemorySessionStore::new();
        store
            .create(Session::new("s1", "persona".to_string()))
            .await
            .unwrap();

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "s1");
        assert!(!loaded.scam_confirmed);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_on_missing_session_is_invalid_session() {
        let store = MemorySessionStore::new();
        let err = store
            .confirm_scam("ghost", "persona".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_merge_intel_is_read_merge_write() {
        let store = MemorySessionStore::new();
        store
            .create(Session::new("s1", "persona".to_string()))
            .await
            .unwrap();

        // 两个“并发写者”各自携带部分重叠的值，结果应为并集
        let mut a = HashMap::new();
        a.insert("upi".to_string(), vec!["x@okaxis".to_string()]);
        let mut b = HashMap::new();
        b.insert(
            "upi".to_string(),
            vec!["x@okaxis".to_string(), "y@paytm".to_string()],
        );

        store.merge_intel("s1", &a).await.unwrap();
        store.merge_intel("s1", &b).await.unwrap();

        let session = store.get("s1").await.unwrap().unwrap();
        assert_eq!(session.extracted.upi.len(), 2);
    }
}
