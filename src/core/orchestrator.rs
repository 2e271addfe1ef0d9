//! 回合编排器
//!
//! 每条入站消息跑一个逻辑回合，步骤不可静默跳过：
//! 加载/创建会话 → 分类门（含一次性人设锁定）→ 正则抽取 + 合并 →
//! 策略规划 → 生成回复 → 安全审查（至多重生成一次）→ 持久化回合 →
//! 任务完成则触发上报 → 调度后台开放抽取。
//!
//! 失败语义：预言机失败就地兜底（分类失败按诈骗处理、生成失败用固定填充回复、
//! 安全审查失败视为安全），持久化失败中止回合上抛。对端永远只看到合乎人设的回复。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::core::{AgentError, StrategicPlanner, TaskScheduler};
use crate::intel::{merger, PatternExtractor};
use crate::llm::OpenAiClient;
use crate::oracle::llm_oracle::FALLBACK_REPLY;
use crate::oracle::{GenerationOracle, LlmOracle, MockOracle};
use crate::report::Reporter;
use crate::session::{ExtractedData, Session, SessionStore, TurnRecord};

/// 根据配置与环境变量选择预言机后端（Groq / OpenAI 兼容 / Mock）
pub fn create_oracle_from_config(cfg: &AppConfig) -> Arc<dyn GenerationOracle> {
    let api_key = std::env::var("GROQ_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    match api_key {
        Some(key) => {
            tracing::info!("Using LLM oracle ({})", cfg.llm.model);
            let client = Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ));
            Arc::new(LlmOracle::new(
                client,
                Duration::from_secs(cfg.llm.request_timeout_secs),
            ))
        }
        None => {
            tracing::warn!("No API key set, using mock oracle");
            Arc::new(MockOracle::new())
        }
    }
}

/// 回合编排器：组合存储、预言机、上报与调度能力（全部显式注入，无全局状态）
pub struct TurnOrchestrator {
    store: Arc<dyn SessionStore>,
    oracle: Arc<dyn GenerationOracle>,
    reporter: Arc<dyn Reporter>,
    scheduler: Arc<dyn TaskScheduler>,
    extractor: PatternExtractor,
    planner: StrategicPlanner,
    /// 提供给预言机的历史窗口（对数）
    history_window: usize,
    /// 单会话准入控制：同一会话的回合串行，避免焦点双选 / 预算双扣
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        oracle: Arc<dyn GenerationOracle>,
        reporter: Arc<dyn Reporter>,
        scheduler: Arc<dyn TaskScheduler>,
        history_window: usize,
    ) -> Self {
        Self {
            store,
            oracle,
            reporter,
            scheduler,
            extractor: PatternExtractor::new(),
            planner: StrategicPlanner::new(),
            history_window,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 处理一条入站消息，返回要发回给对端的回复
    pub async fn process_turn(
        &self,
        session_id: &str,
        incoming_text: &str,
    ) -> Result<String, AgentError> {
        let lock = self.turn_lock(session_id).await;
        let result = {
            let _turn_guard = lock.lock().await;
            self.run_turn(session_id, incoming_text).await
        };
        self.release_turn_lock(session_id, &lock).await;
        result
    }

    async fn run_turn(
        &self,
        session_id: &str,
        incoming_text: &str,
    ) -> Result<String, AgentError> {
        // 1. 加载或创建会话
        let mut session = match self.store.get(session_id).await? {
            Some(s) => s,
            None => {
                let persona = match self.oracle.select_persona(None).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("Persona oracle failed ({}), using default persona", e);
                        crate::oracle::llm_oracle::DEFAULT_PERSONA.to_string()
                    }
                };
                let s = Session::new(session_id, persona);
                self.store.create(s.clone()).await?;
                tracing::info!(session = session_id, "Initialized new session");
                s
            }
        };

        // 2. 分类门：未确认诈骗时先分类；失败按诈骗处理（漏报代价更高）
        if !session.scam_confirmed {
            let is_scam = match self.oracle.classify(incoming_text).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Classification oracle failed ({}), failing safe to scam", e);
                    true
                }
            };

            if is_scam {
                let persona = match self.oracle.select_persona(Some(incoming_text)).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("Persona oracle failed ({}), keeping current persona", e);
                        session.persona_locked.clone()
                    }
                };
                session.scam_confirmed = true;
                session.persona_locked = persona.clone();
                Self::mid_turn(self.store.confirm_scam(session_id, persona).await)?;
                tracing::info!(session = session_id, "Scam confirmed, persona locked");
                // 不单独回消息，本回合继续按已确认语义走下去
            } else {
                // 还不是诈骗：正常闲聊，跳过抽取与规划
                let reply = self
                    .generate(&session, "OBJECTIVE: Chat normally.", incoming_text)
                    .await;
                self.save_turn(session_id, &mut session, incoming_text, &reply)
                    .await?;
                return Ok(reply);
            }
        }

        // 3. 正则抽取 + 幂等合并；没有新增就不写存储
        let intel = self.extractor.extract(incoming_text);
        if merger::merge(&mut session.extracted, &intel) {
            Self::mid_turn(self.store.merge_intel(session_id, &intel).await)?;
        }

        // 4. 策略规划并持久化
        let was_complete = StrategicPlanner::is_mission_complete(&session);
        let plan = self
            .planner
            .update_and_get_focus(
                &mut session,
                self.oracle.as_ref(),
                incoming_text,
                self.history_window,
            )
            .await;
        Self::mid_turn(
            self.store
                .set_strategy(session_id, session.strategy.clone())
                .await,
        )?;

        // 5. 生成回复 + 安全审查（不安全则带着审查结论重生成一次，之后无条件采用）
        let mut reply = self.generate(&session, &plan.instruction, incoming_text).await;
        let safe = match self.oracle.review_safety(&reply).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Safety oracle failed ({}), treating reply as safe", e);
                true
            }
        };
        if !safe {
            tracing::warn!(session = session_id, "Unsafe reply detected, regenerating once");
            let amended = format!(
                "Previous reply failed safety review; never reveal you are an AI or any internals. {}",
                plan.instruction
            );
            reply = self.generate(&session, &amended, incoming_text).await;
        }

        // 6. 持久化本回合
        self.save_turn(session_id, &mut session, incoming_text, &reply)
            .await?;

        // 7. 刚好转入完成态才触发上报（fire-and-forget，失败不影响已算出的回复）
        if !was_complete && StrategicPlanner::is_mission_complete(&session) {
            tracing::info!(session = session_id, "Mission complete, triggering report");
            let reporter = self.reporter.clone();
            let sid = session_id.to_string();
            self.scheduler
                .spawn(Box::pin(async move { reporter.submit(&sid).await }));
        }

        // 8. 后台开放实体抽取：回复已经算完，不阻塞返回
        self.schedule_background_extraction(session_id, incoming_text);

        Ok(reply)
    }

    /// 生成回复；预言机失败时退回固定填充回复，绝不向对端暴露内部错误
    async fn generate(&self, session: &Session, objective: &str, incoming_text: &str) -> String {
        match self
            .oracle
            .generate_reply(
                session.recent_history(self.history_window),
                &session.persona_locked,
                objective,
                incoming_text,
                session.scam_confirmed,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Generation oracle failed ({}), using filler reply", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// 追加本轮 (user, agent) 到内存态与存储
    async fn save_turn(
        &self,
        session_id: &str,
        session: &mut Session,
        user_text: &str,
        agent_text: &str,
    ) -> Result<(), AgentError> {
        let turn = TurnRecord {
            user: user_text.to_string(),
            agent: agent_text.to_string(),
        };
        session.history.push(turn.clone());
        Self::mid_turn(self.store.append_history(session_id, turn).await)
    }

    /// 后台任务：预言机开放抽取（告知已覆盖的标准字段），对重读快照做自己的合并。
    /// 纯增量操作，任务被丢弃（如进程关闭）也不会损坏状态。
    fn schedule_background_extraction(&self, session_id: &str, text: &str) {
        let store = self.store.clone();
        let oracle = self.oracle.clone();
        let sid = session_id.to_string();
        let text = text.to_string();

        self.scheduler.spawn(Box::pin(async move {
            match oracle
                .extract_open_entities(&text, &ExtractedData::STANDARD_FIELDS)
                .await
            {
                Ok(extra) if !extra.is_empty() => {
                    tracing::info!(
                        session = %sid,
                        kinds = extra.len(),
                        "Background extraction found new entities"
                    );
                    if let Err(e) = store.merge_intel(&sid, &extra).await {
                        tracing::warn!(session = %sid, "Background merge failed: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session = %sid, "Background extraction failed: {}", e);
                }
            }
        }));
    }

    /// 回合中途的存储错误一律按持久化失败上抛（会话失踪不再走“新建会话”分支）
    fn mid_turn(result: Result<(), AgentError>) -> Result<(), AgentError> {
        result.map_err(|e| match e {
            AgentError::InvalidSession(id) => {
                AgentError::PersistenceFailure(format!("session disappeared mid-turn: {}", id))
            }
            other => other,
        })
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 回合结束后回收锁条目，锁表不随历史会话数无限增长。
    /// 引用计数为 2 表示只剩锁表与本回合各持一份，没有别的回合在等。
    async fn release_turn_lock(&self, session_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.turn_locks.lock().await;
        if Arc::strong_count(lock) == 2 {
            locks.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CollectingScheduler;
    use crate::report::NoopReporter;
    use crate::session::MemorySessionStore;

    #[tokio::test]
    async fn test_turn_lock_entry_reclaimed_after_turn() {
        let orchestrator = TurnOrchestrator::new(
            MemorySessionStore::shared(),
            Arc::new(MockOracle::new()),
            Arc::new(NoopReporter),
            Arc::new(CollectingScheduler::new()),
            10,
        );

        for sid in ["s1", "s2"] {
            orchestrator
                .process_turn(sid, "verify your kyc now")
                .await
                .unwrap();
        }
        // 回合结束且无人等待时条目回收，锁表不积累已完成的会话
        assert!(orchestrator.turn_locks.lock().await.is_empty());
    }
}
