//! 生成预言机
//!
//! 核心消费的全部自然语言能力走同一个接口：分类、人设选择、焦点选择、
//! 回复生成、安全审查、开放实体抽取。核心不重新实现语言理解，
//! 只定义契约并对失败应用既定的兜底策略（见 core::orchestrator）。

pub mod llm_oracle;
pub mod mock;

use async_trait::async_trait;

use crate::intel::RawIntel;
use crate::session::{TargetKey, TurnRecord};

pub use llm_oracle::LlmOracle;
pub use mock::MockOracle;

/// 生成预言机接口。所有方法都可能失败或超时；调用方负责兜底。
#[async_trait]
pub trait GenerationOracle: Send + Sync {
    /// 判定消息是否为诈骗
    async fn classify(&self, text: &str) -> Result<bool, String>;

    /// 选择人设：seed 为触发消息（确认诈骗时）或 None（会话创建时）
    async fn select_persona(&self, seed: Option<&str>) -> Result<String, String>;

    /// 在候选目标中选择下一个战术焦点
    async fn select_focus(
        &self,
        history: &[TurnRecord],
        current_text: &str,
        candidates: &[TargetKey],
    ) -> Result<TargetKey, String>;

    /// 按人设与当前目标生成回复
    async fn generate_reply(
        &self,
        history: &[TurnRecord],
        persona: &str,
        objective: &str,
        current_text: &str,
        scam_confirmed: bool,
    ) -> Result<String, String>;

    /// 安全审查：回复是否可以发出（true = 安全）
    async fn review_safety(&self, reply: &str) -> Result<bool, String>;

    /// 开放实体抽取：只找 known_fields 之外的新型具体标识
    async fn extract_open_entities(
        &self,
        text: &str,
        known_fields: &[&str],
    ) -> Result<RawIntel, String>;
}
