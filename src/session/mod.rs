//! 会话数据模型
//!
//! 一个会话对应一个外部提供的对话 ID。记录诈骗确认标记（单调 false→true）、
//! 锁定人设（确认后不再变更）、目标状态机、累积情报与完整对话历史。

pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{MemorySessionStore, SessionStore};

/// 会话生命周期标记（CLOSED 预留，当前只用 ACTIVE）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// 情报目标类别：希望诈骗者吐出的标识信息
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKey {
    Upi,
    BankAccount,
    Url,
    Ip,
    Phone,
    Ifsc,
    Email,
}

impl TargetKey {
    pub const ALL: [TargetKey; 7] = [
        TargetKey::Upi,
        TargetKey::BankAccount,
        TargetKey::Url,
        TargetKey::Ip,
        TargetKey::Phone,
        TargetKey::Ifsc,
        TargetKey::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKey::Upi => "upi",
            TargetKey::BankAccount => "bank_account",
            TargetKey::Url => "url",
            TargetKey::Ip => "ip",
            TargetKey::Phone => "phone",
            TargetKey::Ifsc => "ifsc",
            TargetKey::Email => "email",
        }
    }

    /// 宽松解析（忽略大小写与首尾空白，容忍预言机输出的多余引号）
    pub fn parse(s: &str) -> Option<TargetKey> {
        let s = s.trim().trim_matches(|c| c == '"' || c == '\'').to_lowercase();
        match s.as_str() {
            "upi" => Some(TargetKey::Upi),
            "bank_account" | "bankaccount" | "bank account" => Some(TargetKey::BankAccount),
            "url" => Some(TargetKey::Url),
            "ip" => Some(TargetKey::Ip),
            "phone" => Some(TargetKey::Phone),
            "ifsc" => Some(TargetKey::Ifsc),
            "email" => Some(TargetKey::Email),
            _ => None,
        }
    }
}

/// 目标状态机阶段（SUCCESS / FAILURE 为终态，终态目标不再被选为焦点）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    NotInitialized,
    Initialized,
    Success,
    Failure,
}

impl TargetPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetPhase::Success | TargetPhase::Failure)
    }
}

/// 单个目标的追踪状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub phase: TargetPhase,
    /// 尝试预算：每次聚焦失败减一，归零转 FAILURE，永不为负
    pub remaining_iterations: u8,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            phase: TargetPhase::NotInitialized,
            remaining_iterations: 3,
        }
    }
}

/// 策略状态：当前焦点 + 全部目标状态机
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyState {
    /// None 或一个处于 INITIALIZED 状态的目标
    pub focus: Option<TargetKey>,
    pub targets: BTreeMap<TargetKey, TargetState>,
}

impl Default for StrategyState {
    fn default() -> Self {
        Self {
            focus: None,
            targets: TargetKey::ALL
                .iter()
                .map(|k| (*k, TargetState::default()))
                .collect(),
        }
    }
}

/// 固定字段之外的开放情报记录，按 (type, value) 整体去重
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DynamicIntel {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub value: String,
}

/// 累积情报：七个标准字段均为字符串集合（集合语义是合并可交换/幂等的前提）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub upi: BTreeSet<String>,
    pub bank_account: BTreeSet<String>,
    pub ifsc: BTreeSet<String>,
    pub phone: BTreeSet<String>,
    pub url: BTreeSet<String>,
    pub email: BTreeSet<String>,
    pub suspicious_keywords: BTreeSet<String>,
    pub dynamic_intel: BTreeSet<DynamicIntel>,
}

impl ExtractedData {
    /// 有独立字段的标准键；其余键一律进 dynamic_intel
    pub const STANDARD_FIELDS: [&'static str; 7] = [
        "upi",
        "bank_account",
        "ifsc",
        "phone",
        "url",
        "email",
        "suspicious_keywords",
    ];

    pub fn field(&self, name: &str) -> Option<&BTreeSet<String>> {
        match name {
            "upi" => Some(&self.upi),
            "bank_account" => Some(&self.bank_account),
            "ifsc" => Some(&self.ifsc),
            "phone" => Some(&self.phone),
            "url" => Some(&self.url),
            "email" => Some(&self.email),
            "suspicious_keywords" => Some(&self.suspicious_keywords),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut BTreeSet<String>> {
        match name {
            "upi" => Some(&mut self.upi),
            "bank_account" => Some(&mut self.bank_account),
            "ifsc" => Some(&mut self.ifsc),
            "phone" => Some(&mut self.phone),
            "url" => Some(&mut self.url),
            "email" => Some(&mut self.email),
            "suspicious_keywords" => Some(&mut self.suspicious_keywords),
            _ => None,
        }
    }

    /// dynamic_intel 中是否存在指定类型的记录
    pub fn has_dynamic(&self, type_tag: &str) -> bool {
        self.dynamic_intel.iter().any(|d| d.type_tag == type_tag)
    }
}

/// 一轮对话（诈骗者发言 + 智能体回复）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub user: String,
    pub agent: String,
}

/// 单个会话文档
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    /// 单调标记：由分类门设置一次，之后不再翻回 false
    pub scam_confirmed: bool,
    /// 确认诈骗时锁定的人设描述，之后整个会话不漂移
    pub persona_locked: String,
    pub strategy: StrategyState,
    pub extracted: ExtractedData,
    /// 追加式对话历史，最旧在前
    pub history: Vec<TurnRecord>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, persona: String) -> Self {
        Self {
            id: id.into(),
            status: SessionStatus::Active,
            scam_confirmed: false,
            persona_locked: persona,
            strategy: StrategyState::default(),
            extracted: ExtractedData::default(),
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// 最近 n 轮对话（提供给预言机的有界窗口）
    pub fn recent_history(&self, n: usize) -> &[TurnRecord] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// 目标成功判定：对应字段里出现过任何值即算成功（后台抽取补上的也算）。
    /// ip 目标没有标准字段，查 dynamic_intel 中 type == "ip" 的记录。
    pub fn has_value_for(&self, key: TargetKey) -> bool {
        match key {
            TargetKey::Ip => self.extracted.has_dynamic("ip"),
            other => self
                .extracted
                .field(other.as_str())
                .map(|set| !set.is_empty())
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_history_window() {
        let mut session = Session::new("s1", "persona".to_string());
        for i in 0..15 {
            session.history.push(TurnRecord {
                user: format!("u{}", i),
                agent: format!("a{}", i),
            });
        }
        let recent = session.recent_history(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].user, "u5");
        assert_eq!(recent[9].user, "u14");
    }

    #[test]
    fn test_ip_target_reads_dynamic_intel() {
        let mut session = Session::new("s1", "persona".to_string());
        assert!(!session.has_value_for(TargetKey::Ip));

        session.extracted.dynamic_intel.insert(DynamicIntel {
            type_tag: "ip".to_string(),
            value: "203.0.113.7".to_string(),
        });
        assert!(session.has_value_for(TargetKey::Ip));
    }

    #[test]
    fn test_target_key_parse_is_lenient() {
        assert_eq!(TargetKey::parse(" UPI "), Some(TargetKey::Upi));
        assert_eq!(TargetKey::parse("\"bank_account\""), Some(TargetKey::BankAccount));
        assert_eq!(TargetKey::parse("crypto_wallet"), None);
    }

    #[test]
    fn test_default_strategy_covers_all_targets() {
        let strategy = StrategyState::default();
        assert_eq!(strategy.targets.len(), TargetKey::ALL.len());
        assert!(strategy.focus.is_none());
        for state in strategy.targets.values() {
            assert_eq!(state.phase, TargetPhase::NotInitialized);
            assert_eq!(state.remaining_iterations, 3);
        }
    }
}
