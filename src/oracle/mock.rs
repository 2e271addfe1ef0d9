//! Mock 生成预言机（用于测试与无 API Key 的本地兜底）
//!
//! 各能力可脚本化：分类结论、焦点队列、回复队列、若干次 UNSAFE 判定、
//! 一批开放实体。failing() 则让所有调用返回 Err，用于验证兜底策略。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::intel::RawIntel;
use crate::oracle::llm_oracle::{BAIT_PERSONAS, DEFAULT_PERSONA};
use crate::oracle::GenerationOracle;
use crate::session::{TargetKey, TurnRecord};

/// 脚本化 Mock 预言机
pub struct MockOracle {
    classify_as_scam: bool,
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    focus_script: Mutex<VecDeque<TargetKey>>,
    unsafe_verdicts: AtomicUsize,
    open_entities: Mutex<Option<RawIntel>>,
    fail_all: bool,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            classify_as_scam: true,
            replies: Mutex::new(VecDeque::new()),
            default_reply: "Oh okay, can you explain that again?".to_string(),
            focus_script: Mutex::new(VecDeque::new()),
            unsafe_verdicts: AtomicUsize::new(0),
            open_entities: Mutex::new(None),
            fail_all: false,
        }
    }
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有能力都失败（模拟预言机不可用）
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn classify_as_scam(mut self, is_scam: bool) -> Self {
        self.classify_as_scam = is_scam;
        self
    }

    /// 追加一条按序弹出的回复；脚本耗尽后用默认回复
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(reply.into());
        self
    }

    /// 追加一个按序弹出的焦点选择；脚本耗尽后 select_focus 返回 Err
    pub fn with_focus(self, key: TargetKey) -> Self {
        self.focus_script.lock().unwrap().push_back(key);
        self
    }

    /// 接下来 n 次安全审查判 UNSAFE
    pub fn with_unsafe_verdicts(self, n: usize) -> Self {
        self.unsafe_verdicts.store(n, Ordering::Relaxed);
        self
    }

    /// 下一次开放抽取返回这批实体（只返回一次）
    pub fn with_open_entities(self, raw: RawIntel) -> Self {
        *self.open_entities.lock().unwrap() = Some(raw);
        self
    }

    fn gate(&self) -> Result<(), String> {
        if self.fail_all {
            Err("mock oracle unavailable".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GenerationOracle for MockOracle {
    async fn classify(&self, _text: &str) -> Result<bool, String> {
        self.gate()?;
        Ok(self.classify_as_scam)
    }

    async fn select_persona(&self, seed: Option<&str>) -> Result<String, String> {
        self.gate()?;
        Ok(match seed {
            Some(_) => BAIT_PERSONAS[0].to_string(),
            None => DEFAULT_PERSONA.to_string(),
        })
    }

    async fn select_focus(
        &self,
        _history: &[TurnRecord],
        _current_text: &str,
        candidates: &[TargetKey],
    ) -> Result<TargetKey, String> {
        self.gate()?;
        let scripted = self.focus_script.lock().unwrap().pop_front();
        match scripted {
            Some(key) if candidates.contains(&key) => Ok(key),
            Some(key) => Err(format!("scripted focus {:?} not a candidate", key)),
            None => Err("focus script exhausted".to_string()),
        }
    }

    async fn generate_reply(
        &self,
        _history: &[TurnRecord],
        _persona: &str,
        _objective: &str,
        _current_text: &str,
        _scam_confirmed: bool,
    ) -> Result<String, String> {
        self.gate()?;
        let scripted = self.replies.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.default_reply.clone()))
    }

    async fn review_safety(&self, _reply: &str) -> Result<bool, String> {
        self.gate()?;
        let remaining = self.unsafe_verdicts.load(Ordering::Relaxed);
        if remaining > 0 {
            self.unsafe_verdicts.store(remaining - 1, Ordering::Relaxed);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    async fn extract_open_entities(
        &self,
        _text: &str,
        _known_fields: &[&str],
    ) -> Result<RawIntel, String> {
        self.gate()?;
        Ok(self.open_entities.lock().unwrap().take().unwrap_or_default())
    }
}
