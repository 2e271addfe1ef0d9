//! LLM 生成预言机
//!
//! 把 GenerationOracle 的各能力落到同一个 LlmClient 上：每个能力一段提示词，
//! 输出按约定格式解析。所有调用带统一超时，超时视为该次调用失败（由调用方兜底）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::intel::RawIntel;
use crate::llm::{LlmClient, Message};
use crate::oracle::GenerationOracle;
use crate::session::{TargetKey, TurnRecord};

/// 会话创建时的中性人设（尚未确认诈骗，保持礼貌谨慎）
pub const DEFAULT_PERSONA: &str = "You are a middle-aged person responding to an unknown contact. \
Polite but cautious, slightly busy or distracted. Ask who they are and what they want. \
Keep responses brief and natural. Do NOT share personal info. \
Show mild confusion about unexpected messages. Only output the exact message, English only.";

/// 确认诈骗后可锁定的钓饵人设
pub const BAIT_PERSONAS: [&str; 4] = [
    "Naive Grandma: Confused, slow, mentions grandkids, uses wrong tech terms.",
    "Over-eager Employee: Wants to follow rules, very polite, slightly bureaucratic.",
    "Tech Illiterate Dad: Trying his best, types in caps sometimes, asks 'is this the google?'.",
    "Skeptical but Greedy: Suspicious but really wants the money/prize.",
];

/// 生成失败时的兜底回复（保持人设，不暴露内部错误）
pub const FALLBACK_REPLY: &str = "Oh dear, I seem to be having trouble with my phone currently.";

/// LLM 预言机：LlmClient + 统一调用超时
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        match tokio::time::timeout(self.timeout, self.llm.complete(messages)).await {
            Ok(result) => result,
            Err(_) => Err("oracle call timed out".to_string()),
        }
    }

    /// 对话历史转 LLM 消息（user/assistant 对）
    fn history_messages(history: &[TurnRecord]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() * 2);
        for turn in history {
            messages.push(Message::user(&turn.user));
            messages.push(Message::assistant(&turn.agent));
        }
        messages
    }
}

#[async_trait]
impl GenerationOracle for LlmOracle {
    async fn classify(&self, text: &str) -> Result<bool, String> {
        let prompt = format!(
            r#"Analyze the following message and determine if it is a SCAM or SAFE.
SCAM includes: fraud, phishing, urgency, threats, fake offers, lottery, KYC updates.
SAFE includes: greetings, normal questions, non-suspicious chat.

Message: "{}"

Respond with ONLY one word: "SCAM" or "SAFE"."#,
            text
        );

        let response = self.complete(&[Message::user(prompt)]).await?;
        Ok(response.to_uppercase().contains("SCAM"))
    }

    async fn select_persona(&self, seed: Option<&str>) -> Result<String, String> {
        // 会话创建阶段不烧 LLM 调用，直接用中性开场人设
        let Some(seed) = seed else {
            return Ok(DEFAULT_PERSONA.to_string());
        };

        let catalogue = BAIT_PERSONAS
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"A scammer just sent this message:
"{}"

Pick the persona best suited to waste this scammer's time:
{}

Respond with ONLY the number."#,
            seed, catalogue
        );

        let response = self.complete(&[Message::user(prompt)]).await?;
        let index: usize = response
            .trim()
            .chars()
            .find(|c| c.is_ascii_digit())
            .and_then(|c| c.to_digit(10))
            .map(|d| d as usize)
            .ok_or_else(|| format!("unparseable persona choice: {}", response))?;

        BAIT_PERSONAS
            .get(index.wrapping_sub(1))
            .map(|p| p.to_string())
            .ok_or_else(|| format!("persona index out of range: {}", index))
    }

    async fn select_focus(
        &self,
        history: &[TurnRecord],
        current_text: &str,
        candidates: &[TargetKey],
    ) -> Result<TargetKey, String> {
        let keys = candidates
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut messages = vec![Message::system(format!(
            r#"You steer a scam-baiting conversation. Based on the dialogue, pick the single
piece of identifying information we should try to elicit from the scammer next.

Allowed choices: {}

Respond with ONLY one of the allowed keys, nothing else."#,
            keys
        ))];
        messages.extend(Self::history_messages(history));
        messages.push(Message::user(current_text));

        let response = self.complete(&messages).await?;
        let answer = response.trim();

        TargetKey::parse(answer)
            .filter(|k| candidates.contains(k))
            // 容忍预言机把键嵌在整句话里
            .or_else(|| {
                candidates
                    .iter()
                    .find(|k| answer.to_lowercase().contains(k.as_str()))
                    .copied()
            })
            .ok_or_else(|| format!("unparseable focus choice: {}", answer))
    }

    async fn generate_reply(
        &self,
        history: &[TurnRecord],
        persona: &str,
        objective: &str,
        current_text: &str,
        scam_confirmed: bool,
    ) -> Result<String, String> {
        let stance = if scam_confirmed {
            "The sender is a confirmed scammer. Waste their time and work toward the objective \
             without them realizing it."
        } else {
            "The sender is not yet confirmed as a scammer. Chat normally and stay cautious."
        };

        let system_prompt = format!(
            r#"You are an agentic honeypot baiting a scammer over chat.

PERSONA: {}
CURRENT OBJECTIVE: {}
{}

GUIDELINES:
- Stay in character at all times.
- Do NOT give real info. Make up believable fake details.
- Act gullible but slightly confused to prolong the chat.
- If asking for info (like bank details), make it seem like you WANT to pay but keep failing.
- Only output the exact chat message."#,
            persona, objective, stance
        );

        let mut messages = vec![Message::system(system_prompt)];
        messages.extend(Self::history_messages(history));
        messages.push(Message::user(current_text));

        let reply = self.complete(&messages).await?;
        Ok(reply.trim().to_string())
    }

    async fn review_safety(&self, reply: &str) -> Result<bool, String> {
        let prompt = format!(
            r#"Review this chat response: "{}"

1. Does it say "I am an AI" or otherwise reveal it is a bot?
2. Does it leak technical JSON or internal logic?
3. Is it offensive or illegal?

If ANY of these are true, respond "UNSAFE". Otherwise respond "SAFE"."#,
            reply
        );

        let response = self.complete(&[Message::user(prompt)]).await?;
        Ok(!response.to_uppercase().contains("UNSAFE"))
    }

    async fn extract_open_entities(
        &self,
        text: &str,
        known_fields: &[&str],
    ) -> Result<RawIntel, String> {
        let prompt = format!(
            r#"You are a strict "NEW ENTITY" extractor.

Known entity types already covered by the pattern system:
{}

User message:
{}

Task:
- Look ONLY for concrete identifiers that are NOT covered by the known entity types above.
- Examples: OTP codes, Aadhaar/PAN, card numbers, CVV, login credentials,
  transaction IDs, wallet IDs, QR payloads, crypto wallet addresses, IMEI, etc.

Output rules:
1) If you find ANY new concrete identifier, output ONLY lines of the form:
   <entity_name>: <exact_value_from_message>
2) If you do NOT find anything new, output EXACTLY: Nothing new found
3) DO NOT output advice, explanations, or scam analysis.
4) DO NOT guess or invent. If unsure, output: Nothing new found"#,
            known_fields.join(","),
            text
        );

        let response = self.complete(&[Message::user(prompt)]).await?;
        if response.contains("Nothing new found") {
            return Ok(RawIntel::new());
        }

        let mut extracted = RawIntel::new();
        for line in response.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase().replace(' ', "_");
            let value = value.trim().to_string();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            extracted.entry(key).or_insert_with(Vec::new).push(value);
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 固定应答的 LlmClient，用于解析逻辑测试
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| "script exhausted".to_string())
        }
    }

    fn oracle(responses: &[&str]) -> LlmOracle {
        LlmOracle::new(ScriptedLlm::new(responses), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_classify_parses_verdict() {
        assert!(oracle(&["SCAM"]).classify("send otp now").await.unwrap());
        assert!(!oracle(&["SAFE"]).classify("hi, lunch today?").await.unwrap());
    }

    #[tokio::test]
    async fn test_review_safety_does_not_confuse_unsafe_with_safe() {
        assert!(!oracle(&["UNSAFE"]).review_safety("I am an AI").await.unwrap());
        assert!(oracle(&["SAFE"]).review_safety("ok dear").await.unwrap());
    }

    #[tokio::test]
    async fn test_select_persona_without_seed_skips_llm() {
        let persona = oracle(&[]).select_persona(None).await.unwrap();
        assert_eq!(persona, DEFAULT_PERSONA);
    }

    #[tokio::test]
    async fn test_select_focus_parses_embedded_key() {
        let candidates = [TargetKey::Upi, TargetKey::Url];
        let focus = oracle(&["I would go for upi next."])
            .select_focus(&[], "pay me", &candidates)
            .await
            .unwrap();
        assert_eq!(focus, TargetKey::Upi);
    }

    #[tokio::test]
    async fn test_select_focus_rejects_non_candidate() {
        let candidates = [TargetKey::Url];
        let result = oracle(&["phone"])
            .select_focus(&[], "pay me", &candidates)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_extract_open_entities_parses_lines() {
        let out = oracle(&["otp code: 445566\ncrypto wallet: bc1qxyz"])
            .extract_open_entities("msg", &["upi", "phone"])
            .await
            .unwrap();
        assert_eq!(out["otp_code"], vec!["445566"]);
        assert_eq!(out["crypto_wallet"], vec!["bc1qxyz"]);
    }

    #[tokio::test]
    async fn test_extract_open_entities_nothing_new() {
        let out = oracle(&["Nothing new found"])
            .extract_open_entities("msg", &["upi"])
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
