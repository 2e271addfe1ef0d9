//! 任务完成后的外部上报
//!
//! fire-and-forget：核心只调用 submit，从不等待结果；上报失败只记日志，
//! 绝不回传到回合流程。编排器显式持有本能力，不存在反向依赖。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::session::SessionStore;

/// 上报能力接口
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn submit(&self, session_id: &str);
}

/// 最终结果载荷（对端要求的 camelCase 线格式）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResultPayload {
    pub session_id: String,
    pub scam_detected: bool,
    pub total_messages_exchanged: usize,
    pub extracted_intelligence: ExtractedIntelligence,
    pub agent_notes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIntelligence {
    pub bank_accounts: Vec<String>,
    pub upi_ids: Vec<String>,
    pub phishing_links: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub suspicious_keywords: Vec<String>,
}

/// HTTP 上报器：从存储读会话快照，拼载荷 POST 给外部端点
pub struct HttpReporter {
    store: Arc<dyn SessionStore>,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReporter {
    pub fn new(store: Arc<dyn SessionStore>, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    async fn build_payload(&self, session_id: &str) -> Option<FinalResultPayload> {
        let session = match self.store.get(session_id).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::error!(session = session_id, "Cannot report: session not found");
                return None;
            }
            Err(e) => {
                tracing::error!(session = session_id, "Cannot report: {}", e);
                return None;
            }
        };

        let focus_note = session
            .strategy
            .focus
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "none".to_string());

        Some(FinalResultPayload {
            session_id: session.id.clone(),
            scam_detected: session.scam_confirmed,
            // user + agent 各算一条
            total_messages_exchanged: session.history.len() * 2,
            extracted_intelligence: ExtractedIntelligence {
                bank_accounts: session.extracted.bank_account.iter().cloned().collect(),
                upi_ids: session.extracted.upi.iter().cloned().collect(),
                phishing_links: session.extracted.url.iter().cloned().collect(),
                phone_numbers: session.extracted.phone.iter().cloned().collect(),
                suspicious_keywords: session
                    .extracted
                    .suspicious_keywords
                    .iter()
                    .cloned()
                    .collect(),
            },
            agent_notes: format!(
                "Persona '{}' engaged the scammer. Last strategy focus: {}",
                session.persona_locked, focus_note
            ),
        })
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn submit(&self, session_id: &str) {
        let Some(payload) = self.build_payload(session_id).await else {
            return;
        };

        if let Ok(body) = serde_json::to_string(&payload) {
            tracing::debug!(session = session_id, "Submitting final result: {}", body);
        }

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(session = session_id, "Final result reported");
            }
            Ok(resp) => {
                tracing::error!(
                    session = session_id,
                    status = %resp.status(),
                    "Report endpoint rejected submission"
                );
            }
            Err(e) => {
                tracing::error!(session = session_id, "Failed to submit report: {}", e);
            }
        }
    }
}

/// 未配置上报端点时的空实现
pub struct NoopReporter;

#[async_trait]
impl Reporter for NoopReporter {
    async fn submit(&self, session_id: &str) {
        tracing::info!(
            session = session_id,
            "Report endpoint not configured, skipping submission"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, Session};

    #[tokio::test]
    async fn test_payload_flattens_extracted_sets() {
        let store = MemorySessionStore::shared();
        let mut session = Session::new("s1", "Naive Grandma".to_string());
        session.scam_confirmed = true;
        session.extracted.upi.insert("scammer@okaxis".to_string());
        session.extracted.url.insert("http://phishing.com".to_string());
        session.history.push(crate::session::TurnRecord {
            user: "pay me".to_string(),
            agent: "how?".to_string(),
        });
        store.create(session).await.unwrap();

        let reporter = HttpReporter::new(store, "http://localhost:9".to_string(), None);
        let payload = reporter.build_payload("s1").await.unwrap();

        assert!(payload.scam_detected);
        assert_eq!(payload.total_messages_exchanged, 2);
        assert_eq!(payload.extracted_intelligence.upi_ids, vec!["scammer@okaxis"]);
        assert_eq!(
            payload.extracted_intelligence.phishing_links,
            vec!["http://phishing.com"]
        );
        assert!(payload.agent_notes.contains("Naive Grandma"));

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json["extractedIntelligence"].get("upiIds").is_some());
    }

    #[tokio::test]
    async fn test_missing_session_is_swallowed() {
        let store = MemorySessionStore::shared();
        let reporter = HttpReporter::new(store, "http://localhost:9".to_string(), None);
        // 不存在的会话：无载荷、无恐慌、无错误外泄
        reporter.submit("ghost").await;
    }
}
