//! LLM 客户端抽象与实现
//!
//! 预言机的所有能力都落在同一个 LlmClient 之上；生产实现走 OpenAI 兼容端点
//! （可配置 base_url，Groq 等兼容服务同样适用）。

pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{LlmClient, Message, Role};
