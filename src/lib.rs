//! Wasp - Rust 反诈蜜罐智能体
//!
//! 模块划分：
//! - **api**: HTTP 对外接口（/api/chat、/track 蜜罐链接，feature = "http"）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合编排、策略规划、错误类型、后台任务调度
//! - **intel**: 正则多模式情报抽取与幂等合并
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容端点）
//! - **oracle**: 生成预言机（分类 / 人设 / 焦点 / 回复 / 安全审查 / 开放抽取）
//! - **report**: 任务完成后的外部上报
//! - **session**: 会话数据模型与存储抽象

#[cfg(feature = "http")]
pub mod api;
pub mod config;
pub mod core;
pub mod intel;
pub mod llm;
pub mod observability;
pub mod oracle;
pub mod report;
pub mod session;
