//! 错误类型
//!
//! OracleUnavailable 在编排器内部按既定兜底策略就地消化，从不中止回合；
//! PersistenceFailure / InvalidSession 中止当前回合并上抛，由调用方决定重试。

use thiserror::Error;

/// 回合处理过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 预言机调用失败或超时（分类 / 生成 / 安全审查 / 抽取 / 焦点选择）
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// 存储读写失败；回合的内存结果不得视为已持久化
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// 本应存在的会话记录缺失或损坏
    #[error("Invalid session: {0}")]
    InvalidSession(String),
}
