//! 情报抽取与合并
//!
//! extractor：确定性的正则多模式抽取（按固定字段顺序 + 掩蔽防重叠）；
//! merger：把新发现并入会话累积情报的幂等、可交换集合并集。

pub mod extractor;
pub mod merger;

pub use extractor::PatternExtractor;

/// 原始情报：字段名 → 候选值列表（抽取器与预言机开放抽取的公共输出形状）
pub type RawIntel = std::collections::HashMap<String, Vec<String>>;
