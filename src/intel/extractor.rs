//! 正则多模式情报抽取
//!
//! 按固定顺序跑各字段的模式：url → email → upi → phone → ifsc → bank_account。
//! 每匹配到一个子串就把它从工作文本里掩掉，后续字段不再看到同一跨度，
//! 避免一段数字/字母被重复计成两种实体（如 URL 里嵌的号码再被当成裸电话号）。
//! 重叠候选只靠顺序 + 掩蔽裁决，不做最长匹配或优先级打分。
//! 可疑关键词扫描独立于掩蔽管线，在原始文本上做大小写不敏感的包含测试。

use std::collections::BTreeSet;

use regex::Regex;

use crate::intel::RawIntel;

/// 可疑关键词固定词表
pub const SUSPICIOUS_KEYWORDS: [&str; 12] = [
    "blocked",
    "suspended",
    "verify",
    "kyc",
    "alert",
    "urgent",
    "expire",
    "click here",
    "refund",
    "lottery",
    "winner",
    "prize",
];

/// 模式抽取器：构造时编译所有正则，extract 为无状态纯函数
pub struct PatternExtractor {
    url: Regex,
    email: Regex,
    upi: Regex,
    phone: Regex,
    ifsc: Regex,
    bank_account: Regex,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self {
            url: Regex::new(r"(?i)https?://(?:[-\w.]|%[0-9a-f]{2})+[^\s]*").expect("static pattern"),
            email: Regex::new(r"(?i)[a-z0-9_.+-]+@[a-z0-9-]+\.[a-z0-9-.]+").expect("static pattern"),
            // UPI：handle@bank；真正的邮箱（带点号域名）已在上一步被掩掉
            upi: Regex::new(r"(?i)[\w.\-]+@\w+").expect("static pattern"),
            // 印度手机号：可带 +91 前缀，10 位且以 6-9 开头
            phone: Regex::new(r"(?:\+?91[-\s]?)?[6-9]\d{9}").expect("static pattern"),
            // IFSC：4 字母 + 0 + 6 位字母数字
            ifsc: Regex::new(r"(?i)\b[a-z]{4}0[a-z0-9]{6}\b").expect("static pattern"),
            // 银行账号：9-18 位连续数字（手机号在前一步已被消费掉）
            bank_account: Regex::new(r"\b\d{9,18}\b").expect("static pattern"),
        }
    }

    /// 抽取全部字段。空文本返回空表；无匹配的字段不出现在结果里。
    pub fn extract(&self, text: &str) -> RawIntel {
        let mut out = RawIntel::new();
        if text.trim().is_empty() {
            return out;
        }

        // 顺序即语义：前面的字段消费掉的跨度对后面不可见
        let fields: [(&str, &Regex); 6] = [
            ("url", &self.url),
            ("email", &self.email),
            ("upi", &self.upi),
            ("phone", &self.phone),
            ("ifsc", &self.ifsc),
            ("bank_account", &self.bank_account),
        ];

        let mut working = text.to_string();
        for (name, pattern) in fields {
            let values: BTreeSet<String> = pattern
                .find_iter(&working)
                .map(|m| m.as_str().to_string())
                .collect();
            if values.is_empty() {
                continue;
            }
            working = pattern.replace_all(&working, " ").into_owned();
            out.insert(name.to_string(), values.into_iter().collect());
        }

        let lowered = text.to_lowercase();
        let keywords: Vec<String> = SUSPICIOUS_KEYWORDS
            .iter()
            .filter(|kw| lowered.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();
        if !keywords.is_empty() {
            out.insert("suspicious_keywords".to_string(), keywords);
        }

        out
    }
}
