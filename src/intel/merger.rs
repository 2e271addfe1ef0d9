//! 情报合并
//!
//! 把一批原始情报（正则抽取或预言机开放抽取的输出）并入会话累积情报。
//! 底层操作是集合并集，因此合并幂等且与其他并发合并可交换 —— 后台抽取任务
//! 与主回合对同一会话竞争时不会丢更新。没有新增时返回 false，调用方据此跳过持久化。

use crate::intel::RawIntel;
use crate::session::{DynamicIntel, ExtractedData};

/// 归一化：键和值都去首尾空白，丢掉空键/空值/空列表
pub fn normalize(raw: &RawIntel) -> RawIntel {
    let mut clean = RawIntel::new();
    for (key, values) in raw {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let valid: Vec<String> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if !valid.is_empty() {
            clean.insert(key.to_string(), valid);
        }
    }
    clean
}

/// 并入累积情报并返回是否有新增。
///
/// 标准字段做字符串集合并集；其余键转成 `{type, value}` 记录并按整条记录
/// 去重进 dynamic_intel。调用方传入的内存态会被就地更新，本回合后续步骤
/// 无需重读即可看到最新数据。
pub fn merge(data: &mut ExtractedData, raw: &RawIntel) -> bool {
    let mut changed = false;

    for (key, values) in normalize(raw) {
        if let Some(set) = data.field_mut(&key) {
            for v in values {
                changed |= set.insert(v);
            }
        } else {
            for v in values {
                changed |= data.dynamic_intel.insert(DynamicIntel {
                    type_tag: key.clone(),
                    value: v,
                });
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &[&str])]) -> RawIntel {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut data = ExtractedData::default();
        let intel = raw(&[("upi", &["scammer@okaxis"]), ("otp", &["123456"])]);

        assert!(merge(&mut data, &intel));
        let after_first = data.clone();

        // 第二次并入同一批，内容不变且报告无新增
        assert!(!merge(&mut data, &intel));
        assert_eq!(data, after_first);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = raw(&[("upi", &["a@okaxis", "b@paytm"]), ("url", &["http://x.com"])]);
        let b = raw(&[("upi", &["b@paytm", "c@ybl"]), ("card_number", &["4111111111111111"])]);

        let mut ab = ExtractedData::default();
        merge(&mut ab, &a);
        merge(&mut ab, &b);

        let mut ba = ExtractedData::default();
        merge(&mut ba, &b);
        merge(&mut ba, &a);

        assert_eq!(ab, ba);
        assert_eq!(ab.upi.len(), 3);
    }

    #[test]
    fn test_unknown_keys_become_dynamic_intel() {
        let mut data = ExtractedData::default();
        merge(&mut data, &raw(&[("crypto_wallet", &["bc1qxyz"])]));

        assert!(data.has_dynamic("crypto_wallet"));
        // (type, value) 整体判等去重
        assert!(!merge(&mut data, &raw(&[("crypto_wallet", &["bc1qxyz"])])));
        assert!(merge(&mut data, &raw(&[("crypto_wallet", &["bc1qabc"])])));
        assert_eq!(data.dynamic_intel.len(), 2);
    }

    #[test]
    fn test_normalize_drops_empty_keys_and_values() {
        let intel = raw(&[("upi", &["", "  "]), ("", &["x"]), ("phone", &["9876543210", ""])]);
        let clean = normalize(&intel);

        assert_eq!(clean.len(), 1);
        assert_eq!(clean["phone"], vec!["9876543210"]);

        let mut data = ExtractedData::default();
        assert!(merge(&mut data, &intel));
        assert!(data.upi.is_empty());
        assert_eq!(data.phone.len(), 1);
    }

    #[test]
    fn test_values_trimmed_before_union() {
        let mut data = ExtractedData::default();
        assert!(merge(&mut data, &raw(&[("upi", &[" x@okaxis "])])));

        // 带空白与不带空白的同一个值不得变成两条集合成员
        assert!(!merge(&mut data, &raw(&[("upi", &["x@okaxis"])])));
        assert_eq!(data.upi.len(), 1);
        assert!(data.upi.contains("x@okaxis"));
    }

    #[test]
    fn test_no_change_reports_false() {
        let mut data = ExtractedData::default();
        assert!(!merge(&mut data, &RawIntel::new()));
        assert!(!merge(&mut data, &raw(&[("upi", &[""])])));
    }
}
