/// 订单ID生成器
///
/// 为策略发出的每笔订单生成可识别的 newClientOrderId，
/// 便于在日志与交易所记录之间做关联。
/// 每次策略调用持有自己的生成器实例，不使用进程级单例。
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

/// 币安 clientOrderId 规则: 最长36字符，字母数字，区分大小写
const MAX_LENGTH: usize = 36;

pub struct OrderIdGenerator {
    strategy_code: String,
    sequence: AtomicU32,
}

impl OrderIdGenerator {
    /// 创建新的生成器，策略标签会被清洗为≤4位大写字母数字
    pub fn new(strategy_tag: &str) -> Self {
        let strategy_code: String = strategy_tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(4)
            .collect::<String>()
            .to_uppercase();

        Self {
            strategy_code,
            sequence: AtomicU32::new(0),
        }
    }

    /// 生成订单ID: [策略代码][MMDDHHMMSS][4位序列号]
    pub fn generate(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = Utc::now().format("%m%d%H%M%S");

        let mut order_id = format!("{}{}{:04}", self.strategy_code, timestamp, seq % 10000);
        if order_id.len() > MAX_LENGTH {
            order_id.truncate(MAX_LENGTH);
        }
        order_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_unique_and_valid() {
        let gen = OrderIdGenerator::new("twap");
        let id1 = gen.generate();
        let id2 = gen.generate();

        assert_ne!(id1, id2);
        assert!(id1.len() <= MAX_LENGTH);
        assert!(id1.starts_with("TWAP"));
        assert!(id1.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tag_sanitized() {
        let gen = OrderIdGenerator::new("grid_v2!");
        let id = gen.generate();
        // 下划线和标点被清洗，只保留前4位字母数字
        assert!(id.starts_with("GRID"));
        assert!(!id.contains('_'));
    }
}
