/// 精度适配器
///
/// 把价格/数量贴合到交易所合法的 tick/step 网格上，
/// 并截断浮点噪音（不会保留比增量本身更多的小数位）。
use crate::core::error::ExchangeError;
use crate::core::types::SymbolRules;
use crate::core::Result;

/// 调整后数量低于 minQty 时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinQtyPolicy {
    /// 用户指定的下单数量: 低于最小值直接拒绝
    Reject,
    /// TWAP 切片: 抬升到 minQty 继续执行
    ClampToMin,
}

/// 推断增量自身的小数位数，例如 0.001 -> 3, 0.5 -> 1, 1.0 -> 0
fn infer_digits(step: f64) -> u32 {
    if step <= 0.0 {
        return 8;
    }
    let mut digits = 0u32;
    let mut value = step;
    while (value - value.round()).abs() > 1e-9 && digits < 10 {
        value *= 10.0;
        digits += 1;
    }
    digits
}

/// 对齐到增量网格: adjusted = v - (v mod s)，再按增量位数舍入
///
/// 舍入到增量自身的小数位数，既贴合合法网格又消除浮点误差；
/// 幂等: round_step(round_step(v, s), s) == round_step(v, s)。
pub fn round_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    // 容差版的 v - (v mod s): 直接取浮点余数会把恰好落在网格上的值
    // （如 52000 mod 0.1）误判为差一个 tick
    let multiples = (value / step + 1e-8).floor();
    let snapped = multiples * step;
    let digits = infer_digits(step);
    let factor = 10_f64.powi(digits as i32);
    (snapped * factor).round() / factor
}

/// 按交易规则调整数量
///
/// step_size 缺失时透传原值并记录降级（交易所会在服务端兜底拒绝）。
pub fn adjust_quantity(rules: &SymbolRules, quantity: f64, policy: MinQtyPolicy) -> Result<f64> {
    let step = match rules.step_size {
        Some(step) if step > 0.0 => step,
        _ => {
            log::warn!(
                "{} 缺少 stepSize 过滤器，数量 {} 不做精度调整",
                rules.symbol,
                quantity
            );
            return Ok(quantity);
        }
    };

    let mut adjusted = round_step(quantity, step);

    if let Some(min_qty) = rules.min_qty {
        if adjusted < min_qty {
            match policy {
                MinQtyPolicy::ClampToMin => {
                    log::warn!(
                        "{} 数量 {} 低于最小值 {}，抬升到最小值",
                        rules.symbol,
                        adjusted,
                        min_qty
                    );
                    adjusted = min_qty;
                }
                MinQtyPolicy::Reject => {
                    return Err(ExchangeError::OutOfRange {
                        field: "quantity".to_string(),
                        value: adjusted,
                        min: min_qty,
                        max: rules.max_qty.unwrap_or(f64::MAX),
                    });
                }
            }
        }
    }

    if let Some(max_qty) = rules.max_qty {
        if adjusted > max_qty {
            return Err(ExchangeError::OutOfRange {
                field: "quantity".to_string(),
                value: adjusted,
                min: rules.min_qty.unwrap_or(0.0),
                max: max_qty,
            });
        }
    }

    Ok(adjusted)
}

/// 按交易规则调整单个价格
pub fn adjust_price(rules: &SymbolRules, price: f64) -> Result<f64> {
    let tick = match rules.tick_size {
        Some(tick) if tick > 0.0 => tick,
        _ => {
            log::warn!(
                "{} 缺少 tickSize 过滤器，价格 {} 不做精度调整",
                rules.symbol,
                price
            );
            return Ok(price);
        }
    };

    let adjusted = round_step(price, tick);

    let min_price = rules.min_price.unwrap_or(0.0);
    let max_price = rules.max_price.unwrap_or(f64::MAX);
    if adjusted < min_price || adjusted > max_price {
        return Err(ExchangeError::OutOfRange {
            field: "price".to_string(),
            value: adjusted,
            min: min_price,
            max: max_price,
        });
    }

    Ok(adjusted)
}

/// 批量调整价格（网格用）
pub fn adjust_prices(rules: &SymbolRules, prices: &[f64]) -> Result<Vec<f64>> {
    prices.iter().map(|&p| adjust_price(rules, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rules() -> SymbolRules {
        SymbolRules {
            symbol: "BTCUSDT".to_string(),
            price_precision: 2,
            quantity_precision: 3,
            tick_size: Some(0.1),
            step_size: Some(0.001),
            min_qty: Some(0.001),
            max_qty: Some(1000.0),
            min_price: Some(0.1),
            max_price: Some(1_000_000.0),
        }
    }

    #[test]
    fn test_round_step_snaps_down() {
        assert!((round_step(0.0029, 0.001) - 0.002).abs() < 1e-12);
        assert!((round_step(50123.456, 0.1) - 50123.4).abs() < 1e-9);
        assert!((round_step(7.0, 1.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_step_idempotent() {
        for &(value, step) in &[
            (0.12345678, 0.001),
            (50000.07, 0.01),
            (3.3333333, 0.5),
            (199.99, 0.1),
        ] {
            let once = round_step(value, step);
            let twice = round_step(once, step);
            assert_eq!(once, twice, "v={} s={}", value, step);
        }
    }

    #[test]
    fn test_round_step_truncates_float_noise() {
        // 0.1+0.2 的浮点噪音应被增量位数截断
        let noisy = 0.1_f64 + 0.2_f64;
        assert_eq!(round_step(noisy, 0.1), 0.3);
    }

    #[test]
    fn test_adjust_quantity_reject_below_min() {
        let rules = sample_rules();
        match adjust_quantity(&rules, 0.0004, MinQtyPolicy::Reject) {
            Err(ExchangeError::OutOfRange { field, .. }) => assert_eq!(field, "quantity"),
            other => panic!("意外结果: {:?}", other),
        }
    }

    #[test]
    fn test_adjust_quantity_clamp_below_min() {
        let rules = sample_rules();
        let adjusted = adjust_quantity(&rules, 0.0004, MinQtyPolicy::ClampToMin).unwrap();
        assert_eq!(adjusted, 0.001);
    }

    #[test]
    fn test_adjust_quantity_above_max() {
        let rules = sample_rules();
        assert!(adjust_quantity(&rules, 2000.0, MinQtyPolicy::Reject).is_err());
    }

    #[test]
    fn test_missing_metadata_passthrough() {
        let rules = SymbolRules::unbounded("NEWUSDT");
        assert_eq!(
            adjust_quantity(&rules, 0.1234567, MinQtyPolicy::Reject).unwrap(),
            0.1234567
        );
        assert_eq!(adjust_price(&rules, 1234.5678).unwrap(), 1234.5678);
    }

    #[test]
    fn test_adjust_prices_batch() {
        let rules = sample_rules();
        let adjusted = adjust_prices(&rules, &[48000.07, 50000.123, 52000.0]).unwrap();
        assert_eq!(adjusted, vec![48000.0, 50000.1, 52000.0]);
    }
}
