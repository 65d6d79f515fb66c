/// 参数验证器
///
/// 所有验证在任何下单网络调用之前执行（fail-fast），
/// 失败时返回 InvalidParameter 并注明出错字段。
use crate::core::config::Config;
use crate::core::error::ExchangeError;
use crate::core::types::PositionSide;
use crate::core::Result;

fn invalid(field: &str, reason: String) -> ExchangeError {
    ExchangeError::InvalidParameter {
        field: field.to_string(),
        reason,
    }
}

/// 验证交易对格式并返回大写形式
///
/// 要求: 非空、纯字母数字、长度≥6、以配置的计价货币结尾
pub fn validate_symbol(symbol: &str, quote_asset: &str) -> Result<String> {
    let normalized = symbol.trim().to_uppercase();

    if normalized.is_empty() {
        return Err(invalid("symbol", "交易对不能为空".to_string()));
    }
    if normalized.len() < 6 {
        return Err(invalid(
            "symbol",
            format!("{} 长度不足，至少6个字符", normalized),
        ));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(
            "symbol",
            format!("{} 包含非法字符，只允许字母和数字", normalized),
        ));
    }
    if !normalized.ends_with(&quote_asset.to_uppercase()) {
        return Err(invalid(
            "symbol",
            format!("{} 必须以 {} 结尾", normalized, quote_asset.to_uppercase()),
        ));
    }

    Ok(normalized)
}

/// 验证数量为正实数
pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(invalid(
            "quantity",
            format!("{} 不是合法数量，必须为正数", quantity),
        ));
    }
    Ok(())
}

/// 验证价格为正实数
pub fn validate_price(field: &str, price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(invalid(
            field,
            format!("{} 不是合法价格，必须为正数", price),
        ));
    }
    Ok(())
}

/// OCO 参数验证: 价格次序 + 最小名义价值
///
/// 名义价值按两个价格中较差（较低）的一个计算；
/// 不足时错误信息附带建议的最小数量 minNotional/price。
pub fn validate_oco_params(
    config: &Config,
    symbol: &str,
    position_side: PositionSide,
    quantity: f64,
    take_profit_price: f64,
    stop_loss_price: f64,
) -> Result<String> {
    let symbol = validate_symbol(symbol, &config.quote_asset)?;
    validate_quantity(quantity)?;
    validate_price("take_profit_price", take_profit_price)?;
    validate_price("stop_loss_price", stop_loss_price)?;

    match position_side {
        PositionSide::Long => {
            if take_profit_price <= stop_loss_price {
                return Err(invalid(
                    "take_profit_price",
                    format!(
                        "LONG 平仓要求止盈价 {} 高于止损价 {}",
                        take_profit_price, stop_loss_price
                    ),
                ));
            }
        }
        PositionSide::Short => {
            if take_profit_price >= stop_loss_price {
                return Err(invalid(
                    "take_profit_price",
                    format!(
                        "SHORT 平仓要求止盈价 {} 低于止损价 {}",
                        take_profit_price, stop_loss_price
                    ),
                ));
            }
        }
    }

    // 用较低的价格做最坏情况检查
    let check_price = take_profit_price.min(stop_loss_price);
    let notional = quantity * check_price;
    if notional < config.min_notional {
        return Err(invalid(
            "quantity",
            format!(
                "名义价值 {:.2} {} 低于最小要求 {:.2}，数量至少需要 {:.4}",
                notional,
                config.quote_asset,
                config.min_notional,
                config.min_notional / check_price
            ),
        ));
    }

    Ok(symbol)
}

/// 网格参数验证: 区间次序、层数范围 [2, 50]、每层数量为正
pub fn validate_grid_params(
    config: &Config,
    symbol: &str,
    lower_price: f64,
    upper_price: f64,
    num_grids: usize,
    quantity_per_grid: f64,
) -> Result<String> {
    let symbol = validate_symbol(symbol, &config.quote_asset)?;
    validate_price("lower_price", lower_price)?;
    validate_price("upper_price", upper_price)?;

    if lower_price >= upper_price {
        return Err(invalid(
            "lower_price",
            format!("下边界 {} 必须小于上边界 {}", lower_price, upper_price),
        ));
    }
    if num_grids < 2 {
        return Err(invalid(
            "num_grids",
            format!("网格层数 {} 太少，至少为 2", num_grids),
        ));
    }
    if num_grids > 50 {
        return Err(invalid(
            "num_grids",
            format!("网格层数 {} 太多，最多为 50", num_grids),
        ));
    }
    validate_quantity(quantity_per_grid)
        .map_err(|_| invalid("quantity_per_grid", format!("{} 必须为正数", quantity_per_grid)))?;

    Ok(symbol)
}

/// TWAP 参数验证: 切片数 [1, 100]、间隔 ≥ 1 秒、扰动幅度 [0, 100]、单片数量为正
pub fn validate_twap_params(
    config: &Config,
    symbol: &str,
    total_quantity: f64,
    num_slices: usize,
    interval_secs: u64,
    randomize_pct: f64,
) -> Result<String> {
    let symbol = validate_symbol(symbol, &config.quote_asset)?;
    validate_quantity(total_quantity)
        .map_err(|_| invalid("total_quantity", format!("{} 必须为正数", total_quantity)))?;

    if num_slices == 0 {
        return Err(invalid("num_slices", "切片数必须为正".to_string()));
    }
    if num_slices > 100 {
        return Err(invalid(
            "num_slices",
            format!("切片数 {} 太多，最多为 100", num_slices),
        ));
    }
    if interval_secs < 1 {
        return Err(invalid(
            "interval_secs",
            format!("切片间隔 {} 秒太短，至少为 1 秒", interval_secs),
        ));
    }
    // 负的扰动幅度会颠倒随机区间的上下界，导致末片数量为负
    if !randomize_pct.is_finite() || !(0.0..=100.0).contains(&randomize_pct) {
        return Err(invalid(
            "randomize_pct",
            format!("扰动幅度 {} 非法，必须在 [0, 100] 之间", randomize_pct),
        ));
    }
    if total_quantity / num_slices as f64 <= 0.0 {
        return Err(invalid(
            "total_quantity",
            "单片数量太小，无法执行".to_string(),
        ));
    }

    Ok(symbol)
}
