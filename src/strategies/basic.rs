/// 基础订单执行器: 市价 / 限价 / 止损限价
///
/// 所有验证与精度调整在发出下单请求之前完成，
/// 行情获取失败只降级告警，不阻断下单。
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::{OrderRequest, OrderResult, OrderSide, TimeInForce};
use crate::core::Result;
use crate::utils::order_id::OrderIdGenerator;
use crate::utils::precision::{adjust_price, adjust_quantity, MinQtyPolicy};
use crate::utils::validate::{validate_price, validate_quantity, validate_symbol};

pub struct BasicOrderExecutor {
    exchange: Arc<dyn Exchange>,
    config: Config,
}

impl BasicOrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, config: Config) -> Self {
        Self { exchange, config }
    }

    /// 市价单
    pub async fn execute_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        let symbol = validate_symbol(symbol, &self.config.quote_asset)?;
        validate_quantity(quantity)?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;
        let quantity = adjust_quantity(&rules, quantity, MinQtyPolicy::Reject)?;

        // 行情仅用于日志里的预估成交额，获取失败不阻断
        match self.exchange.fetch_price(&symbol).await {
            Ok(price) => log::info!(
                "市价单: {} {} 数量 {}，当前价 {}，预估成交额 {:.2} {}",
                symbol,
                side,
                quantity,
                price,
                quantity * price,
                self.config.quote_asset
            ),
            Err(e) => log::warn!("获取 {} 行情失败，跳过成交额预估: {}", symbol, e),
        }

        let ids = OrderIdGenerator::new("MKT");
        let request = OrderRequest::market(&symbol, side, quantity)
            .with_reduce_only(reduce_only)
            .with_client_order_id(ids.generate());

        self.exchange.submit_order(&request).await
    }

    /// 限价单
    ///
    /// post_only 时强制 GTX；限价偏离市场价超过告警阈值记录警告，
    /// 超过最大阈值直接拒绝。
    pub async fn execute_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
        post_only: bool,
    ) -> Result<OrderResult> {
        let symbol = validate_symbol(symbol, &self.config.quote_asset)?;
        validate_quantity(quantity)?;
        validate_price("price", price)?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;
        let quantity = adjust_quantity(&rules, quantity, MinQtyPolicy::Reject)?;
        let price = adjust_price(&rules, price)?;

        match self.exchange.fetch_price(&symbol).await {
            Ok(current_price) => {
                let deviation_pct = (price - current_price).abs() / current_price * 100.0;
                if deviation_pct > self.config.limit_price_max_pct {
                    return Err(ExchangeError::OutOfRange {
                        field: "price".to_string(),
                        value: price,
                        min: current_price * (1.0 - self.config.limit_price_max_pct / 100.0),
                        max: current_price * (1.0 + self.config.limit_price_max_pct / 100.0),
                    });
                }
                if deviation_pct > self.config.limit_price_warn_pct {
                    log::warn!(
                        "限价 {} 偏离当前价 {} 达 {:.2}%，请确认价格",
                        price,
                        current_price,
                        deviation_pct
                    );
                }
            }
            Err(e) => log::warn!("获取 {} 行情失败，跳过限价偏离检查: {}", symbol, e),
        }

        let notional = quantity * price;
        if notional < self.config.min_notional {
            return Err(ExchangeError::InvalidParameter {
                field: "quantity".to_string(),
                reason: format!(
                    "名义价值 {:.2} {} 低于最小要求 {:.2}，数量至少需要 {:.4}",
                    notional,
                    self.config.quote_asset,
                    self.config.min_notional,
                    self.config.min_notional / price
                ),
            });
        }

        let tif = if post_only { TimeInForce::Gtx } else { time_in_force };

        let ids = OrderIdGenerator::new("LMT");
        let request = OrderRequest::limit(&symbol, side, quantity, price, tif)
            .with_client_order_id(ids.generate());

        log::info!(
            "限价单: {} {} 数量 {} @ {} ({})",
            symbol,
            side,
            quantity,
            price,
            tif
        );
        self.exchange.submit_order(&request).await
    }

    /// 止损限价单: 触发价到达后按限价挂单
    pub async fn execute_stop_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        let symbol = validate_symbol(symbol, &self.config.quote_asset)?;
        validate_quantity(quantity)?;
        validate_price("stop_price", stop_price)?;
        validate_price("limit_price", limit_price)?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;
        let quantity = adjust_quantity(&rules, quantity, MinQtyPolicy::Reject)?;
        let stop_price = adjust_price(&rules, stop_price)?;
        let limit_price = adjust_price(&rules, limit_price)?;

        // 触发价在当前价的主动一侧会被立即触发，只告警不拒绝
        match self.exchange.fetch_price(&symbol).await {
            Ok(current_price) => match side {
                OrderSide::Buy if stop_price <= current_price => log::warn!(
                    "BUY 触发价 {} 不高于当前价 {}，条件单可能立即触发",
                    stop_price,
                    current_price
                ),
                OrderSide::Sell if stop_price >= current_price => log::warn!(
                    "SELL 触发价 {} 不低于当前价 {}，条件单可能立即触发",
                    stop_price,
                    current_price
                ),
                _ => {}
            },
            Err(e) => log::warn!("获取 {} 行情失败，跳过触发价检查: {}", symbol, e),
        }

        let notional = quantity * limit_price;
        if notional < self.config.min_notional {
            return Err(ExchangeError::InvalidParameter {
                field: "quantity".to_string(),
                reason: format!(
                    "名义价值 {:.2} {} 低于最小要求 {:.2}，数量至少需要 {:.4}",
                    notional,
                    self.config.quote_asset,
                    self.config.min_notional,
                    self.config.min_notional / limit_price
                ),
            });
        }

        let ids = OrderIdGenerator::new("STP");
        let request = OrderRequest::stop_limit(&symbol, side, quantity, stop_price, limit_price)
            .with_reduce_only(reduce_only)
            .with_client_order_id(ids.generate());

        log::info!(
            "止损限价单: {} {} 数量 {}，触发 {} -> 限价 {}",
            symbol,
            side,
            quantity,
            stop_price,
            limit_price
        );
        self.exchange.submit_order(&request).await
    }
}
