/// 静态网格挂单
///
/// 在 [lower, upper] 区间铺一组等距 GTC 限价单，一次性挂出后退出，
/// 不做持续盯盘或补单。低于当前价的层挂买单，高于当前价的层挂卖单，
/// 恰好等于当前价的层跳过。各层独立提交，失败不影响其余层。
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::exchange::Exchange;
use crate::core::types::{OrderRequest, OrderResult, OrderSide, StrategySummary, TimeInForce};
use crate::core::Result;
use crate::utils::order_id::OrderIdGenerator;
use crate::utils::precision::{adjust_prices, adjust_quantity, MinQtyPolicy};
use crate::utils::validate::validate_grid_params;

#[derive(Debug, Clone)]
pub struct GridParams {
    pub symbol: String,
    pub lower_price: f64,
    pub upper_price: f64,
    pub num_grids: usize,
    pub quantity_per_grid: f64,
    pub dry_run: bool,
}

/// 计算等距网格价位，首尾分别落在上下边界上
pub fn calculate_grid_levels(lower_price: f64, upper_price: f64, num_grids: usize) -> Vec<f64> {
    if num_grids < 2 {
        return vec![lower_price];
    }
    let spacing = (upper_price - lower_price) / (num_grids - 1) as f64;
    (0..num_grids)
        .map(|i| lower_price + spacing * i as f64)
        .collect()
}

pub struct GridExecutor {
    exchange: Arc<dyn Exchange>,
    config: Config,
}

impl GridExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, config: Config) -> Self {
        Self { exchange, config }
    }

    /// 铺设网格，返回各层的执行摘要
    pub async fn setup(&self, params: &GridParams) -> Result<StrategySummary> {
        let symbol = validate_grid_params(
            &self.config,
            &params.symbol,
            params.lower_price,
            params.upper_price,
            params.num_grids,
            params.quantity_per_grid,
        )?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;
        let quantity = adjust_quantity(&rules, params.quantity_per_grid, MinQtyPolicy::Reject)?;

        // 行情缺失时退化为下半买/上半卖
        let current_price = match self.exchange.fetch_price(&symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                log::warn!("获取 {} 行情失败，按层序分配买卖方向: {}", symbol, e);
                None
            }
        };

        let levels = calculate_grid_levels(params.lower_price, params.upper_price, params.num_grids);
        let levels = adjust_prices(&rules, &levels)?;

        let mut summary = StrategySummary::new("grid", &symbol);
        summary.start_price = current_price;

        log::info!(
            "网格开始: {} 区间 [{}, {}]，{} 层，每层数量 {}{}",
            symbol,
            params.lower_price,
            params.upper_price,
            levels.len(),
            quantity,
            if params.dry_run { "，dry-run" } else { "" }
        );

        let ids = OrderIdGenerator::new("GRID");

        for (i, &level) in levels.iter().enumerate() {
            let step = i + 1;
            let side = match current_price {
                Some(price) if level < price => OrderSide::Buy,
                Some(price) if level > price => OrderSide::Sell,
                Some(price) => {
                    log::info!("第 {} 层价位 {} 等于当前价 {}，跳过", step, level, price);
                    continue;
                }
                // 1..n/2 层买入，其余卖出
                None => {
                    if step <= levels.len() / 2 {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    }
                }
            };

            let result = if params.dry_run {
                log::info!(
                    "[dry-run] 第 {}/{} 层: {} {} 数量 {} @ {}",
                    step,
                    levels.len(),
                    symbol,
                    side,
                    quantity,
                    level
                );
                Ok(OrderResult::filled(0, 0.0, level))
            } else {
                let request = OrderRequest::limit(&symbol, side, quantity, level, TimeInForce::Gtc)
                    .with_client_order_id(ids.generate());
                self.exchange.submit_order(&request).await
            };

            match result {
                Ok(order) => {
                    log::info!(
                        "第 {}/{} 层已挂出: {} @ {} (orderId {})",
                        step,
                        levels.len(),
                        side,
                        level,
                        order.order_id
                    );
                    summary.record_placed(step, order);
                }
                Err(e) => {
                    log::error!("第 {}/{} 层挂单失败: {}", step, levels.len(), e);
                    summary.record_failed(step, &e);
                }
            }
        }

        summary.finish(current_price);
        log::info!(
            "网格完成: {} 层挂出，{} 层失败",
            summary.steps.len() - summary.failed_count(),
            summary.failed_count()
        );
        Ok(summary)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ExchangeError;
    use crate::core::types::SymbolRules;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    #[test]
    fn test_levels_evenly_spaced_inclusive() {
        let levels = calculate_grid_levels(48000.0, 52000.0, 5);
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0], 48000.0);
        assert_eq!(levels[4], 52000.0);
        for pair in levels.windows(2) {
            assert!((pair[1] - pair[0] - 1000.0).abs() < 1e-6);
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_levels_two_grids_are_bounds() {
        assert_eq!(calculate_grid_levels(100.0, 200.0, 2), vec![100.0, 200.0]);
    }

    struct StubExchange {
        price: Option<f64>,
        submitted: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl Exchange for StubExchange {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
            let mut rules = SymbolRules::unbounded(symbol);
            rules.tick_size = Some(0.1);
            rules.step_size = Some(0.001);
            rules.min_qty = Some(0.001);
            Ok(rules)
        }

        async fn fetch_price(&self, _symbol: &str) -> Result<f64> {
            self.price.ok_or(ExchangeError::Other("行情不可用".to_string()))
        }

        async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult> {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            Ok(OrderResult::filled(submitted.len() as i64, 0.0, 0.0))
        }

        async fn cancel_order(&self, _symbol: &str, order_id: i64) -> Result<OrderResult> {
            Ok(OrderResult::filled(order_id, 0.0, 0.0))
        }

        async fn cancel_all_orders(&self, _symbol: &str) -> Result<usize> {
            Ok(self.submitted.lock().unwrap().len())
        }

        async fn get_order(&self, _symbol: &str, order_id: i64) -> Result<OrderResult> {
            Ok(OrderResult::filled(order_id, 0.0, 0.0))
        }

        async fn server_time(&self) -> Result<DateTime<Utc>> {
            Ok(Utc::now())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn params() -> GridParams {
        GridParams {
            symbol: "BTCUSDT".to_string(),
            lower_price: 48000.0,
            upper_price: 52000.0,
            num_grids: 10,
            quantity_per_grid: 0.01,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_sides_split_around_current_price() {
        let stub = Arc::new(StubExchange {
            price: Some(50000.0),
            submitted: Mutex::new(Vec::new()),
        });
        let executor = GridExecutor::new(stub.clone(), Config::default());

        let summary = executor.setup(&params()).await.unwrap();
        assert_eq!(summary.failed_count(), 0);

        let submitted = stub.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 10);
        for request in submitted.iter() {
            let price = request.price.unwrap();
            if price < 50000.0 {
                assert_eq!(request.side, OrderSide::Buy, "价位 {}", price);
            } else {
                assert_eq!(request.side, OrderSide::Sell, "价位 {}", price);
            }
            assert_eq!(request.time_in_force, Some(TimeInForce::Gtc));
        }
    }

    #[tokio::test]
    async fn test_price_unknown_splits_by_index() {
        let stub = Arc::new(StubExchange {
            price: None,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = GridExecutor::new(stub.clone(), Config::default());

        executor.setup(&params()).await.unwrap();

        let submitted = stub.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 10);
        // 10 层: 前 5 层买入，后 5 层卖出
        for (i, request) in submitted.iter().enumerate() {
            if i < 5 {
                assert_eq!(request.side, OrderSide::Buy, "第 {} 层", i + 1);
            } else {
                assert_eq!(request.side, OrderSide::Sell, "第 {} 层", i + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_level_at_current_price_skipped() {
        let stub = Arc::new(StubExchange {
            price: Some(50000.0),
            submitted: Mutex::new(Vec::new()),
        });
        let executor = GridExecutor::new(stub.clone(), Config::default());

        // 5 层网格的中点恰好是 50000
        let summary = executor
            .setup(&GridParams {
                num_grids: 5,
                ..params()
            })
            .await
            .unwrap();

        assert_eq!(stub.submitted.lock().unwrap().len(), 4);
        assert_eq!(summary.steps.len(), 4);
    }
}
