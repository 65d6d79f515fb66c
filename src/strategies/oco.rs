/// OCO 模拟执行器
///
/// 币安 USDT-M 合约没有原生 OCO，这里用一组止盈单 + 止损限价单模拟。
/// 两腿不是原子的: 止盈已挂出而止损失败时，撤销止盈做补偿回滚，
/// 避免留下无保护的单腿挂单。撤销只尝试一次，再失败就升级报错，
/// 由用户手动处理。
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::{OrderRequest, OrderResult, PositionSide};
use crate::core::Result;
use crate::utils::order_id::OrderIdGenerator;
use crate::utils::precision::{adjust_price, adjust_quantity, MinQtyPolicy};
use crate::utils::validate::validate_oco_params;

#[derive(Debug, Clone)]
pub struct OcoParams {
    pub symbol: String,
    pub position_side: PositionSide,
    pub quantity: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

/// OCO 两腿都成功挂出后的结果
#[derive(Debug, Clone)]
pub struct OcoOutcome {
    pub symbol: String,
    pub position_side: PositionSide,
    pub quantity: f64,
    pub take_profit: OrderResult,
    pub stop_loss: OrderResult,
    /// 下单时的市场价，行情获取失败时为 None
    pub current_price: Option<f64>,
}

pub struct OcoExecutor {
    exchange: Arc<dyn Exchange>,
    config: Config,
}

impl OcoExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, config: Config) -> Self {
        Self { exchange, config }
    }

    pub async fn execute(&self, params: &OcoParams) -> Result<OcoOutcome> {
        let symbol = validate_oco_params(
            &self.config,
            &params.symbol,
            params.position_side,
            params.quantity,
            params.take_profit_price,
            params.stop_loss_price,
        )?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;

        // 行情获取失败只告警，跳过与当前价的交叉检查，交给交易所兜底
        let current_price = match self.exchange.fetch_price(&symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                log::warn!("获取 {} 行情失败，跳过触发价交叉检查: {}", symbol, e);
                None
            }
        };

        if let Some(price) = current_price {
            self.check_trigger_prices(params, price)?;
        }

        let quantity = adjust_quantity(&rules, params.quantity, MinQtyPolicy::Reject)?;
        let take_profit_price = adjust_price(&rules, params.take_profit_price)?;
        let stop_loss_price = adjust_price(&rules, params.stop_loss_price)?;

        let closing_side = params.position_side.closing_side();
        let ids = OrderIdGenerator::new("OCO");

        log::info!(
            "OCO: {} {} 持仓 数量 {}，止盈 {} / 止损 {}，平仓方向 {}",
            symbol,
            params.position_side,
            quantity,
            take_profit_price,
            stop_loss_price,
            closing_side
        );

        // 先挂止盈腿
        let tp_request =
            OrderRequest::take_profit(&symbol, closing_side, quantity, take_profit_price)
                .with_client_order_id(ids.generate());
        let take_profit = self.exchange.submit_order(&tp_request).await?;
        log::info!("止盈单已挂出: orderId {}", take_profit.order_id);

        // 再挂止损腿，失败则回滚止盈
        let sl_request =
            OrderRequest::stop_limit(&symbol, closing_side, quantity, stop_loss_price, stop_loss_price)
                .with_reduce_only(true)
                .with_client_order_id(ids.generate());

        let stop_loss = match self.exchange.submit_order(&sl_request).await {
            Ok(result) => result,
            Err(original) => {
                log::error!(
                    "止损单失败，回滚撤销止盈单 {}: {}",
                    take_profit.order_id,
                    original
                );
                return Err(self
                    .compensate(&symbol, take_profit.order_id, original)
                    .await);
            }
        };
        log::info!("止损单已挂出: orderId {}", stop_loss.order_id);

        Ok(OcoOutcome {
            symbol,
            position_side: params.position_side,
            quantity,
            take_profit,
            stop_loss,
            current_price,
        })
    }

    /// 两个触发价必须在当前价的被动一侧，否则挂出即成交
    fn check_trigger_prices(&self, params: &OcoParams, current_price: f64) -> Result<()> {
        match params.position_side {
            PositionSide::Long => {
                if params.take_profit_price <= current_price {
                    return Err(ExchangeError::WouldTriggerImmediately {
                        side: "TAKE_PROFIT".to_string(),
                        price: params.take_profit_price,
                        current_price,
                    });
                }
                if params.stop_loss_price >= current_price {
                    return Err(ExchangeError::WouldTriggerImmediately {
                        side: "STOP_LOSS".to_string(),
                        price: params.stop_loss_price,
                        current_price,
                    });
                }
            }
            PositionSide::Short => {
                if params.take_profit_price >= current_price {
                    return Err(ExchangeError::WouldTriggerImmediately {
                        side: "TAKE_PROFIT".to_string(),
                        price: params.take_profit_price,
                        current_price,
                    });
                }
                if params.stop_loss_price <= current_price {
                    return Err(ExchangeError::WouldTriggerImmediately {
                        side: "STOP_LOSS".to_string(),
                        price: params.stop_loss_price,
                        current_price,
                    });
                }
            }
        }
        Ok(())
    }

    /// 补偿回滚: 撤销已挂出的止盈单，只尝试一次
    async fn compensate(
        &self,
        symbol: &str,
        take_profit_order_id: i64,
        original: ExchangeError,
    ) -> ExchangeError {
        match self.exchange.cancel_order(symbol, take_profit_order_id).await {
            Ok(_) => {
                log::info!("止盈单 {} 已撤销，持仓回到无保护前状态", take_profit_order_id);
                original
            }
            Err(cancel_error) => {
                log::error!(
                    "⚠️ 补偿撤单也失败，止盈单 {} 可能仍在挂单簿中: {}",
                    take_profit_order_id,
                    cancel_error
                );
                ExchangeError::CompensationFailed {
                    original: Box::new(original),
                    cancel_error: Box::new(cancel_error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderSide, SymbolRules};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubExchange {
        price: f64,
        /// 第 N 次提交失败（1 起始），0 表示不失败
        fail_on_submit: usize,
        cancel_fails: bool,
        submitted: Mutex<Vec<OrderRequest>>,
        cancel_calls: AtomicUsize,
    }

    impl StubExchange {
        fn new(price: f64) -> Self {
            Self {
                price,
                fail_on_submit: 0,
                cancel_fails: false,
                submitted: Mutex::new(Vec::new()),
                cancel_calls: AtomicUsize::new(0),
            }
        }
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
            Ok(self.price)
        }

        async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult> {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            if submitted.len() == self.fail_on_submit {
                return Err(ExchangeError::ExchangeRejected {
                    code: -2019,
                    message: "Margin is insufficient.".to_string(),
                });
            }
            Ok(OrderResult::filled(
                submitted.len() as i64,
                0.0,
                0.0,
            ))
        }

        async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderResult> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            if self.cancel_fails {
                return Err(ExchangeError::OrderNotFound {
                    order_id: order_id.to_string(),
                    symbol: symbol.to_string(),
                });
            }
            Ok(OrderResult::filled(order_id, 0.0, 0.0))
        }

        async fn cancel_all_orders(&self, _symbol: &str) -> Result<usize> {
            Ok(0)
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

    fn long_params() -> OcoParams {
        OcoParams {
            symbol: "BTCUSDT".to_string(),
            position_side: PositionSide::Long,
            quantity: 0.01,
            take_profit_price: 52000.0,
            stop_loss_price: 48000.0,
        }
    }

    #[tokio::test]
    async fn test_long_oco_places_two_sell_legs() {
        let stub = Arc::new(StubExchange::new(50000.0));
        let executor = OcoExecutor::new(stub.clone(), Config::default());

        let outcome = executor.execute(&long_params()).await.unwrap();
        assert_eq!(outcome.current_price, Some(50000.0));

        let submitted = stub.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 2);
        // LONG 持仓两腿都是 SELL 平仓
        assert!(submitted.iter().all(|r| r.side == OrderSide::Sell));
        assert_eq!(submitted[0].order_type.to_string(), "TAKE_PROFIT");
        assert_eq!(submitted[0].price, Some(52000.0));
        assert_eq!(submitted[1].order_type.to_string(), "STOP");
        assert_eq!(submitted[1].stop_price, Some(48000.0));
        assert!(submitted.iter().all(|r| r.reduce_only));
    }

    #[tokio::test]
    async fn test_trigger_cross_check_rejects_before_any_order() {
        let stub = Arc::new(StubExchange::new(50000.0));
        let executor = OcoExecutor::new(stub.clone(), Config::default());

        // LONG 止盈价低于当前价，挂出即成交
        let mut params = long_params();
        params.take_profit_price = 49000.0;
        params.stop_loss_price = 48000.0;
        let result = executor.execute(&params).await;

        match result {
            Err(ExchangeError::WouldTriggerImmediately { side, .. }) => {
                assert_eq!(side, "TAKE_PROFIT");
            }
            other => panic!("意外结果: {:?}", other),
        }
        assert!(stub.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_loss_failure_cancels_take_profit_once() {
        let mut stub = StubExchange::new(50000.0);
        stub.fail_on_submit = 2;
        let stub = Arc::new(stub);
        let executor = OcoExecutor::new(stub.clone(), Config::default());

        let result = executor.execute(&long_params()).await;
        match result {
            Err(ExchangeError::ExchangeRejected { code, .. }) => assert_eq!(code, -2019),
            other => panic!("意外结果: {:?}", other),
        }
        // 补偿撤单恰好一次，撤的是止盈腿
        assert_eq!(stub.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compensation_failure_escalates() {
        let mut stub = StubExchange::new(50000.0);
        stub.fail_on_submit = 2;
        stub.cancel_fails = true;
        let stub = Arc::new(stub);
        let executor = OcoExecutor::new(stub.clone(), Config::default());

        let result = executor.execute(&long_params()).await;
        match result {
            Err(ExchangeError::CompensationFailed { original, cancel_error }) => {
                assert!(matches!(
                    *original,
                    ExchangeError::ExchangeRejected { code: -2019, .. }
                ));
                assert!(matches!(*cancel_error, ExchangeError::OrderNotFound { .. }));
            }
            other => panic!("意外结果: {:?}", other),
        }
        assert_eq!(stub.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_oco_uses_buy_legs() {
        let stub = Arc::new(StubExchange::new(2000.0));
        let executor = OcoExecutor::new(stub.clone(), Config::default());

        let params = OcoParams {
            symbol: "ETHUSDT".to_string(),
            position_side: PositionSide::Short,
            quantity: 1.0,
            take_profit_price: 1900.0,
            stop_loss_price: 2100.0,
        };
        executor.execute(&params).await.unwrap();

        let submitted = stub.submitted.lock().unwrap();
        assert!(submitted.iter().all(|r| r.side == OrderSide::Buy));
    }
}
