/// TWAP 时间切片执行器
///
/// 把大单拆成若干市价切片按固定间隔执行，降低冲击成本。
/// 可选随机扰动切片数量以降低可预测性；单个切片失败记录后继续，
/// 收到停止信号时带着已执行部分的摘要提前返回。
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::core::config::Config;
use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::{OrderRequest, OrderResult, OrderSide, StrategySummary};
use crate::core::Result;
use crate::utils::order_id::OrderIdGenerator;
use crate::utils::precision::{adjust_quantity, MinQtyPolicy};
use crate::utils::validate::validate_twap_params;

#[derive(Debug, Clone)]
pub struct TwapParams {
    pub symbol: String,
    pub side: OrderSide,
    pub total_quantity: f64,
    pub num_slices: usize,
    pub interval_secs: u64,
    pub randomize: bool,
    /// 随机扰动幅度（百分比，默认 10.0）
    pub randomize_pct: f64,
    pub dry_run: bool,
}

/// 执行计划中的一个切片
#[derive(Debug, Clone, PartialEq)]
pub struct TwapSlice {
    /// 相对策略启动时刻的偏移
    pub offset: Duration,
    pub quantity: f64,
}

/// 计算各切片数量，总和精确等于 total
///
/// 随机模式下前 n-1 片在 [target×(1-pct), target×(1+pct)] 内均匀抽取，
/// 下界不低于保底数量，上界保证剩余量足够让后续每片拿到保底数量；
/// 最后一片吸收全部余量，消除累计误差。
pub fn calculate_slices(
    total_quantity: f64,
    num_slices: usize,
    randomize: bool,
    randomize_pct: f64,
    floor_qty: f64,
    rng: &mut impl Rng,
) -> Vec<f64> {
    if num_slices == 0 {
        return Vec::new();
    }
    if !randomize || num_slices == 1 {
        return vec![total_quantity / num_slices as f64; num_slices];
    }

    let target = total_quantity / num_slices as f64;
    let variation = target * randomize_pct / 100.0;
    let mut quantities = Vec::with_capacity(num_slices);
    let mut remaining = total_quantity;

    for i in 0..num_slices - 1 {
        let slices_left = (num_slices - 1 - i) as f64;
        let min = (target - variation).max(floor_qty);
        let mut max = (target + variation).min(remaining - slices_left * floor_qty);
        if max < min {
            max = min;
        }
        let quantity = rng.gen_range(min..=max);
        quantities.push(quantity);
        remaining -= quantity;
    }
    quantities.push(remaining);
    quantities
}

/// 把切片数量展开为带时间偏移的执行计划
pub fn build_schedule(quantities: &[f64], interval_secs: u64) -> Vec<TwapSlice> {
    quantities
        .iter()
        .enumerate()
        .map(|(i, &quantity)| TwapSlice {
            offset: Duration::from_secs(interval_secs * i as u64),
            quantity,
        })
        .collect()
}

pub struct TwapExecutor {
    exchange: Arc<dyn Exchange>,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl TwapExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, config: Config, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            exchange,
            config,
            shutdown,
        }
    }

    pub async fn execute(&self, params: &TwapParams) -> Result<StrategySummary> {
        let symbol = validate_twap_params(
            &self.config,
            &params.symbol,
            params.total_quantity,
            params.num_slices,
            params.interval_secs,
            params.randomize_pct,
        )?;

        let rules = self.exchange.fetch_symbol_rules(&symbol).await?;

        let start_price = match self.exchange.fetch_price(&symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                log::warn!("获取 {} 起始行情失败: {}", symbol, e);
                None
            }
        };

        let quantities = calculate_slices(
            params.total_quantity,
            params.num_slices,
            params.randomize,
            params.randomize_pct,
            self.config.twap_floor_qty,
            &mut rand::thread_rng(),
        );
        let schedule = build_schedule(&quantities, params.interval_secs);

        let mut summary = StrategySummary::new("twap", &symbol);
        summary.start_price = start_price;

        log::info!(
            "TWAP 开始: {} {} 总量 {}，{} 片 × {} 秒{}{}",
            symbol,
            params.side,
            params.total_quantity,
            params.num_slices,
            params.interval_secs,
            if params.randomize { "，随机切片" } else { "" },
            if params.dry_run { "，dry-run" } else { "" }
        );

        let ids = OrderIdGenerator::new("TWAP");
        let mut shutdown = self.shutdown.clone();

        for (i, slice) in schedule.iter().enumerate() {
            let step = i + 1;
            if *shutdown.borrow() {
                log::warn!("收到停止信号，TWAP 在第 {} 片前终止", step);
                break;
            }

            // 切片数量低于 minQty 时抬升而不是中止整个策略
            match adjust_quantity(&rules, slice.quantity, MinQtyPolicy::ClampToMin) {
                Ok(quantity) => {
                    let result = if params.dry_run {
                        // 合成成交价优先取实时行情，取不到再退回起始价；
                        // 两者都没有时记为失败，避免 0 价成交污染 VWAP
                        let fill_price = match self.exchange.fetch_price(&symbol).await {
                            Ok(price) => Some(price),
                            Err(_) => start_price,
                        };
                        match fill_price {
                            Some(price) => {
                                log::info!(
                                    "[dry-run] 切片 {}/{} (T+{}s): {} {} 数量 {} @ {}",
                                    step,
                                    schedule.len(),
                                    slice.offset.as_secs(),
                                    symbol,
                                    params.side,
                                    quantity,
                                    price
                                );
                                Ok(OrderResult::filled(0, quantity, price))
                            }
                            None => Err(ExchangeError::Other(
                                "行情不可用，无法合成 dry-run 成交".to_string(),
                            )),
                        }
                    } else {
                        let request = OrderRequest::market(&symbol, params.side, quantity)
                            .with_client_order_id(ids.generate());
                        self.exchange.submit_order(&request).await
                    };

                    match result {
                        Ok(order) => {
                            log::info!(
                                "切片 {}/{} 完成: 数量 {} @ {}",
                                step,
                                schedule.len(),
                                order.executed_qty,
                                order.avg_price
                            );
                            summary.record_placed(step, order);
                        }
                        Err(e) => {
                            log::error!("切片 {}/{} 失败: {}", step, schedule.len(), e);
                            if e.is_retryable() {
                                log::warn!("该失败可能是临时性的，剩余数量可稍后重新发起");
                            }
                            summary.record_failed(step, &e);
                        }
                    }
                }
                Err(e) => {
                    log::error!("切片 {}/{} 数量调整失败: {}", step, schedule.len(), e);
                    summary.record_failed(step, &e);
                }
            }

            // 最后一片之后不再等待
            if step < schedule.len() {
                tokio::select! {
                    _ = sleep(Duration::from_secs(params.interval_secs)) => {}
                    changed = shutdown.changed() => {
                        // 发送端被丢弃时 changed() 立即返回 Err，
                        // 若继续循环会让剩余切片连发、失去间隔，按停止处理
                        if changed.is_err() || *shutdown.borrow() {
                            log::warn!("收到停止信号，TWAP 在第 {} 片后终止", step);
                            break;
                        }
                    }
                }
            }
        }

        let end_price = match self.exchange.fetch_price(&symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                log::warn!("获取 {} 结束行情失败: {}", symbol, e);
                None
            }
        };
        summary.finish(end_price);

        log::info!(
            "TWAP 结束: 已执行 {:.6}，VWAP {:.2}，失败 {} 片",
            summary.total_executed,
            summary.vwap(),
            summary.failed_count()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_equal_slices_sum_to_total() {
        let mut rng = StdRng::seed_from_u64(7);
        let quantities = calculate_slices(1.0, 8, false, 10.0, 0.001, &mut rng);
        assert_eq!(quantities.len(), 8);
        assert!(quantities.iter().all(|&q| (q - 0.125).abs() < 1e-12));
        let total: f64 = quantities.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_randomized_slices_sum_exactly() {
        let mut rng = StdRng::seed_from_u64(42);
        let quantities = calculate_slices(0.5, 10, true, 10.0, 0.001, &mut rng);
        assert_eq!(quantities.len(), 10);
        let total: f64 = quantities.iter().sum();
        assert!((total - 0.5).abs() < 1e-9, "总和偏差: {}", total);
        assert!(quantities.iter().all(|&q| q > 0.0));

        let target = 0.05;
        for &q in &quantities[..9] {
            assert!(
                (q - target).abs() <= target * 0.10 + 1e-9,
                "切片 {} 超出扰动范围",
                q
            );
        }
    }

    #[test]
    fn test_high_variation_stays_feasible() {
        // 扰动幅度超过100%时下界被保底数量托住，上界保证余量充足
        let mut rng = StdRng::seed_from_u64(3);
        let quantities = calculate_slices(0.01, 3, true, 150.0, 0.001, &mut rng);
        let total: f64 = quantities.iter().sum();
        assert!((total - 0.01).abs() < 1e-9);
        assert!(quantities.iter().all(|&q| q >= 0.001 - 1e-12));
    }

    #[test]
    fn test_single_slice() {
        let mut rng = StdRng::seed_from_u64(1);
        let quantities = calculate_slices(0.3, 1, true, 10.0, 0.001, &mut rng);
        assert_eq!(quantities, vec![0.3]);
    }

    #[test]
    fn test_build_schedule_offsets() {
        let schedule = build_schedule(&[0.1, 0.1, 0.1], 60);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0].offset, Duration::from_secs(0));
        assert_eq!(schedule[1].offset, Duration::from_secs(60));
        assert_eq!(schedule[2].offset, Duration::from_secs(120));
    }

    use crate::core::types::SymbolRules;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

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
            rules.step_size = Some(0.001);
            rules.min_qty = Some(0.001);
            Ok(rules)
        }

        async fn fetch_price(&self, _symbol: &str) -> Result<f64> {
            self.price
                .ok_or(ExchangeError::Other("行情不可用".to_string()))
        }

        async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult> {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            Ok(OrderResult::filled(
                submitted.len() as i64,
                request.quantity,
                self.price.unwrap_or(0.0),
            ))
        }

        async fn cancel_order(&self, _symbol: &str, order_id: i64) -> Result<OrderResult> {
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

    fn dry_run_params(num_slices: usize) -> TwapParams {
        TwapParams {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            total_quantity: 0.3,
            num_slices,
            interval_secs: 60,
            randomize: false,
            randomize_pct: 10.0,
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_instead_of_bursting() {
        let stub = Arc::new(StubExchange {
            price: Some(50000.0),
            submitted: Mutex::new(Vec::new()),
        });
        let (tx, rx) = watch::channel(false);
        let executor = TwapExecutor::new(stub, Config::default(), rx);
        // 发送端消失后剩余切片不能失去间隔连发，应视同停止信号收尾
        drop(tx);

        let summary = executor.execute(&dry_run_params(3)).await.unwrap();
        assert_eq!(summary.steps.len(), 1);
        assert!((summary.total_executed - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_dry_run_without_price_records_failure_not_zero_fill() {
        let stub = Arc::new(StubExchange {
            price: None,
            submitted: Mutex::new(Vec::new()),
        });
        let (_tx, rx) = watch::channel(false);
        let executor = TwapExecutor::new(stub, Config::default(), rx);

        let summary = executor.execute(&dry_run_params(1)).await.unwrap();
        // 没有任何可用行情时不允许合成 0 价成交
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.total_executed, 0.0);
        assert_eq!(summary.vwap(), 0.0);
        assert!(summary.as_result().is_err());
    }

    #[tokio::test]
    async fn test_dry_run_fill_uses_market_price() {
        let stub = Arc::new(StubExchange {
            price: Some(50000.0),
            submitted: Mutex::new(Vec::new()),
        });
        let (_tx, rx) = watch::channel(false);
        let executor = TwapExecutor::new(stub.clone(), Config::default(), rx);

        let summary = executor.execute(&dry_run_params(1)).await.unwrap();
        assert_eq!(summary.failed_count(), 0);
        assert!((summary.vwap() - 50000.0).abs() < 1e-9);
        // dry-run 不发真实订单
        assert!(stub.submitted.lock().unwrap().is_empty());
    }
}
