/// 统一的类型定义模块
/// 整合了下单与策略执行相关的数据结构
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::ExchangeError;
use crate::core::Result;

// ============= 基础交易枚举 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(ExchangeError::InvalidParameter {
                field: "side".to_string(),
                reason: format!("{} 不是合法方向，必须是 BUY 或 SELL", other),
            }),
        }
    }
}

/// 持仓方向（OCO 用于推导平仓方向）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// 平掉该方向持仓所需的订单方向: LONG→SELL, SHORT→BUY
    pub fn closing_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for PositionSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(PositionSide::Long),
            "SHORT" => Ok(PositionSide::Short),
            other => Err(ExchangeError::InvalidParameter {
                field: "position_side".to_string(),
                reason: format!("{} 不是合法持仓方向，必须是 LONG 或 SHORT", other),
            }),
        }
    }
}

/// 订单类型（Display 输出币安合约的 wire 名称）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    /// 币安合约的止损限价单类型名为 STOP
    Stop,
    TakeProfit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

/// 时间有效性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Cancel
    Gtc,
    /// Immediate Or Cancel
    Ioc,
    /// Fill Or Kill
    Fok,
    /// Good Till Crossing (仅做maker)
    Gtx,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
            TimeInForce::Gtx => write!(f, "GTX"),
        }
    }
}

impl FromStr for TimeInForce {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            "FOK" => Ok(TimeInForce::Fok),
            "GTX" => Ok(TimeInForce::Gtx),
            other => Err(ExchangeError::InvalidParameter {
                field: "time_in_force".to_string(),
                reason: format!("{} 不是合法的有效期类型，必须是 GTC/IOC/FOK/GTX", other),
            }),
        }
    }
}

// ============= 交易规则 =============

/// 交易对规则（每次策略调用时从交易所获取，不跨调用缓存）
///
/// tick/step 为 None 表示交易所未提供该过滤器元数据，
/// 精度调整会降级为透传并记录警告。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRules {
    pub symbol: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub tick_size: Option<f64>,
    pub step_size: Option<f64>,
    pub min_qty: Option<f64>,
    pub max_qty: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SymbolRules {
    /// 无过滤器元数据的规则（降级路径与测试用）
    pub fn unbounded(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price_precision: 8,
            quantity_precision: 8,
            tick_size: None,
            step_size: None,
            min_qty: None,
            max_qty: None,
            min_price: None,
            max_price: None,
        }
    }
}

// ============= 订单请求与结果 =============

/// 订单请求值对象，构造后不再修改
///
/// 字段名与币安合约下单接口一一对应:
/// symbol/side/type/quantity/price/stopPrice/timeInForce/reduceOnly/workingType
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    /// 条件单触发价格类型，如 CONTRACT_PRICE
    pub working_type: Option<String>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 市价单
    pub fn market(symbol: &str, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            working_type: None,
            client_order_id: None,
        }
    }

    /// 限价单
    pub fn limit(symbol: &str, side: OrderSide, quantity: f64, price: f64, tif: TimeInForce) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: Some(tif),
            reduce_only: false,
            working_type: None,
            client_order_id: None,
        }
    }

    /// 止损限价单（触发后按限价挂单）
    pub fn stop_limit(
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Stop,
            quantity,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::Gtc),
            reduce_only: false,
            working_type: Some("CONTRACT_PRICE".to_string()),
            client_order_id: None,
        }
    }

    /// 止盈单（触发价与限价同值，OCO 使用）
    pub fn take_profit(symbol: &str, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::TakeProfit,
            quantity,
            price: Some(price),
            stop_price: Some(price),
            time_in_force: Some(TimeInForce::Gtc),
            reduce_only: true,
            working_type: Some("CONTRACT_PRICE".to_string()),
            client_order_id: None,
        }
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn with_client_order_id(mut self, id: String) -> Self {
        self.client_order_id = Some(id);
        self
    }
}

/// 订单结果，orderId 是补偿撤单的关联键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: i64,
    pub client_order_id: Option<String>,
    pub status: String,
    pub executed_qty: f64,
    pub avg_price: f64,
    /// 交易所返回的原始字段
    pub raw: serde_json::Value,
}

impl OrderResult {
    /// 构造一个已成交的结果（dry-run 合成成交与测试用）
    pub fn filled(order_id: i64, executed_qty: f64, avg_price: f64) -> Self {
        Self {
            order_id,
            client_order_id: None,
            status: "FILLED".to_string(),
            executed_qty,
            avg_price,
            raw: serde_json::Value::Null,
        }
    }
}

// ============= 策略执行摘要 =============

/// 单步执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepOutcome {
    Placed { step: usize, order: OrderResult },
    Failed { step: usize, error: String },
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// 策略执行摘要，随步骤逐条累积，策略结束后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub symbol: String,
    pub steps: Vec<StepOutcome>,
    pub total_executed: f64,
    /// Σ(executed_qty × avg_price)，用于计算成交量加权均价
    total_cost: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
}

impl StrategySummary {
    pub fn new(strategy: &str, symbol: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            symbol: symbol.to_string(),
            steps: Vec::new(),
            total_executed: 0.0,
            total_cost: 0.0,
            start_time: Utc::now(),
            end_time: None,
            start_price: None,
            end_price: None,
        }
    }

    /// 记录一步成功，并累积成交量与成交额
    pub fn record_placed(&mut self, step: usize, order: OrderResult) {
        self.total_executed += order.executed_qty;
        self.total_cost += order.executed_qty * order.avg_price;
        self.steps.push(StepOutcome::Placed { step, order });
    }

    /// 记录一步失败，不中断后续步骤
    pub fn record_failed(&mut self, step: usize, error: &ExchangeError) {
        self.steps.push(StepOutcome::Failed {
            step,
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self, end_price: Option<f64>) {
        self.end_time = Some(Utc::now());
        self.end_price = end_price;
    }

    /// 成交量加权均价，无成交时为 0
    pub fn vwap(&self) -> f64 {
        if self.total_executed > 0.0 {
            self.total_cost / self.total_executed
        } else {
            0.0
        }
    }

    /// 起止市场价的百分比变化
    pub fn price_change_pct(&self) -> Option<f64> {
        match (self.start_price, self.end_price) {
            (Some(start), Some(end)) if start > 0.0 => Some((end - start) / start * 100.0),
            _ => None,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    /// 部分失败转换为错误，供 CLI 决定退出码；摘要本身仍完整返回
    pub fn as_result(&self) -> Result<()> {
        let failed = self.failed_count();
        if failed > 0 {
            Err(ExchangeError::PartialStrategyFailure {
                failed,
                total: self.steps.len(),
            })
        } else {
            Ok(())
        }
    }
}
