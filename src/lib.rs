pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

// 选择性导出，避免命名冲突
pub use crate::core::config::{ApiKeys, Config, GlobalConfig};
pub use crate::core::error::{ExchangeError, Result};
pub use crate::core::exchange::{BaseExchange, Exchange};
pub use crate::core::types::{
    OrderRequest, OrderResult, OrderSide, OrderType, PositionSide, StepOutcome, StrategySummary,
    SymbolRules, TimeInForce,
};
pub use crate::exchanges::BinanceExchange;
pub use crate::strategies::{
    BasicOrderExecutor, GridExecutor, GridParams, OcoExecutor, OcoParams, TwapExecutor, TwapParams,
};
