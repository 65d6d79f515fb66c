// 核心模块 - 配置、错误、类型与网关边界
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::*;
pub use error::{ExchangeError, Result};
pub use exchange::{BaseExchange, Exchange};
pub use types::*;
