// 策略执行器 - 单笔订单、OCO、TWAP、网格
pub mod basic;
pub mod grid;
pub mod oco;
pub mod twap;

pub use basic::BasicOrderExecutor;
pub use grid::{calculate_grid_levels, GridExecutor, GridParams};
pub use oco::{OcoExecutor, OcoOutcome, OcoParams};
pub use twap::{TwapExecutor, TwapParams, TwapSlice};
