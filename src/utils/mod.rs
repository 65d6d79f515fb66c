// 工具模块 - 精度、验证、签名与订单ID
pub mod order_id;
pub mod precision;
pub mod signature;
pub mod validate;

pub use order_id::OrderIdGenerator;
pub use precision::{adjust_price, adjust_prices, adjust_quantity, round_step, MinQtyPolicy};
pub use signature::SignatureHelper;
