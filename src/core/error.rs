use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("交易所拒绝: {code} - {message}")]
    ExchangeRejected { code: i64, message: String },

    #[error("参数验证错误: {field} - {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("数值超出交易所限制: {field} = {value}, 允许范围 [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("条件单会立即触发: {side} 的触发价 {price} 相对当前价 {current_price} 在错误一侧")]
    WouldTriggerImmediately {
        side: String,
        price: f64,
        current_price: f64,
    },

    #[error("策略部分失败: {failed}/{total} 个步骤失败")]
    PartialStrategyFailure { failed: usize, total: usize },

    #[error("补偿撤单失败: 原始错误 [{original}], 撤单错误 [{cancel_error}]")]
    CompensationFailed {
        original: Box<ExchangeError>,
        cancel_error: Box<ExchangeError>,
    },

    #[error("交易对未找到: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("订单未找到: ID {order_id} (交易对: {symbol})")]
    OrderNotFound { order_id: String, symbol: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::ExchangeRejected { code, .. } => {
                // HTTP 5xx 或 Binance 限频错误码可以稍后重试
                (*code >= 500 && *code < 600) || *code == -1003 || *code == -1015
            }
            _ => false,
        }
    }

    /// 获取用户友好的错误描述
    pub fn user_friendly_message(&self) -> String {
        match self {
            ExchangeError::NetworkError(_) => "网络连接问题，请检查网络状态".to_string(),
            ExchangeError::AuthError(_) => "API认证失败，请检查密钥配置".to_string(),
            ExchangeError::SymbolNotFound { symbol } => {
                format!("交易对{}不存在或未开放交易", symbol)
            }
            ExchangeError::OrderNotFound { order_id, .. } => {
                format!("订单{}不存在或已过期", order_id)
            }
            ExchangeError::InvalidParameter { field, reason } => {
                format!("参数{}不合法: {}", field, reason)
            }
            ExchangeError::OutOfRange { field, min, max, .. } => {
                format!("{}超出交易所允许范围[{}, {}]，请调整后重试", field, min, max)
            }
            ExchangeError::WouldTriggerImmediately { side, .. } => {
                format!("{}条件单放在了当前价的错误一侧，会被立即执行，请检查价格", side)
            }
            ExchangeError::PartialStrategyFailure { failed, total } => {
                format!("策略执行完成，但{}个步骤中有{}个失败，请查看执行摘要", total, failed)
            }
            ExchangeError::CompensationFailed { .. } => {
                "止损单下单失败且止盈单撤销也失败，请立即手动检查挂单！".to_string()
            }
            _ => self.to_string(),
        }
    }
}
