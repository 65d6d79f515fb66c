use crate::core::error::ExchangeError;
use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::fs;

/// YAML 配置文件的顶层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSection {
    #[serde(default = "default_exchange_name")]
    pub name: String,
    #[serde(default)]
    pub testnet: bool,
}

/// 交易相关参数（验证阈值与策略常量）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSection {
    /// 计价货币，交易对必须以其结尾
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// 最小名义价值（计价货币单位）
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
    /// TWAP 随机切片的最小保底数量
    #[serde(default = "default_twap_floor_qty")]
    pub twap_floor_qty: f64,
    /// 限价偏离市场价超过该百分比时告警
    #[serde(default = "default_limit_price_warn_pct")]
    pub limit_price_warn_pct: f64,
    /// 限价偏离市场价超过该百分比时拒绝下单
    #[serde(default = "default_limit_price_max_pct")]
    pub limit_price_max_pct: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_exchange_name() -> String {
    "binance".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_min_notional() -> f64 {
    100.0
}

fn default_twap_floor_qty() -> f64 {
    0.001
}

fn default_limit_price_warn_pct() -> f64 {
    2.0
}

fn default_limit_price_max_pct() -> f64 {
    5.0
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            name: default_exchange_name(),
            testnet: false,
        }
    }
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            quote_asset: default_quote_asset(),
            min_notional: default_min_notional(),
            twap_floor_qty: default_twap_floor_qty(),
            limit_price_warn_pct: default_limit_price_warn_pct(),
            limit_price_max_pct: default_limit_price_max_pct(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeSection::default(),
            trading: TradingSection::default(),
            log_level: default_log_level(),
        }
    }
}

impl GlobalConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件 {} 失败: {}", path, e)))?;
        let config: GlobalConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

/// 解析后的运行时配置，构造时传入各组件，不使用进程级单例
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub testnet: bool,
    /// USDT-M 合约 API 地址
    pub futures_base_url: String,
    pub quote_asset: String,
    pub min_notional: f64,
    pub twap_floor_qty: f64,
    pub limit_price_warn_pct: f64,
    pub limit_price_max_pct: f64,
}

impl Config {
    pub fn from_global(global: &GlobalConfig, testnet_override: bool) -> Self {
        let testnet = global.exchange.testnet || testnet_override;
        let futures_base_url = if testnet {
            "https://testnet.binancefuture.com".to_string()
        } else {
            "https://fapi.binance.com".to_string()
        };

        Self {
            name: global.exchange.name.clone(),
            testnet,
            futures_base_url,
            quote_asset: global.trading.quote_asset.clone(),
            min_notional: global.trading.min_notional,
            twap_floor_qty: global.trading.twap_floor_qty,
            limit_price_warn_pct: global.trading.limit_price_warn_pct,
            limit_price_max_pct: global.trading.limit_price_max_pct,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::from_global(&GlobalConfig::default(), false)
    }
}

/// API密钥配置
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiKeys {
    /// 从环境变量加载API密钥
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let api_key = std::env::var("BINANCE_API_KEY")
            .or_else(|_| std::env::var("BINANCE_TESTNET_API_KEY"))
            .map_err(|_| {
                ExchangeError::ConfigError(
                    "未找到 BINANCE_API_KEY 或 BINANCE_TESTNET_API_KEY 环境变量".to_string(),
                )
            })?;

        // 尝试两种格式的密钥名称
        let api_secret = std::env::var("BINANCE_API_SECRET")
            .or_else(|_| std::env::var("BINANCE_SECRET_KEY"))
            .or_else(|_| std::env::var("BINANCE_TESTNET_SECRET_KEY"))
            .map_err(|_| {
                ExchangeError::ConfigError(
                    "未找到 BINANCE_API_SECRET 或 BINANCE_SECRET_KEY 环境变量".to_string(),
                )
            })?;

        Ok(ApiKeys {
            api_key,
            api_secret,
        })
    }

    /// 无密钥实例，dry-run 只访问公共行情接口时使用
    pub fn anonymous() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_urls() {
        let config = Config::from_global(&GlobalConfig::default(), false);
        assert_eq!(config.futures_base_url, "https://fapi.binance.com");
        assert_eq!(config.min_notional, 100.0);

        let testnet = Config::from_global(&GlobalConfig::default(), true);
        assert_eq!(
            testnet.futures_base_url,
            "https://testnet.binancefuture.com"
        );
    }

    #[test]
    fn test_yaml_with_defaults() {
        let yaml = "exchange:\n  testnet: true\n";
        let global: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(global.exchange.testnet);
        assert_eq!(global.trading.quote_asset, "USDT");
        assert_eq!(global.log_level, "info");
    }
}
