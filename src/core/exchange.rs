use crate::core::{
    config::{ApiKeys, Config},
    types::{OrderRequest, OrderResult, SymbolRules},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 交易所网关trait，策略执行器只依赖此边界
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取交易对规则（tick/step/min/max），交易对不存在时返回 SymbolNotFound
    async fn fetch_symbol_rules(&self, symbol: &str) -> Result<SymbolRules>;

    /// 获取当前市场价
    async fn fetch_price(&self, symbol: &str) -> Result<f64>;

    /// 提交单笔订单
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    /// 撤销指定订单，返回被撤订单
    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderResult>;

    /// 撤销该交易对的全部挂单，返回撤单数量
    async fn cancel_all_orders(&self, symbol: &str) -> Result<usize>;

    /// 查询订单状态
    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderResult>;

    /// 获取服务器时间
    async fn server_time(&self) -> Result<DateTime<Utc>>;

    /// 测试连接
    async fn ping(&self) -> Result<()>;
}

/// 交易所实现的公共部分: 配置、密钥与HTTP客户端
#[derive(Clone)]
pub struct BaseExchange {
    pub name: String,
    pub config: Config,
    pub api_keys: ApiKeys,
    pub client: reqwest::Client,
}

impl BaseExchange {
    /// 创建新的交易所实例
    pub fn new(name: String, config: Config, api_keys: ApiKeys) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rustexec/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("创建HTTP客户端失败");

        Self {
            name,
            config,
            api_keys,
            client,
        }
    }
}
