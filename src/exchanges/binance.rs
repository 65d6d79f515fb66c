/// 币安 USDT-M 合约网关实现
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::{
    config::{ApiKeys, Config},
    error::ExchangeError,
    exchange::{BaseExchange, Exchange},
    types::{OrderRequest, OrderResult, SymbolRules},
    Result,
};
use crate::utils::signature::SignatureHelper;

/// 币安返回的错误体
#[derive(Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

pub struct BinanceExchange {
    base: BaseExchange,
    /// 本地时间与服务器时间的毫秒偏移，签名时间戳用
    time_offset: Arc<Mutex<i64>>,
}

impl Clone for BinanceExchange {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            time_offset: self.time_offset.clone(),
        }
    }
}

impl BinanceExchange {
    /// 创建币安交易所实例
    pub fn new(config: Config, api_keys: ApiKeys) -> Self {
        let base = BaseExchange::new("binance".to_string(), config, api_keys);
        Self {
            base,
            time_offset: Arc::new(Mutex::new(0)),
        }
    }

    /// 同步服务器时间，计算本地时间与服务器时间的偏移
    pub async fn sync_server_time(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct ServerTime {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let time: ServerTime = self.send_public_request("/fapi/v1/time", None).await?;

        let local_time = Utc::now().timestamp_millis();
        let offset = time.server_time - local_time;
        *self.time_offset.lock().unwrap() = offset;

        log::info!("✅ 币安服务器时间同步完成，时间偏移: {}ms", offset);
        Ok(())
    }

    /// 获取校正后的毫秒时间戳
    fn corrected_timestamp(&self) -> u64 {
        let local_time = Utc::now().timestamp_millis();
        let offset = *self.time_offset.lock().unwrap();
        (local_time + offset) as u64
    }

    /// 非2xx响应映射到错误类型
    fn map_error_body(status: u16, body: &str) -> ExchangeError {
        match serde_json::from_str::<BinanceErrorBody>(body) {
            Ok(err) => match err.code {
                -2013 => ExchangeError::OrderNotFound {
                    order_id: String::new(),
                    symbol: String::new(),
                },
                -2014 | -2015 => ExchangeError::AuthError(err.msg),
                _ => ExchangeError::ExchangeRejected {
                    code: err.code,
                    message: err.msg,
                },
            },
            Err(_) => ExchangeError::ExchangeRejected {
                code: status as i64,
                message: body.to_string(),
            },
        }
    }

    /// 发送认证请求
    async fn send_signed_request<T>(
        &self,
        method: &str,
        endpoint: &str,
        mut params: HashMap<String, String>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        // 添加时间戳和recvWindow，使用校正后的时间戳
        params.insert("timestamp".to_string(), self.corrected_timestamp().to_string());
        params.insert("recvWindow".to_string(), "5000".to_string());

        // 按字母顺序排序参数以生成签名
        let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
        sorted_params.sort_by_key(|&(k, _)| k);

        let query_string: Vec<String> = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let query_string = query_string.join("&");

        let signature =
            SignatureHelper::binance_signature(&self.base.api_keys.api_secret, &query_string);
        let final_query = format!("{}&signature={}", query_string, signature);

        let url = format!(
            "{}{}?{}",
            self.base.config.futures_base_url, endpoint, final_query
        );

        let request = match method.to_uppercase().as_str() {
            "GET" => self.base.client.get(&url),
            "POST" => self.base.client.post(&url),
            "DELETE" => self.base.client.delete(&url),
            _ => return Err(ExchangeError::Other(format!("不支持的HTTP方法: {}", method))),
        };

        let response = request
            .header("X-MBX-APIKEY", &self.base.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::map_error_body(status, &body))
        }
    }

    /// 发送公共请求
    async fn send_public_request<T>(
        &self,
        endpoint: &str,
        params: Option<HashMap<String, String>>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut url = format!("{}{}", self.base.config.futures_base_url, endpoint);
        if let Some(params) = params {
            if !params.is_empty() {
                url = format!("{}?{}", url, SignatureHelper::build_query_string(&params));
            }
        }

        let response = self.base.client.get(&url).send().await?;

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::map_error_body(status, &body))
        }
    }

    /// 把 OrderRequest 展开为币安下单接口的参数表
    fn order_params(request: &OrderRequest) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), request.symbol.clone());
        params.insert("side".to_string(), request.side.to_string());
        params.insert("type".to_string(), request.order_type.to_string());
        params.insert("quantity".to_string(), request.quantity.to_string());

        if let Some(price) = request.price {
            params.insert("price".to_string(), price.to_string());
        }
        if let Some(stop_price) = request.stop_price {
            params.insert("stopPrice".to_string(), stop_price.to_string());
        }
        if let Some(tif) = request.time_in_force {
            params.insert("timeInForce".to_string(), tif.to_string());
        }
        if request.reduce_only {
            params.insert("reduceOnly".to_string(), "true".to_string());
        }
        if let Some(working_type) = &request.working_type {
            params.insert("workingType".to_string(), working_type.clone());
        }
        if let Some(client_order_id) = &request.client_order_id {
            params.insert("newClientOrderId".to_string(), client_order_id.clone());
        }

        params
    }

    /// 从原始响应解析订单结果，保留原始字段
    fn parse_order_result(raw: serde_json::Value) -> Result<OrderResult> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId", default)]
            client_order_id: Option<String>,
            status: String,
            #[serde(rename = "executedQty", default)]
            executed_qty: Option<String>,
            #[serde(rename = "avgPrice", default)]
            avg_price: Option<String>,
        }

        let wire: Wire = serde_json::from_value(raw.clone())?;
        Ok(OrderResult {
            order_id: wire.order_id,
            client_order_id: wire.client_order_id,
            status: wire.status,
            executed_qty: wire
                .executed_qty
                .and_then(|q| q.parse().ok())
                .unwrap_or(0.0),
            avg_price: wire.avg_price.and_then(|p| p.parse().ok()).unwrap_or(0.0),
            raw,
        })
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn name(&self) -> &str {
        &self.base.name
    }

    async fn fetch_symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        #[derive(Deserialize)]
        struct ExchangeInfo {
            symbols: Vec<SymbolInfo>,
        }

        #[derive(Deserialize)]
        struct SymbolInfo {
            symbol: String,
            #[serde(rename = "pricePrecision")]
            price_precision: u32,
            #[serde(rename = "quantityPrecision")]
            quantity_precision: u32,
            filters: Vec<serde_json::Value>,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        let info: ExchangeInfo = match self
            .send_public_request("/fapi/v1/exchangeInfo", Some(params))
            .await
        {
            Ok(info) => info,
            // -1121: Invalid symbol
            Err(ExchangeError::ExchangeRejected { code: -1121, .. }) => {
                return Err(ExchangeError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;

        let mut rules = SymbolRules {
            symbol: entry.symbol,
            price_precision: entry.price_precision,
            quantity_precision: entry.quantity_precision,
            tick_size: None,
            step_size: None,
            min_qty: None,
            max_qty: None,
            min_price: None,
            max_price: None,
        };

        let parse = |filter: &serde_json::Value, key: &str| -> Option<f64> {
            filter.get(key).and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
        };

        for filter in &entry.filters {
            match filter.get("filterType").and_then(|t| t.as_str()) {
                Some("LOT_SIZE") => {
                    rules.step_size = parse(filter, "stepSize");
                    rules.min_qty = parse(filter, "minQty");
                    rules.max_qty = parse(filter, "maxQty");
                }
                Some("PRICE_FILTER") => {
                    rules.tick_size = parse(filter, "tickSize");
                    rules.min_price = parse(filter, "minPrice");
                    rules.max_price = parse(filter, "maxPrice");
                }
                _ => {}
            }
        }

        Ok(rules)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct Ticker {
            price: String,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        let ticker: Ticker = self
            .send_public_request("/fapi/v1/ticker/price", Some(params))
            .await?;

        ticker
            .price
            .parse()
            .map_err(|_| ExchangeError::ParseError(format!("无法解析价格: {}", ticker.price)))
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let params = Self::order_params(request);
        log::debug!("提交订单: {:?}", params);

        let raw: serde_json::Value = self
            .send_signed_request("POST", "/fapi/v1/order", params)
            .await?;
        let result = Self::parse_order_result(raw)?;

        log::info!(
            "订单已提交: {} {} {} 数量 {} -> orderId {}",
            request.symbol,
            request.side,
            request.order_type,
            request.quantity,
            result.order_id
        );
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderResult> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("orderId".to_string(), order_id.to_string());

        let raw: serde_json::Value = self
            .send_signed_request("DELETE", "/fapi/v1/order", params)
            .await
            .map_err(|e| match e {
                ExchangeError::OrderNotFound { .. } => ExchangeError::OrderNotFound {
                    order_id: order_id.to_string(),
                    symbol: symbol.to_string(),
                },
                other => other,
            })?;

        log::info!("订单 {} 已撤销 ({})", order_id, symbol);
        Self::parse_order_result(raw)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<usize> {
        // 先查挂单数量，批量撤单接口本身只返回 code/msg
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        let open_orders: Vec<serde_json::Value> = self
            .send_signed_request("GET", "/fapi/v1/openOrders", params)
            .await?;
        let count = open_orders.len();

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        let _: serde_json::Value = self
            .send_signed_request("DELETE", "/fapi/v1/allOpenOrders", params)
            .await?;

        log::info!("已撤销 {} 的全部挂单，共 {} 笔", symbol, count);
        Ok(count)
    }

    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderResult> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("orderId".to_string(), order_id.to_string());

        let raw: serde_json::Value = self
            .send_signed_request("GET", "/fapi/v1/order", params)
            .await
            .map_err(|e| match e {
                ExchangeError::OrderNotFound { .. } => ExchangeError::OrderNotFound {
                    order_id: order_id.to_string(),
                    symbol: symbol.to_string(),
                },
                other => other,
            })?;
        Self::parse_order_result(raw)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct ServerTime {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let time: ServerTime = self.send_public_request("/fapi/v1/time", None).await?;
        Utc.timestamp_millis_opt(time.server_time)
            .single()
            .ok_or_else(|| ExchangeError::ParseError(format!("非法服务器时间: {}", time.server_time)))
    }

    async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.send_public_request("/fapi/v1/ping", None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderSide, TimeInForce};

    #[test]
    fn test_order_params_wire_names() {
        let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.01, 50000.0, TimeInForce::Gtc)
            .with_client_order_id("LMT01010000".to_string());
        let params = BinanceExchange::order_params(&request);

        assert_eq!(params.get("symbol").unwrap(), "BTCUSDT");
        assert_eq!(params.get("side").unwrap(), "BUY");
        assert_eq!(params.get("type").unwrap(), "LIMIT");
        assert_eq!(params.get("quantity").unwrap(), "0.01");
        assert_eq!(params.get("price").unwrap(), "50000");
        assert_eq!(params.get("timeInForce").unwrap(), "GTC");
        assert_eq!(params.get("newClientOrderId").unwrap(), "LMT01010000");
        assert!(!params.contains_key("reduceOnly"));
    }

    #[test]
    fn test_order_params_stop_limit() {
        let request =
            OrderRequest::stop_limit("BTCUSDT", OrderSide::Sell, 0.01, 48000.0, 47900.0)
                .with_reduce_only(true);
        let params = BinanceExchange::order_params(&request);

        assert_eq!(params.get("type").unwrap(), "STOP");
        assert_eq!(params.get("stopPrice").unwrap(), "48000");
        assert_eq!(params.get("price").unwrap(), "47900");
        assert_eq!(params.get("reduceOnly").unwrap(), "true");
        assert_eq!(params.get("workingType").unwrap(), "CONTRACT_PRICE");
    }

    #[test]
    fn test_parse_order_result() {
        let raw = serde_json::json!({
            "orderId": 12345,
            "clientOrderId": "TWAP01010000",
            "status": "FILLED",
            "executedQty": "0.010",
            "avgPrice": "50012.5"
        });
        let result = BinanceExchange::parse_order_result(raw).unwrap();
        assert_eq!(result.order_id, 12345);
        assert_eq!(result.status, "FILLED");
        assert!((result.executed_qty - 0.01).abs() < 1e-12);
        assert!((result.avg_price - 50012.5).abs() < 1e-9);
        assert_eq!(result.raw["orderId"], 12345);
    }

    #[test]
    fn test_map_error_body() {
        let err = BinanceExchange::map_error_body(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        match err {
            ExchangeError::ExchangeRejected { code, message } => {
                assert_eq!(code, -1121);
                assert_eq!(message, "Invalid symbol.");
            }
            other => panic!("意外错误: {:?}", other),
        }

        let err = BinanceExchange::map_error_body(502, "Bad Gateway");
        match err {
            ExchangeError::ExchangeRejected { code, .. } => assert_eq!(code, 502),
            other => panic!("意外错误: {:?}", other),
        }
    }
}
