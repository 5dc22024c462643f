//! Binance 거래소 어댑터.
//!
//! Binance Spot REST API 구현. 서명은 타임스탬프 nonce를 쿼리 문자열에
//! 포함해 HMAC-SHA256으로 생성하고 `signature` 파라미터로 배치합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quantgate_core::config::AdapterConfig;
use quantgate_core::domain::{
    BalanceInfo, MarketOrder, MarketOrderBook, OpenOrder, OrderSide, Ticker,
};
use quantgate_core::types::{FeeRate, Price, Quantity};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{ExchangeError, ExchangeResult};
use crate::signer::RequestSigner;
use crate::traits::{self, ExchangeAdapter};
use crate::transport::{HttpResponse, RetryingTransport, TransportRequest};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24h {
    last_price: String,
    bid_price: String,
    ask_price: String,
    open_price: String,
    high_price: String,
    low_price: String,
    volume: String,
    weighted_avg_price: String,
    close_time: i64,
}

#[derive(Debug, Deserialize)]
struct BinancePrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceDepth {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrderAck {
    order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOpenOrder {
    symbol: String,
    order_id: i64,
    price: String,
    orig_qty: String,
    executed_qty: String,
    side: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceAccountBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceAccount {
    balances: Vec<BinanceAccountBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceApiError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 어댑터
// ============================================================================

/// Binance 거래소 어댑터.
pub struct BinanceAdapter {
    config: AdapterConfig,
    base_url: String,
    transport: Option<RetryingTransport>,
    signer: Option<RequestSigner>,
    buy_fee: FeeRate,
    sell_fee: FeeRate,
}

impl BinanceAdapter {
    /// 새 Binance 어댑터를 생성합니다. 검증은 `init`에서 수행됩니다.
    pub fn new(config: AdapterConfig) -> Self {
        let base_url = config
            .network
            .rest_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            config,
            base_url,
            transport: None,
            signer: None,
            buy_fee: Decimal::ZERO,
            sell_fee: Decimal::ZERO,
        }
    }

    /// 마켓 ID를 Binance 심볼 형식으로 변환합니다.
    fn to_symbol(market_id: &str) -> String {
        market_id.replace('/', "").to_uppercase()
    }

    /// 문자열에서 Decimal을 파싱합니다.
    fn parse_decimal(field: &str, s: &str) -> ExchangeResult<Decimal> {
        s.parse()
            .map_err(|_| ExchangeError::Parse(format!("Invalid decimal in {}: {}", field, s)))
    }

    fn transport(&self) -> ExchangeResult<&RetryingTransport> {
        self.transport
            .as_ref()
            .ok_or_else(|| ExchangeError::Config("Adapter is not initialized".to_string()))
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        debug!("GET {}", endpoint);

        let response = self.transport()?.send(TransportRequest::get(url)).await?;
        Self::handle_response(response)
    }

    /// 서명된 API 요청 (인증 필요).
    async fn signed_request<T: for<'de> Deserialize<'de>>(
        &mut self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let mut all_params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        all_params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));

        let signer = self
            .signer
            .as_mut()
            .ok_or_else(|| ExchangeError::Config("Adapter is not initialized".to_string()))?;
        let signed = signer.sign(&all_params)?;

        let api_key = self.config.authentication.api_key.clone();
        let request = if method == Method::POST {
            TransportRequest::post(format!("{}{}", self.base_url, endpoint))
                .with_header("Content-Type", "application/x-www-form-urlencoded")
                .with_body(signed.encoded_params)
        } else {
            let url = format!("{}{}?{}", self.base_url, endpoint, signed.encoded_params);
            TransportRequest {
                method: method.clone(),
                url,
                headers: Vec::new(),
                body: None,
            }
        };
        let request = request.with_header("X-MBX-APIKEY", api_key);

        debug!("{} (signed) {}", method, endpoint);

        let response = self.transport()?.send(request).await?;
        Self::handle_response(response)
    }

    /// API 응답을 처리합니다.
    ///
    /// 2xx는 `T`로 파싱하고, 에러 상태는 Binance 에러 본문을 해석해
    /// 분류된 에러로 변환합니다.
    fn handle_response<T: for<'de> Deserialize<'de>>(
        response: HttpResponse,
    ) -> ExchangeResult<T> {
        if response.is_success() {
            serde_json::from_str(&response.body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, response.body);
                ExchangeError::Parse(e.to_string())
            })
        } else if let Ok(api_error) = serde_json::from_str::<BinanceApiError>(&response.body) {
            Err(Self::map_error_code(api_error.code, &api_error.msg))
        } else {
            Err(ExchangeError::Api {
                code: response.status_code as i32,
                message: response.body,
            })
        }
    }

    /// Binance 에러 코드를 ExchangeError로 매핑합니다.
    fn map_error_code(code: i32, msg: &str) -> ExchangeError {
        match code {
            -1002 => ExchangeError::Unauthorized(msg.to_string()),
            -1003 => ExchangeError::RateLimited,
            -1013 => ExchangeError::InvalidQuantity(msg.to_string()),
            -1021 => ExchangeError::TimestampError(msg.to_string()),
            -2010 => ExchangeError::InsufficientBalance(msg.to_string()),
            -2011 | -2013 => ExchangeError::OrderNotFound(msg.to_string()),
            _ => ExchangeError::Api {
                code,
                message: msg.to_string(),
            },
        }
    }

    fn parse_side(s: &str) -> ExchangeResult<OrderSide> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(ExchangeError::Parse(format!("Unknown order side: {}", other))),
        }
    }

    fn to_open_order(raw: &BinanceOpenOrder) -> ExchangeResult<OpenOrder> {
        let price = Self::parse_decimal("price", &raw.price)?;
        let original_quantity = Self::parse_decimal("origQty", &raw.orig_qty)?;
        let executed = Self::parse_decimal("executedQty", &raw.executed_qty)?;
        let creation_date = DateTime::<Utc>::from_timestamp_millis(raw.time)
            .ok_or_else(|| ExchangeError::Parse(format!("Invalid order time: {}", raw.time)))?;

        Ok(OpenOrder {
            id: raw.order_id.to_string(),
            creation_date,
            market_id: raw.symbol.to_lowercase(),
            side: Self::parse_side(&raw.side)?,
            price,
            quantity: original_quantity - executed,
            original_quantity,
            total: price * original_quantity,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn impl_name(&self) -> &'static str {
        "binance"
    }

    async fn init(&mut self) -> ExchangeResult<()> {
        // 재호출 시 설정을 재검증하고 전송/서명 상태를 새로 만듭니다.
        traits::validate_auth(&self.config.authentication)?;
        traits::validate_network(&self.config.network)?;
        self.buy_fee = traits::parse_fee("buy_fee", &self.config.other.buy_fee)?;
        self.sell_fee = traits::parse_fee("sell_fee", &self.config.other.sell_fee)?;

        self.signer = Some(RequestSigner::new(
            &self.config.authentication.api_key,
            &self.config.authentication.api_secret,
        ));
        self.transport = Some(RetryingTransport::new(&self.config.network)?);

        info!(base_url = %self.base_url, "Binance adapter initialized");
        Ok(())
    }

    async fn get_market_orders(&self, market_id: &str) -> ExchangeResult<MarketOrderBook> {
        let symbol = Self::to_symbol(market_id);
        let depth: BinanceDepth = self
            .public_get("/api/v3/depth", &[("symbol", symbol), ("limit", "100".to_string())])
            .await?;

        let mut buys = Vec::with_capacity(depth.bids.len());
        for [price, quantity] in &depth.bids {
            buys.push(MarketOrder::new(
                OrderSide::Buy,
                Self::parse_decimal("bid price", price)?,
                Self::parse_decimal("bid quantity", quantity)?,
            ));
        }
        let mut sells = Vec::with_capacity(depth.asks.len());
        for [price, quantity] in &depth.asks {
            sells.push(MarketOrder::new(
                OrderSide::Sell,
                Self::parse_decimal("ask price", price)?,
                Self::parse_decimal("ask quantity", quantity)?,
            ));
        }
        Ok(MarketOrderBook::new(market_id, buys, sells))
    }

    async fn get_latest_market_price(&self, market_id: &str) -> ExchangeResult<Price> {
        let symbol = Self::to_symbol(market_id);
        let price: BinancePrice = self
            .public_get("/api/v3/ticker/price", &[("symbol", symbol)])
            .await?;

        Self::parse_decimal("price", &price.price)
    }

    async fn get_ticker(&self, market_id: &str) -> ExchangeResult<Ticker> {
        let symbol = Self::to_symbol(market_id);
        let raw: BinanceTicker24h = self
            .public_get("/api/v3/ticker/24hr", &[("symbol", symbol)])
            .await?;

        Ok(Ticker {
            last: Self::parse_decimal("lastPrice", &raw.last_price)?,
            bid: Self::parse_decimal("bidPrice", &raw.bid_price)?,
            ask: Self::parse_decimal("askPrice", &raw.ask_price)?,
            low: Self::parse_decimal("lowPrice", &raw.low_price)?,
            high: Self::parse_decimal("highPrice", &raw.high_price)?,
            open: Self::parse_decimal("openPrice", &raw.open_price)?,
            volume: Self::parse_decimal("volume", &raw.volume)?,
            vwap: Some(Self::parse_decimal(
                "weightedAvgPrice",
                &raw.weighted_avg_price,
            )?),
            timestamp: raw.close_time,
        })
    }

    async fn create_order(
        &mut self,
        market_id: &str,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> ExchangeResult<String> {
        let symbol = Self::to_symbol(market_id);
        let params = [
            ("symbol", symbol),
            ("side", side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.to_string()),
            ("price", price.to_string()),
        ];

        let ack: BinanceOrderAck = self
            .signed_request(Method::POST, "/api/v3/order", &params)
            .await?;

        let order_id = ack.order_id.to_string();
        info!(order_id = %order_id, %side, %price, %quantity, "Order placed successfully");
        Ok(order_id)
    }

    async fn cancel_order(&mut self, order_id: &str, market_id: &str) -> ExchangeResult<bool> {
        let params = [
            ("symbol", Self::to_symbol(market_id)),
            ("orderId", order_id.to_string()),
        ];

        let result: ExchangeResult<serde_json::Value> = self
            .signed_request(Method::DELETE, "/api/v3/order", &params)
            .await;

        match result {
            Ok(_) => {
                info!(order_id, "Order cancelled");
                Ok(true)
            }
            Err(ExchangeError::OrderNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get_open_orders(&mut self, market_id: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let params = [("symbol", Self::to_symbol(market_id))];
        let raw: Vec<BinanceOpenOrder> = self
            .signed_request(Method::GET, "/api/v3/openOrders", &params)
            .await?;

        raw.iter()
            .map(Self::to_open_order)
            .collect::<ExchangeResult<Vec<_>>>()
    }

    async fn get_balance_info(&mut self) -> ExchangeResult<BalanceInfo> {
        let account: BinanceAccount = self
            .signed_request(Method::GET, "/api/v3/account", &[])
            .await?;

        let mut available = HashMap::new();
        let mut on_hold = HashMap::new();

        for balance in &account.balances {
            let free = Self::parse_decimal("free", &balance.free)?;
            let locked = Self::parse_decimal("locked", &balance.locked)?;

            // 전부 0인 자산은 보고하지 않습니다. 항목 없음은 0과 구분됩니다.
            if free.is_zero() && locked.is_zero() {
                continue;
            }
            available.insert(balance.asset.clone(), free);
            on_hold.insert(balance.asset.clone(), locked);
        }

        Ok(BalanceInfo::new(available, on_hold))
    }

    fn buy_fee_percentage(&self, _market_id: &str) -> FeeRate {
        self.buy_fee
    }

    fn sell_fee_percentage(&self, _market_id: &str) -> FeeRate {
        self.sell_fee
    }
}
