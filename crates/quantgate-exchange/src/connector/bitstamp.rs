//! Bitstamp 거래소 어댑터.
//!
//! Bitstamp REST API v2 구현. 서명은 카운터 nonce, 클라이언트 ID, API 키를
//! 연접한 문자열의 HMAC-SHA256을 대문자 hex로 인코딩해 `signature` 본문
//! 파라미터로 배치합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use quantgate_core::config::AdapterConfig;
use quantgate_core::domain::{
    BalanceInfo, MarketOrder, MarketOrderBook, OpenOrder, OrderSide, Ticker,
};
use quantgate_core::types::{FeeRate, Price, Quantity};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{ExchangeError, ExchangeResult};
use crate::signer::{CanonicalForm, NonceSource, RequestSigner};
use crate::traits::{self, ExchangeAdapter};
use crate::transport::{HttpResponse, RetryingTransport, TransportRequest};

const DEFAULT_BASE_URL: &str = "https://www.bitstamp.net";

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct BitstampTicker {
    last: String,
    high: String,
    low: String,
    vwap: String,
    volume: String,
    bid: String,
    ask: String,
    open: String,
    /// epoch 초 (문자열)
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct BitstampOrderBook {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct BitstampOrderAck {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct BitstampOpenOrder {
    id: Value,
    datetime: String,
    /// "0" = 매수, "1" = 매도
    #[serde(rename = "type")]
    order_type: String,
    price: String,
    amount: String,
    #[serde(default)]
    amount_at_create: Option<String>,
}

// ============================================================================
// Bitstamp 어댑터
// ============================================================================

/// Bitstamp 거래소 어댑터.
pub struct BitstampAdapter {
    config: AdapterConfig,
    base_url: String,
    transport: Option<RetryingTransport>,
    signer: Option<RequestSigner>,
    buy_fee: FeeRate,
    sell_fee: FeeRate,
}

impl BitstampAdapter {
    /// 새 Bitstamp 어댑터를 생성합니다. 검증은 `init`에서 수행됩니다.
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

    /// 마켓 ID를 Bitstamp 통화쌍 형식으로 변환합니다.
    fn to_pair(market_id: &str) -> String {
        market_id.replace('/', "").to_lowercase()
    }

    fn parse_decimal(field: &str, s: &str) -> ExchangeResult<Decimal> {
        s.parse()
            .map_err(|_| ExchangeError::Parse(format!("Invalid decimal in {}: {}", field, s)))
    }

    /// 주문 ID를 문자열로 정규화합니다. Bitstamp은 엔드포인트에 따라
    /// 숫자 또는 문자열로 반환합니다.
    fn id_to_string(id: &Value) -> ExchangeResult<String> {
        match id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(ExchangeError::Parse(format!("Invalid order id: {}", other))),
        }
    }

    fn transport(&self) -> ExchangeResult<&RetryingTransport> {
        self.transport
            .as_ref()
            .ok_or_else(|| ExchangeError::Config("Adapter is not initialized".to_string()))
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> ExchangeResult<T> {
        debug!("GET {}", endpoint);

        let response = self
            .transport()?
            .send(TransportRequest::get(format!("{}{}", self.base_url, endpoint)))
            .await?;
        Self::handle_response(response)
    }

    /// 서명된 POST 요청 (인증 필요).
    ///
    /// `key`, `nonce`, `signature` 파라미터가 폼 본문에 추가됩니다.
    async fn private_post<T: for<'de> Deserialize<'de>>(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let mut all_params: Vec<(String, String)> = vec![(
            "key".to_string(),
            self.config.authentication.api_key.clone(),
        )];
        all_params.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

        let signer = self
            .signer
            .as_mut()
            .ok_or_else(|| ExchangeError::Config("Adapter is not initialized".to_string()))?;
        let signed = signer.sign(&all_params)?;

        debug!("POST (signed) {}", endpoint);

        let response = self
            .transport()?
            .send(
                TransportRequest::post(format!("{}{}", self.base_url, endpoint))
                    .with_header("Content-Type", "application/x-www-form-urlencoded")
                    .with_body(signed.encoded_params),
            )
            .await?;
        Self::handle_response(response)
    }

    /// API 응답을 처리합니다.
    ///
    /// Bitstamp은 에러를 2xx 본문(`{"status": "error", ...}`)으로 반환하기도
    /// 하므로 상태 코드와 본문 모양을 함께 검사합니다.
    fn handle_response<T: for<'de> Deserialize<'de>>(
        response: HttpResponse,
    ) -> ExchangeResult<T> {
        let value: Value = serde_json::from_str(&response.body).map_err(|e| {
            error!("Failed to parse response: {} - Body: {}", e, response.body);
            ExchangeError::Parse(e.to_string())
        })?;

        if let Some(err) = Self::extract_error(&value) {
            return Err(err);
        }
        if !response.is_success() {
            return Err(ExchangeError::Api {
                code: response.status_code as i32,
                message: response.body,
            });
        }

        serde_json::from_value(value).map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    /// 본문에서 Bitstamp 에러를 추출합니다.
    fn extract_error(value: &Value) -> Option<ExchangeError> {
        let reason = if value.get("status").and_then(Value::as_str) == Some("error") {
            value.get("reason")?
        } else if let Some(error) = value.get("error") {
            error
        } else {
            return None;
        };

        let message = match reason {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(Self::map_error_message(&message))
    }

    /// Bitstamp 에러 메시지를 ExchangeError로 매핑합니다.
    fn map_error_message(message: &str) -> ExchangeError {
        if message.contains("Order not found") {
            ExchangeError::OrderNotFound(message.to_string())
        } else if message.contains("You have only") || message.contains("sufficient") {
            ExchangeError::InsufficientBalance(message.to_string())
        } else if message.contains("API key") || message.contains("signature") {
            ExchangeError::Unauthorized(message.to_string())
        } else if message.contains("Minimum order size") {
            ExchangeError::InvalidQuantity(message.to_string())
        } else {
            ExchangeError::Api {
                code: -1,
                message: message.to_string(),
            }
        }
    }

    fn to_open_order(market_id: &str, raw: &BitstampOpenOrder) -> ExchangeResult<OpenOrder> {
        let side = match raw.order_type.as_str() {
            "0" => OrderSide::Buy,
            "1" => OrderSide::Sell,
            other => {
                return Err(ExchangeError::Parse(format!(
                    "Unknown order type: {}",
                    other
                )))
            }
        };

        let creation_date = NaiveDateTime::parse_from_str(&raw.datetime, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| ExchangeError::Parse(format!("Invalid datetime {}: {}", raw.datetime, e)))?
            .and_utc();

        let price = Self::parse_decimal("price", &raw.price)?;
        let quantity = Self::parse_decimal("amount", &raw.amount)?;
        // amount_at_create 미제공 시 잔여 수량을 원수량으로 사용합니다.
        let original_quantity = match &raw.amount_at_create {
            Some(s) => Self::parse_decimal("amount_at_create", s)?,
            None => quantity,
        };

        Ok(OpenOrder {
            id: Self::id_to_string(&raw.id)?,
            creation_date,
            market_id: market_id.to_string(),
            side,
            price,
            quantity,
            original_quantity,
            total: price * original_quantity,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BitstampAdapter {
    fn impl_name(&self) -> &'static str {
        "bitstamp"
    }

    async fn init(&mut self) -> ExchangeResult<()> {
        // 재호출 시 설정을 재검증하고 전송/서명 상태를 새로 만듭니다.
        traits::validate_auth(&self.config.authentication)?;
        traits::validate_network(&self.config.network)?;
        self.buy_fee = traits::parse_fee("buy_fee", &self.config.other.buy_fee)?;
        self.sell_fee = traits::parse_fee("sell_fee", &self.config.other.sell_fee)?;

        let client_id = self
            .config
            .authentication
            .client_id
            .clone()
            .ok_or_else(|| {
                ExchangeError::Config("Bitstamp requires authentication.client_id".to_string())
            })?;

        // 카운터 시작값을 현재 시각으로 잡아 재시작 후에도 이전 인스턴스의
        // nonce보다 커지도록 합니다.
        let nonce_start = Utc::now().timestamp_millis() as u64;

        self.signer = Some(
            RequestSigner::new(
                &self.config.authentication.api_key,
                &self.config.authentication.api_secret,
            )
            .with_client_id(client_id)
            .with_nonce(NonceSource::Counter(nonce_start), "nonce")
            .with_canonical_form(CanonicalForm::IdentityConcat)
            .with_uppercase_hex(),
        );
        self.transport = Some(RetryingTransport::new(&self.config.network)?);

        info!(base_url = %self.base_url, "Bitstamp adapter initialized");
        Ok(())
    }

    async fn get_market_orders(&self, market_id: &str) -> ExchangeResult<MarketOrderBook> {
        let endpoint = format!("/api/v2/order_book/{}/", Self::to_pair(market_id));
        let book: BitstampOrderBook = self.public_get(&endpoint).await?;

        let mut buys = Vec::with_capacity(book.bids.len());
        for [price, quantity] in &book.bids {
            buys.push(MarketOrder::new(
                OrderSide::Buy,
                Self::parse_decimal("bid price", price)?,
                Self::parse_decimal("bid quantity", quantity)?,
            ));
        }
        let mut sells = Vec::with_capacity(book.asks.len());
        for [price, quantity] in &book.asks {
            sells.push(MarketOrder::new(
                OrderSide::Sell,
                Self::parse_decimal("ask price", price)?,
                Self::parse_decimal("ask quantity", quantity)?,
            ));
        }
        Ok(MarketOrderBook::new(market_id, buys, sells))
    }

    async fn get_latest_market_price(&self, market_id: &str) -> ExchangeResult<Price> {
        let ticker = self.get_ticker(market_id).await?;
        Ok(ticker.last)
    }

    async fn get_ticker(&self, market_id: &str) -> ExchangeResult<Ticker> {
        let endpoint = format!("/api/v2/ticker/{}/", Self::to_pair(market_id));
        let raw: BitstampTicker = self.public_get(&endpoint).await?;

        let timestamp_secs: i64 = raw.timestamp.parse().map_err(|_| {
            ExchangeError::Parse(format!("Invalid timestamp: {}", raw.timestamp))
        })?;

        Ok(Ticker {
            last: Self::parse_decimal("last", &raw.last)?,
            bid: Self::parse_decimal("bid", &raw.bid)?,
            ask: Self::parse_decimal("ask", &raw.ask)?,
            low: Self::parse_decimal("low", &raw.low)?,
            high: Self::parse_decimal("high", &raw.high)?,
            open: Self::parse_decimal("open", &raw.open)?,
            volume: Self::parse_decimal("volume", &raw.volume)?,
            vwap: Some(Self::parse_decimal("vwap", &raw.vwap)?),
            timestamp: timestamp_secs * 1000,
        })
    }

    async fn create_order(
        &mut self,
        market_id: &str,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> ExchangeResult<String> {
        let verb = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let endpoint = format!("/api/v2/{}/{}/", verb, Self::to_pair(market_id));
        let params = [
            ("amount", quantity.to_string()),
            ("price", price.to_string()),
        ];

        let ack: BitstampOrderAck = self.private_post(&endpoint, &params).await?;
        let order_id = Self::id_to_string(&ack.id)?;

        info!(order_id = %order_id, %side, %price, %quantity, "Order placed successfully");
        Ok(order_id)
    }

    async fn cancel_order(&mut self, order_id: &str, _market_id: &str) -> ExchangeResult<bool> {
        // Bitstamp 취소 엔드포인트는 주문 ID만 받습니다.
        let params = [("id", order_id.to_string())];
        let result: ExchangeResult<Value> =
            self.private_post("/api/v2/cancel_order/", &params).await;

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
        let endpoint = format!("/api/v2/open_orders/{}/", Self::to_pair(market_id));
        let raw: Vec<BitstampOpenOrder> = self.private_post(&endpoint, &[]).await?;

        raw.iter()
            .map(|order| Self::to_open_order(market_id, order))
            .collect()
    }

    async fn get_balance_info(&mut self) -> ExchangeResult<BalanceInfo> {
        let raw: HashMap<String, Value> = self.private_post("/api/v2/balance/", &[]).await?;

        let mut available = HashMap::new();
        let mut on_hold = HashMap::new();

        for (key, value) in &raw {
            let Value::String(s) = value else { continue };

            if let Some(currency) = key.strip_suffix("_available") {
                available.insert(currency.to_uppercase(), Self::parse_decimal(key, s)?);
            } else if let Some(currency) = key.strip_suffix("_reserved") {
                on_hold.insert(currency.to_uppercase(), Self::parse_decimal(key, s)?);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use quantgate_core::config::{AuthenticationConfig, NetworkConfig, OtherConfig};
    use rust_decimal_macros::dec;

    fn config_for(server_url: &str) -> AdapterConfig {
        AdapterConfig {
            authentication: AuthenticationConfig::new("test-key", "test-secret")
                .with_client_id("12345"),
            network: NetworkConfig {
                retry_delay_ms: 1,
                ..Default::default()
            }
            .with_rest_base_url(server_url),
            other: OtherConfig::new("0.005", "0.005"),
            try_mode: None,
        }
    }

    async fn initialized_adapter(server_url: &str) -> BitstampAdapter {
        let mut adapter = BitstampAdapter::new(config_for(server_url));
        adapter.init().await.expect("init failed");
        adapter
    }

    #[test]
    fn test_to_pair() {
        assert_eq!(BitstampAdapter::to_pair("BTC/USD"), "btcusd");
        assert_eq!(BitstampAdapter::to_pair("btcusd"), "btcusd");
    }

    #[test]
    fn test_map_error_message() {
        assert!(matches!(
            BitstampAdapter::map_error_message("Order not found"),
            ExchangeError::OrderNotFound(_)
        ));
        assert!(matches!(
            BitstampAdapter::map_error_message("You have only 0.10 USD available."),
            ExchangeError::InsufficientBalance(_)
        ));
        assert!(matches!(
            BitstampAdapter::map_error_message("API key not found"),
            ExchangeError::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn test_init_requires_client_id() {
        let mut config = config_for("http://localhost:1");
        config.authentication = AuthenticationConfig::new("key", "secret");

        let mut adapter = BitstampAdapter::new(config);
        assert!(matches!(
            adapter.init().await,
            Err(ExchangeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_get_ticker_converts_timestamp_to_millis() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/ticker/btcusd/")
            .with_status(200)
            .with_body(
                r#"{
                    "last": "18790.00", "high": "19000.00", "low": "18500.00",
                    "vwap": "18750.00", "volume": "1234.5",
                    "bid": "18783.00", "ask": "18783.33", "open": "18600.00",
                    "timestamp": "1667651377"
                }"#,
            )
            .create_async()
            .await;

        let adapter = initialized_adapter(&server.url()).await;
        let ticker = adapter.get_ticker("btcusd").await.unwrap();

        assert_eq!(ticker.last, dec!(18790.00));
        assert_eq!(ticker.timestamp, 1667651377000);
    }

    #[tokio::test]
    async fn test_create_order_returns_exchange_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/sell/btcusd/")
            .with_status(200)
            .with_body(r#"{"id": "1234", "datetime": "2022-11-05 12:00:00", "type": "1", "price": "20000", "amount": "0.5"}"#)
            .create_async()
            .await;

        let mut adapter = initialized_adapter(&server.url()).await;
        let id = adapter
            .create_order("btcusd", OrderSide::Sell, dec!(20000), dec!(0.5))
            .await
            .unwrap();

        assert_eq!(id, "1234");
    }

    #[tokio::test]
    async fn test_cancel_order_not_found_is_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/cancel_order/")
            .with_status(200)
            .with_body(r#"{"error": "Order not found"}"#)
            .create_async()
            .await;

        let mut adapter = initialized_adapter(&server.url()).await;
        assert!(!adapter.cancel_order("99", "btcusd").await.unwrap());
    }

    #[tokio::test]
    async fn test_error_status_body_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/buy/btcusd/")
            .with_status(200)
            .with_body(r#"{"status": "error", "reason": {"__all__": ["You have only 1.00 USD available."]}}"#)
            .create_async()
            .await;

        let mut adapter = initialized_adapter(&server.url()).await;
        let result = adapter
            .create_order("btcusd", OrderSide::Buy, dec!(20000), dec!(1))
            .await;

        assert!(matches!(
            result,
            Err(ExchangeError::InsufficientBalance(_))
        ));
    }

    #[tokio::test]
    async fn test_get_open_orders_maps_type_and_datetime() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/open_orders/btcusd/")
            .with_status(200)
            .with_body(
                r#"[{
                    "id": 42, "datetime": "2022-11-05 12:34:56", "type": "0",
                    "price": "18000", "amount": "0.3", "amount_at_create": "0.5"
                }]"#,
            )
            .create_async()
            .await;

        let mut adapter = initialized_adapter(&server.url()).await;
        let orders = adapter.get_open_orders("btcusd").await.unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "42");
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].quantity, dec!(0.3));
        assert_eq!(orders[0].original_quantity, dec!(0.5));
        assert_eq!(orders[0].creation_date.to_rfc3339(), "2022-11-05T12:34:56+00:00");
    }

    #[tokio::test]
    async fn test_get_balance_splits_available_and_reserved() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/balance/")
            .with_status(200)
            .with_body(
                r#"{
                    "btc_available": "0.5", "btc_reserved": "0.1",
                    "usd_available": "1000.00",
                    "fee": "0.5"
                }"#,
            )
            .create_async()
            .await;

        let mut adapter = initialized_adapter(&server.url()).await;
        let balance = adapter.get_balance_info().await.unwrap();

        assert_eq!(balance.available_for("BTC"), Some(dec!(0.5)));
        assert_eq!(balance.on_hold_for("BTC"), Some(dec!(0.1)));
        assert_eq!(balance.available_for("USD"), Some(dec!(1000.00)));
        // 거래소가 보고하지 않은 항목은 0이 아니라 없음으로 남습니다.
        assert_eq!(balance.on_hold_for("USD"), None);
    }
}
