//! Try-Mode 시뮬레이션 엔진.
//!
//! 실주문 없이 전략을 검증하기 위한 어댑터입니다. 공개 API 호출은 위임
//! 어댑터로 전달하고, 주문과 잔고는 로컬에서 시뮬레이션합니다.
//!
//! # 체결 규칙
//!
//! - 매수 지정가가 현재 매도 호가 이상이면 즉시 체결
//! - 매도 지정가가 현재 매수 호가 이하이면 즉시 체결
//! - 그 외에는 미체결로 대기하며, `get_open_orders` 조회 시점에 시세가
//!   지정가를 넘어섰으면 체결 처리
//! - 체결은 항상 지정가로 이루어지며, 수수료는 받는 통화에서 차감
//!
//! # 제약
//!
//! 미체결 주문은 동시에 하나만 허용됩니다. 미체결 주문이 있는 상태에서
//! `create_order`를 호출하면 치명적 에러입니다. 취소는 현재 미체결 주문의
//! ID와 일치할 때만 성공하며, 그 외에는 치명적 에러입니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use quantgate_core::config::AdapterConfig;
use quantgate_core::domain::{BalanceInfo, MarketOrderBook, OpenOrder, OrderSide, Ticker};
use quantgate_core::types::{DecimalExt, FeeRate, Price, Quantity};
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::{self, ExchangeAdapter};

/// Try-Mode 시뮬레이션 어댑터.
pub struct TryModeEngine {
    delegate: Box<dyn ExchangeAdapter>,
    config: AdapterConfig,
    buy_fee: FeeRate,
    sell_fee: FeeRate,
    base_currency: String,
    counter_currency: String,
    available: HashMap<String, Decimal>,
    open_order: Option<OpenOrder>,
    next_order_id: u64,
}

impl TryModeEngine {
    /// 새 Try-Mode 엔진을 생성합니다. 검증은 `init`에서 수행됩니다.
    ///
    /// `config.try_mode` 섹션이 있어야 하며, 공개 API 호출은 `delegate`로
    /// 전달됩니다.
    pub fn new(delegate: Box<dyn ExchangeAdapter>, config: AdapterConfig) -> Self {
        Self {
            delegate,
            config,
            buy_fee: Decimal::ZERO,
            sell_fee: Decimal::ZERO,
            base_currency: String::new(),
            counter_currency: String::new(),
            available: HashMap::new(),
            open_order: None,
            next_order_id: 1,
        }
    }

    fn balance_mut(&mut self, currency: &str) -> &mut Decimal {
        self.available
            .entry(currency.to_string())
            .or_insert(Decimal::ZERO)
    }

    fn debit(&mut self, currency: &str, amount: Decimal) -> ExchangeResult<()> {
        let balance = self.balance_mut(currency);
        if *balance < amount {
            return Err(ExchangeError::InsufficientBalance(format!(
                "{} available, {} required in {}",
                balance, amount, currency
            )));
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, currency: &str, amount: Decimal) {
        *self.balance_mut(currency) += amount;
    }

    /// 체결 대금을 받는 통화에 입금합니다. 수수료는 받는 쪽에서 차감됩니다.
    ///
    /// 지출 통화는 주문 시점(즉시 체결 또는 미체결 예치)에 이미 차감되어
    /// 있어야 합니다.
    fn credit_fill(&mut self, side: OrderSide, price: Price, quantity: Quantity) {
        // 입금액은 8자리 정밀도로 반올림합니다.
        match side {
            OrderSide::Buy => {
                let received = (quantity * (Decimal::ONE - self.buy_fee)).round_half_up(8);
                let currency = self.base_currency.clone();
                self.credit(&currency, received);
            }
            OrderSide::Sell => {
                let received =
                    (price * quantity * (Decimal::ONE - self.sell_fee)).round_half_up(8);
                let currency = self.counter_currency.clone();
                self.credit(&currency, received);
            }
        }
    }

    /// 주문이 현재 시세와 교차해 체결 가능한지 확인합니다.
    fn crosses(side: OrderSide, limit: Price, ticker: &Ticker) -> bool {
        match side {
            OrderSide::Buy => limit >= ticker.ask,
            OrderSide::Sell => limit <= ticker.bid,
        }
    }

    /// 주문에 묶이는 지출 통화와 금액을 반환합니다.
    fn committed_funds(&self, side: OrderSide, price: Price, quantity: Quantity) -> (String, Decimal) {
        match side {
            OrderSide::Buy => (self.counter_currency.clone(), price * quantity),
            OrderSide::Sell => (self.base_currency.clone(), quantity),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for TryModeEngine {
    fn impl_name(&self) -> &'static str {
        "try"
    }

    async fn init(&mut self) -> ExchangeResult<()> {
        // 재호출 시 잔고를 시작값으로 되돌리고 추적 중인 주문을 비웁니다.
        let try_config = self.config.try_mode.clone().ok_or_else(|| {
            ExchangeError::Config("try adapter requires a [try_mode] config section".to_string())
        })?;

        if try_config.base_currency.trim().is_empty()
            || try_config.counter_currency.trim().is_empty()
        {
            return Err(ExchangeError::Config(
                "try_mode currencies must not be empty".to_string(),
            ));
        }

        self.buy_fee = traits::parse_fee("buy_fee", &self.config.other.buy_fee)?;
        self.sell_fee = traits::parse_fee("sell_fee", &self.config.other.sell_fee)?;

        let base_balance: Decimal = try_config.base_starting_balance.parse().map_err(|_| {
            ExchangeError::Config(format!(
                "base_starting_balance is not a valid decimal: {}",
                try_config.base_starting_balance
            ))
        })?;
        let counter_balance: Decimal =
            try_config.counter_starting_balance.parse().map_err(|_| {
                ExchangeError::Config(format!(
                    "counter_starting_balance is not a valid decimal: {}",
                    try_config.counter_starting_balance
                ))
            })?;

        self.delegate.init().await?;

        self.base_currency = try_config.base_currency.clone();
        self.counter_currency = try_config.counter_currency.clone();
        self.available.clear();
        self.available
            .insert(try_config.base_currency, base_balance);
        self.available
            .insert(try_config.counter_currency, counter_balance);
        self.open_order = None;
        self.next_order_id = 1;

        info!(
            delegate = self.delegate.impl_name(),
            base = %self.base_currency,
            counter = %self.counter_currency,
            "Try-Mode engine initialized"
        );
        Ok(())
    }

    async fn get_market_orders(&self, market_id: &str) -> ExchangeResult<MarketOrderBook> {
        self.delegate.get_market_orders(market_id).await
    }

    async fn get_latest_market_price(&self, market_id: &str) -> ExchangeResult<Price> {
        self.delegate.get_latest_market_price(market_id).await
    }

    async fn get_ticker(&self, market_id: &str) -> ExchangeResult<Ticker> {
        self.delegate.get_ticker(market_id).await
    }

    async fn create_order(
        &mut self,
        market_id: &str,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> ExchangeResult<String> {
        if !price.is_strictly_positive() || !quantity.is_strictly_positive() {
            return Err(ExchangeError::InvalidQuantity(format!(
                "price and quantity must be positive: {} x {}",
                price, quantity
            )));
        }

        if let Some(open) = &self.open_order {
            return Err(ExchangeError::OrderRejected(format!(
                "An open order already exists: {}",
                open.id
            )));
        }

        let (spend_currency, committed) = self.committed_funds(side, price, quantity);
        self.debit(&spend_currency, committed)?;

        let order_id = format!("TRY-{:08}", self.next_order_id);
        self.next_order_id += 1;

        let ticker = self.delegate.get_ticker(market_id).await?;
        if Self::crosses(side, price, &ticker) {
            self.credit_fill(side, price, quantity);
            info!(order_id = %order_id, %side, %price, %quantity, "Order filled immediately");
        } else {
            self.open_order = Some(OpenOrder {
                id: order_id.clone(),
                creation_date: Utc::now(),
                market_id: market_id.to_string(),
                side,
                price,
                quantity,
                original_quantity: quantity,
                total: price * quantity,
            });
            info!(order_id = %order_id, %side, %price, %quantity, "Order resting");
        }

        Ok(order_id)
    }

    async fn cancel_order(&mut self, order_id: &str, _market_id: &str) -> ExchangeResult<bool> {
        match &self.open_order {
            Some(open) if open.id == order_id => {
                let (spend_currency, committed) =
                    self.committed_funds(open.side, open.price, open.quantity);
                self.credit(&spend_currency, committed);
                self.open_order = None;

                info!(order_id, "Order cancelled");
                Ok(true)
            }
            _ => Err(ExchangeError::OrderNotFound(format!(
                "No open order with id {}",
                order_id
            ))),
        }
    }

    async fn get_open_orders(&mut self, market_id: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let order = match &self.open_order {
            Some(order) if order.market_id == market_id => order.clone(),
            _ => return Ok(Vec::new()),
        };

        // 조회 시점의 시세가 지정가를 넘어섰으면 체결 처리합니다.
        let ticker = self.delegate.get_ticker(market_id).await?;
        if Self::crosses(order.side, order.price, &ticker) {
            self.credit_fill(order.side, order.price, order.quantity);
            self.open_order = None;

            info!(order_id = %order.id, "Resting order filled");
            return Ok(Vec::new());
        }

        Ok(vec![order])
    }

    async fn get_balance_info(&mut self) -> ExchangeResult<BalanceInfo> {
        let mut on_hold = HashMap::new();
        if let Some(open) = &self.open_order {
            let (currency, committed) = self.committed_funds(open.side, open.price, open.quantity);
            on_hold.insert(currency, committed);
        }

        Ok(BalanceInfo::new(self.available.clone(), on_hold))
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
    use quantgate_core::config::{AuthenticationConfig, OtherConfig, TryModeConfig};
    use quantgate_core::domain::MarketOrder;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    /// 시세를 외부에서 바꿀 수 있는 테스트용 위임 어댑터.
    struct StubAdapter {
        ticker: Arc<Mutex<Ticker>>,
    }

    #[async_trait]
    impl ExchangeAdapter for StubAdapter {
        fn impl_name(&self) -> &'static str {
            "stub"
        }

        async fn init(&mut self) -> ExchangeResult<()> {
            Ok(())
        }

        async fn get_market_orders(&self, market_id: &str) -> ExchangeResult<MarketOrderBook> {
            let ticker = self.current();
            Ok(MarketOrderBook::new(
                market_id,
                vec![MarketOrder::new(OrderSide::Buy, ticker.bid, dec!(1))],
                vec![MarketOrder::new(OrderSide::Sell, ticker.ask, dec!(1))],
            ))
        }

        async fn get_latest_market_price(&self, _market_id: &str) -> ExchangeResult<Price> {
            Ok(self.current().last)
        }

        async fn get_ticker(&self, _market_id: &str) -> ExchangeResult<Ticker> {
            Ok(self.current())
        }

        async fn create_order(
            &mut self,
            _market_id: &str,
            _side: OrderSide,
            _price: Price,
            _quantity: Quantity,
        ) -> ExchangeResult<String> {
            Err(ExchangeError::NotSupported("stub".to_string()))
        }

        async fn cancel_order(&mut self, _order_id: &str, _market_id: &str) -> ExchangeResult<bool> {
            Err(ExchangeError::NotSupported("stub".to_string()))
        }

        async fn get_open_orders(&mut self, _market_id: &str) -> ExchangeResult<Vec<OpenOrder>> {
            Err(ExchangeError::NotSupported("stub".to_string()))
        }

        async fn get_balance_info(&mut self) -> ExchangeResult<BalanceInfo> {
            Err(ExchangeError::NotSupported("stub".to_string()))
        }

        fn buy_fee_percentage(&self, _market_id: &str) -> FeeRate {
            Decimal::ZERO
        }

        fn sell_fee_percentage(&self, _market_id: &str) -> FeeRate {
            Decimal::ZERO
        }
    }

    impl StubAdapter {
        fn current(&self) -> Ticker {
            self.ticker.lock().expect("ticker lock poisoned").clone()
        }
    }

    fn ticker(bid: Decimal, ask: Decimal) -> Ticker {
        Ticker {
            last: (bid + ask) / dec!(2),
            bid,
            ask,
            low: bid,
            high: ask,
            open: bid,
            volume: dec!(100),
            vwap: None,
            timestamp: 1667651377000,
        }
    }

    fn engine_with_market(bid: Decimal, ask: Decimal) -> (TryModeEngine, Arc<Mutex<Ticker>>) {
        let shared = Arc::new(Mutex::new(ticker(bid, ask)));
        let stub = StubAdapter {
            ticker: shared.clone(),
        };

        let config = AdapterConfig {
            authentication: AuthenticationConfig::new("key", "secret"),
            network: Default::default(),
            other: OtherConfig::new("0.001", "0.002"),
            try_mode: Some(TryModeConfig {
                base_currency: "BTC".to_string(),
                base_starting_balance: "1".to_string(),
                counter_currency: "USD".to_string(),
                counter_starting_balance: "10000".to_string(),
                delegate: "stub".to_string(),
            }),
        };

        (TryModeEngine::new(Box::new(stub), config), shared)
    }

    async fn initialized_engine(bid: Decimal, ask: Decimal) -> (TryModeEngine, Arc<Mutex<Ticker>>) {
        let (mut engine, shared) = engine_with_market(bid, ask);
        engine.init().await.expect("init failed");
        (engine, shared)
    }

    #[tokio::test]
    async fn test_init_sets_starting_balances() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("BTC"), Some(dec!(1)));
        assert_eq!(balance.available_for("USD"), Some(dec!(10000)));
        assert_eq!(balance.on_hold_for("USD"), None);
    }

    #[tokio::test]
    async fn test_init_rejects_empty_currency() {
        let shared = Arc::new(Mutex::new(ticker(dec!(99), dec!(100))));
        let stub = StubAdapter { ticker: shared };

        let config = AdapterConfig {
            authentication: AuthenticationConfig::new("key", "secret"),
            network: Default::default(),
            other: OtherConfig::new("0.001", "0.002"),
            try_mode: Some(TryModeConfig {
                base_currency: "  ".to_string(),
                base_starting_balance: "1".to_string(),
                counter_currency: "USD".to_string(),
                counter_starting_balance: "10000".to_string(),
                delegate: "stub".to_string(),
            }),
        };

        let mut engine = TryModeEngine::new(Box::new(stub), config);
        assert!(matches!(
            engine.init().await,
            Err(ExchangeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_init_reapplies_starting_state() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        engine.init().await.unwrap();

        // 재초기화는 잔고를 시작값으로 되돌리고 주문 추적을 비웁니다.
        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("USD"), Some(dec!(10000)));
        assert_eq!(balance.on_hold_for("USD"), None);
        assert!(engine.get_open_orders("btcusd").await.unwrap().is_empty());

        let id = engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();
        assert_eq!(id, "TRY-00000001");
    }

    #[tokio::test]
    async fn test_buy_at_ask_fills_immediately() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let id = engine
            .create_order("btcusd", OrderSide::Buy, dec!(100), dec!(2))
            .await
            .unwrap();

        assert_eq!(id, "TRY-00000001");
        assert!(engine.get_open_orders("btcusd").await.unwrap().is_empty());

        let balance = engine.get_balance_info().await.unwrap();
        // 수수료 0.1%는 받는 통화(BTC)에서 차감됩니다.
        assert_eq!(balance.available_for("BTC"), Some(dec!(1) + dec!(2) * dec!(0.999)));
        assert_eq!(balance.available_for("USD"), Some(dec!(9800)));
    }

    #[tokio::test]
    async fn test_buy_above_ask_fills_at_limit_price() {
        let (mut engine, _) = initialized_engine(dec!(18783.00), dec!(18783.33)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(18800.14), dec!(0.03))
            .await
            .unwrap();

        // 체결은 매도 호가가 아니라 지정가로 이루어집니다.
        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(
            balance.available_for("USD"),
            Some(dec!(10000) - dec!(18800.14) * dec!(0.03))
        );
        assert_eq!(balance.available_for("BTC"), Some(dec!(1.02997)));
    }

    #[tokio::test]
    async fn test_sell_at_bid_fills_immediately() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Sell, dec!(99), dec!(0.5))
            .await
            .unwrap();

        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("BTC"), Some(dec!(0.5)));
        // 수수료 0.2%는 받는 통화(USD)에서 차감됩니다.
        assert_eq!(
            balance.available_for("USD"),
            Some(dec!(10000) + dec!(99) * dec!(0.5) * dec!(0.998))
        );
    }

    #[tokio::test]
    async fn test_buy_below_ask_rests_and_holds_funds() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let id = engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        let open = engine.get_open_orders("btcusd").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);

        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("USD"), Some(dec!(9910)));
        assert_eq!(balance.on_hold_for("USD"), Some(dec!(90)));
        assert_eq!(balance.on_hold_for("BTC"), None);
    }

    #[tokio::test]
    async fn test_resting_order_fills_when_market_crosses() {
        let (mut engine, shared) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        // 시세가 지정가 아래로 내려오면 다음 조회에서 체결됩니다.
        *shared.lock().unwrap() = ticker(dec!(84), dec!(85));

        assert!(engine.get_open_orders("btcusd").await.unwrap().is_empty());

        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("BTC"), Some(dec!(1) + dec!(0.999)));
        assert_eq!(balance.available_for("USD"), Some(dec!(9910)));
        assert_eq!(balance.on_hold_for("USD"), None);
    }

    #[tokio::test]
    async fn test_open_orders_for_other_market_is_empty() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        assert!(engine.get_open_orders("ethusd").await.unwrap().is_empty());
        // 다른 마켓 조회는 체결 검사를 하지 않습니다.
        assert_eq!(engine.get_open_orders("btcusd").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_order_is_rejected() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let zero_quantity = engine
            .create_order("btcusd", OrderSide::Buy, dec!(100), dec!(0))
            .await;
        assert!(matches!(
            zero_quantity,
            Err(ExchangeError::InvalidQuantity(_))
        ));

        let negative_price = engine
            .create_order("btcusd", OrderSide::Sell, dec!(-1), dec!(1))
            .await;
        assert!(matches!(
            negative_price,
            Err(ExchangeError::InvalidQuantity(_))
        ));

        // 거부된 주문은 잔고에 영향을 주지 않습니다.
        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("USD"), Some(dec!(10000)));
        assert_eq!(balance.available_for("BTC"), Some(dec!(1)));
    }

    #[tokio::test]
    async fn test_second_order_while_open_is_fatal() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        let result = engine
            .create_order("btcusd", OrderSide::Buy, dec!(91), dec!(1))
            .await;

        assert!(matches!(result, Err(ExchangeError::OrderRejected(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_fatal() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let result = engine
            .create_order("btcusd", OrderSide::Sell, dec!(99), dec!(5))
            .await;

        assert!(matches!(
            result,
            Err(ExchangeError::InsufficientBalance(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_matching_order_restores_funds() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let id = engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        assert!(engine.cancel_order(&id, "btcusd").await.unwrap());

        let balance = engine.get_balance_info().await.unwrap();
        assert_eq!(balance.available_for("USD"), Some(dec!(10000)));
        assert_eq!(balance.on_hold_for("USD"), None);
        assert!(engine.get_open_orders("btcusd").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_open_order_is_fatal() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        assert!(matches!(
            engine.cancel_order("TRY-00000001", "btcusd").await,
            Err(ExchangeError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_mismatched_id_is_fatal() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        engine
            .create_order("btcusd", OrderSide::Buy, dec!(90), dec!(1))
            .await
            .unwrap();

        assert!(matches!(
            engine.cancel_order("TRY-99999999", "btcusd").await,
            Err(ExchangeError::OrderNotFound(_))
        ));
        // 주문은 그대로 남아 있습니다.
        assert_eq!(engine.get_open_orders("btcusd").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_public_calls_are_delegated() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let price = engine.get_latest_market_price("btcusd").await.unwrap();
        assert_eq!(price, dec!(99.5));

        let book = engine.get_market_orders("btcusd").await.unwrap();
        assert_eq!(book.best_buy().map(|o| o.price), Some(dec!(99)));
        assert_eq!(book.best_sell().map(|o| o.price), Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_order_ids_are_sequential() {
        let (mut engine, _) = initialized_engine(dec!(99), dec!(100)).await;

        let first = engine
            .create_order("btcusd", OrderSide::Buy, dec!(100), dec!(0.1))
            .await
            .unwrap();
        let second = engine
            .create_order("btcusd", OrderSide::Buy, dec!(100), dec!(0.1))
            .await
            .unwrap();

        assert_eq!(first, "TRY-00000001");
        assert_eq!(second, "TRY-00000002");
    }
}
