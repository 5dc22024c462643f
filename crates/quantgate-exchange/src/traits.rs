//! 거래소 어댑터 계약.
//!
//! 모든 어댑터(실거래소, Try-Mode 시뮬레이션)가 구현하는 단일 트레이트를
//! 정의합니다. 변경 연산은 `&mut self`를 받아 호출자가 직렬화를 보장하도록
//! 컴파일 타임에 강제합니다.

use async_trait::async_trait;
use quantgate_core::config::{AuthenticationConfig, NetworkConfig};
use quantgate_core::domain::{BalanceInfo, MarketOrderBook, OpenOrder, OrderSide, Ticker};
use quantgate_core::types::{FeeRate, Price, Quantity};
use rust_decimal::Decimal;

use crate::error::{ExchangeError, ExchangeResult};

/// 거래소 어댑터 계약.
///
/// # 생명주기
///
/// 어댑터는 설정과 함께 생성된 뒤 `init`으로 검증/준비됩니다. `init`은
/// 멱등합니다. 다시 호출하면 설정을 재검증하고 상태를 처음부터 다시
/// 적용하며, 상태가 누적되지 않습니다.
///
/// # 동시성
///
/// 어댑터는 단일 호출자를 전제로 합니다. 변경 연산이 `&mut self`를 받으므로
/// 동시 호출은 컴파일되지 않습니다.
#[async_trait]
pub trait ExchangeAdapter: Send {
    /// 어댑터 구현 이름을 반환합니다 (예: "binance").
    fn impl_name(&self) -> &'static str;

    /// 설정을 검증하고 어댑터를 사용 가능한 상태로 만듭니다.
    ///
    /// 인증 정보, 타임아웃, 수수료율이 유효하지 않으면 에러를 반환합니다.
    async fn init(&mut self) -> ExchangeResult<()>;

    /// 호가창 스냅샷을 조회합니다.
    async fn get_market_orders(&self, market_id: &str) -> ExchangeResult<MarketOrderBook>;

    /// 최근 체결가를 조회합니다.
    async fn get_latest_market_price(&self, market_id: &str) -> ExchangeResult<Price>;

    /// 시세 스냅샷을 조회합니다.
    async fn get_ticker(&self, market_id: &str) -> ExchangeResult<Ticker>;

    /// 지정가 주문을 생성하고 거래소가 부여한 주문 ID를 반환합니다.
    async fn create_order(
        &mut self,
        market_id: &str,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> ExchangeResult<String>;

    /// 주문을 취소합니다.
    ///
    /// 주문이 취소되면 `true`, 거래소가 주문을 찾지 못하면 `false`를
    /// 반환합니다. 찾지 못함은 에러가 아니라 정상적인 업무 결과입니다
    /// (이미 체결되었거나 이미 취소된 경우).
    async fn cancel_order(&mut self, order_id: &str, market_id: &str) -> ExchangeResult<bool>;

    /// 미체결 주문 목록을 조회합니다.
    async fn get_open_orders(&mut self, market_id: &str) -> ExchangeResult<Vec<OpenOrder>>;

    /// 계좌 잔고를 조회합니다.
    async fn get_balance_info(&mut self) -> ExchangeResult<BalanceInfo>;

    /// 매수 수수료율을 반환합니다 (순수 함수, 네트워크 호출 없음).
    fn buy_fee_percentage(&self, market_id: &str) -> FeeRate;

    /// 매도 수수료율을 반환합니다 (순수 함수, 네트워크 호출 없음).
    fn sell_fee_percentage(&self, market_id: &str) -> FeeRate;
}

/// 인증 설정을 검증합니다.
pub(crate) fn validate_auth(auth: &AuthenticationConfig) -> ExchangeResult<()> {
    if auth.api_key.trim().is_empty() {
        return Err(ExchangeError::Config("api_key must not be empty".to_string()));
    }
    if auth.api_secret.trim().is_empty() {
        return Err(ExchangeError::Config(
            "api_secret must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// 네트워크 설정을 검증합니다.
pub(crate) fn validate_network(network: &NetworkConfig) -> ExchangeResult<()> {
    if network.connection_timeout_secs == 0 {
        return Err(ExchangeError::Config(
            "connection_timeout_secs must be positive".to_string(),
        ));
    }
    if network.max_attempts == 0 {
        return Err(ExchangeError::Config(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// 수수료 문자열을 파싱합니다. "0.001"은 0.1%를 의미합니다.
pub(crate) fn parse_fee(name: &str, raw: &str) -> ExchangeResult<FeeRate> {
    let fee: Decimal = raw
        .parse()
        .map_err(|_| ExchangeError::Config(format!("{} is not a valid decimal: {}", name, raw)))?;

    if fee < Decimal::ZERO || fee >= Decimal::ONE {
        return Err(ExchangeError::Config(format!(
            "{} must be in [0, 1): {}",
            name, raw
        )));
    }
    Ok(fee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_auth_rejects_empty_key() {
        let auth = AuthenticationConfig::new("", "secret");
        assert!(matches!(
            validate_auth(&auth),
            Err(ExchangeError::Config(_))
        ));
    }

    #[test]
    fn test_validate_auth_rejects_blank_secret() {
        let auth = AuthenticationConfig::new("key", "   ");
        assert!(validate_auth(&auth).is_err());
    }

    #[test]
    fn test_validate_auth_accepts_valid() {
        let auth = AuthenticationConfig::new("key", "secret");
        assert!(validate_auth(&auth).is_ok());
    }

    #[test]
    fn test_validate_network_rejects_zero_timeout() {
        let network = NetworkConfig {
            connection_timeout_secs: 0,
            ..Default::default()
        };
        assert!(validate_network(&network).is_err());
    }

    #[test]
    fn test_parse_fee() {
        assert_eq!(parse_fee("buy_fee", "0.001").unwrap(), dec!(0.001));
        assert_eq!(parse_fee("buy_fee", "0").unwrap(), Decimal::ZERO);
        assert!(parse_fee("buy_fee", "abc").is_err());
        assert!(parse_fee("buy_fee", "-0.1").is_err());
        assert!(parse_fee("buy_fee", "1").is_err());
    }
}
