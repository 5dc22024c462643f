//! 시장 데이터 타입.
//!
//! 이 모듈은 공개 API로 조회하는 스냅샷 타입을 정의합니다:
//! - `Ticker` - 시세 스냅샷
//! - `MarketOrderBook` - 호가창 스냅샷
//!
//! 두 타입 모두 요청 시점에 생성되는 불변 값입니다.

use crate::domain::order::{MarketOrder, OrderSide};
use crate::types::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 시세 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// 최근 체결가
    pub last: Price,
    /// 최우선 매수 호가
    pub bid: Price,
    /// 최우선 매도 호가
    pub ask: Price,
    /// 최저가
    pub low: Price,
    /// 최고가
    pub high: Price,
    /// 시가
    pub open: Price,
    /// 거래량
    pub volume: Decimal,
    /// 거래량 가중 평균 가격 (미제공 거래소 있음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<Decimal>,
    /// 타임스탬프 (epoch 밀리초)
    pub timestamp: i64,
}

impl Ticker {
    /// 매수/매도 스프레드를 반환합니다.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// 중간 가격을 반환합니다.
    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

/// 호가창 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrderBook {
    /// 마켓 ID
    pub market_id: String,
    /// 매수 호가 - 가격 내림차순 정렬
    pub buys: Vec<MarketOrder>,
    /// 매도 호가 - 가격 오름차순 정렬
    pub sells: Vec<MarketOrder>,
}

impl MarketOrderBook {
    /// 새 호가창 스냅샷을 생성합니다.
    ///
    /// 매수 호가는 가격 내림차순, 매도 호가는 오름차순으로 정렬됩니다.
    pub fn new(
        market_id: impl Into<String>,
        mut buys: Vec<MarketOrder>,
        mut sells: Vec<MarketOrder>,
    ) -> Self {
        buys.sort_by(|a, b| b.price.cmp(&a.price));
        sells.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            market_id: market_id.into(),
            buys,
            sells,
        }
    }

    /// 최우선 매수 호가를 반환합니다.
    pub fn best_buy(&self) -> Option<&MarketOrder> {
        self.buys.first()
    }

    /// 최우선 매도 호가를 반환합니다.
    pub fn best_sell(&self) -> Option<&MarketOrder> {
        self.sells.first()
    }

    /// 스프레드를 반환합니다.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_buy(), self.best_sell()) {
            (Some(buy), Some(sell)) => Some(sell.price - buy.price),
            _ => None,
        }
    }
}
