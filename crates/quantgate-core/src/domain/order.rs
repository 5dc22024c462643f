//! 주문 타입.
//!
//! 이 모듈은 호가창 항목과 미체결 주문 타입을 정의합니다:
//! - `OrderSide` - 주문 방향 (매수/매도)
//! - `MarketOrder` - 호가창의 단일 호가
//! - `OpenOrder` - 거래소에 걸려 있는 미체결 주문

use crate::types::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl OrderSide {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// 호가창의 단일 호가.
///
/// `total`은 생성 시 `price * quantity`로 계산되며 이후 변하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    /// 주문 방향
    pub side: OrderSide,
    /// 가격
    pub price: Price,
    /// 수량
    pub quantity: Quantity,
    /// 총액 (price * quantity)
    pub total: Decimal,
}

impl MarketOrder {
    /// 새 호가를 생성합니다. 총액은 자동으로 계산됩니다.
    pub fn new(side: OrderSide, price: Price, quantity: Quantity) -> Self {
        Self {
            side,
            price,
            quantity,
            total: price * quantity,
        }
    }
}

/// 거래소에 걸려 있는 미체결 주문.
///
/// `quantity`는 잔여 수량이며 항상 `original_quantity` 이하입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// 거래소가 부여한 주문 ID
    pub id: String,
    /// 주문 생성 시각
    pub creation_date: DateTime<Utc>,
    /// 마켓 ID
    pub market_id: String,
    /// 주문 방향
    pub side: OrderSide,
    /// 지정가
    pub price: Price,
    /// 잔여 수량
    pub quantity: Quantity,
    /// 원래 수량
    pub original_quantity: Quantity,
    /// 총액 (price * original_quantity)
    pub total: Decimal,
}

impl OpenOrder {
    /// 체결된 수량을 반환합니다.
    pub fn filled_quantity(&self) -> Quantity {
        self.original_quantity - self.quantity
    }

    /// 부분 체결 여부를 확인합니다.
    pub fn is_partially_filled(&self) -> bool {
        self.quantity < self.original_quantity
    }
}
