//! 계좌 잔고 타입.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 계좌 잔고 정보.
///
/// 일부 거래소는 주문에 묶인 잔고를 보고하지 않습니다. 이 경우 해당 통화의
/// 항목 자체가 없으며, 항목 없음은 0과 다른 의미입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    /// 통화별 사용 가능한 잔고
    pub available: HashMap<String, Decimal>,
    /// 통화별 주문에 묶인 잔고
    pub on_hold: HashMap<String, Decimal>,
}

impl BalanceInfo {
    /// 새 잔고 정보를 생성합니다.
    pub fn new(available: HashMap<String, Decimal>, on_hold: HashMap<String, Decimal>) -> Self {
        Self { available, on_hold }
    }

    /// 통화의 사용 가능한 잔고를 반환합니다. 항목이 없으면 `None`.
    pub fn available_for(&self, currency: &str) -> Option<Decimal> {
        self.available.get(currency).copied()
    }

    /// 통화의 묶인 잔고를 반환합니다. 항목이 없으면 `None`.
    pub fn on_hold_for(&self, currency: &str) -> Option<Decimal> {
        self.on_hold.get(currency).copied()
    }
}
