//! 거래소 커넥터.
//!
//! 실거래소 어댑터 구현과 이름 기반 팩토리를 제공합니다.

pub mod binance;
pub mod bitstamp;

pub use binance::BinanceAdapter;
pub use bitstamp::BitstampAdapter;

use quantgate_core::config::AdapterConfig;

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::ExchangeAdapter;
use crate::try_mode::TryModeEngine;

/// 이름으로 어댑터를 생성합니다.
///
/// 지원하는 이름: `binance`, `bitstamp`, `try`.
///
/// `try`는 Try-Mode 시뮬레이션 어댑터를 생성합니다. 설정의 `try_mode`
/// 섹션이 필요하며, 공개 API 호출은 `try_mode.delegate`로 지정된 실거래소
/// 어댑터에 위임됩니다.
pub fn create_adapter(
    name: &str,
    config: AdapterConfig,
) -> ExchangeResult<Box<dyn ExchangeAdapter>> {
    match name.to_lowercase().as_str() {
        "binance" => Ok(Box::new(BinanceAdapter::new(config))),
        "bitstamp" => Ok(Box::new(BitstampAdapter::new(config))),
        "try" => {
            let try_config = config.try_mode.clone().ok_or_else(|| {
                ExchangeError::Config(
                    "try adapter requires a [try_mode] config section".to_string(),
                )
            })?;

            if try_config.delegate.to_lowercase() == "try" {
                return Err(ExchangeError::Config(
                    "try adapter cannot delegate to itself".to_string(),
                ));
            }

            let delegate = create_adapter(&try_config.delegate, config.clone())?;
            Ok(Box::new(TryModeEngine::new(delegate, config)))
        }
        other => Err(ExchangeError::Config(format!(
            "Unknown adapter: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantgate_core::config::{AuthenticationConfig, OtherConfig, TryModeConfig};

    fn base_config() -> AdapterConfig {
        AdapterConfig {
            authentication: AuthenticationConfig::new("key", "secret"),
            network: Default::default(),
            other: OtherConfig::new("0.001", "0.002"),
            try_mode: None,
        }
    }

    #[test]
    fn test_create_known_adapters() {
        let binance = create_adapter("binance", base_config()).unwrap();
        assert_eq!(binance.impl_name(), "binance");

        let bitstamp = create_adapter("Bitstamp", base_config()).unwrap();
        assert_eq!(bitstamp.impl_name(), "bitstamp");
    }

    #[test]
    fn test_create_unknown_adapter_fails() {
        assert!(matches!(
            create_adapter("mtgox", base_config()),
            Err(ExchangeError::Config(_))
        ));
    }

    #[test]
    fn test_try_adapter_requires_try_mode_section() {
        assert!(create_adapter("try", base_config()).is_err());
    }

    #[test]
    fn test_try_adapter_with_delegate() {
        let mut config = base_config();
        config.try_mode = Some(TryModeConfig {
            base_currency: "BTC".to_string(),
            base_starting_balance: "1".to_string(),
            counter_currency: "USD".to_string(),
            counter_starting_balance: "10000".to_string(),
            delegate: "binance".to_string(),
        });

        let adapter = create_adapter("try", config).unwrap();
        assert_eq!(adapter.impl_name(), "try");
    }

    #[test]
    fn test_try_adapter_rejects_self_delegate() {
        let mut config = base_config();
        config.try_mode = Some(TryModeConfig {
            base_currency: "BTC".to_string(),
            base_starting_balance: "1".to_string(),
            counter_currency: "USD".to_string(),
            counter_starting_balance: "10000".to_string(),
            delegate: "try".to_string(),
        });

        assert!(create_adapter("try", config).is_err());
    }
}
