//! # QuantGate Exchange
//!
//! 거래소 어댑터 크레이트입니다.
//!
//! 이 크레이트는 거래소와 통신하기 위한 공통 계약과 구현을 제공합니다:
//! - **traits**: 모든 어댑터가 구현하는 `ExchangeAdapter` 계약
//! - **transport**: 재시도 정책이 적용된 HTTP 전송 계층
//! - **signer**: 거래소별 요청 서명 (nonce, 정규화, 다이제스트)
//! - **connector**: 실제 거래소 어댑터 (Binance, Bitstamp)
//! - **try_mode**: 실주문 없이 전략을 검증하는 Try-Mode 시뮬레이션
//!
//! ## 사용 예제
//!
//! ```no_run
//! use quantgate_core::config::AdapterConfig;
//! use quantgate_exchange::connector::create_adapter;
//! use quantgate_exchange::traits::ExchangeAdapter;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AdapterConfig::load("config/binance.toml")?;
//! let mut adapter = create_adapter("binance", config)?;
//! adapter.init().await?;
//!
//! let ticker = adapter.get_ticker("btcusd").await?;
//! println!("last price: {}", ticker.last);
//! # Ok(())
//! # }
//! ```

pub mod connector;
pub mod error;
pub mod retry;
pub mod signer;
pub mod traits;
pub mod transport;
pub mod try_mode;

pub use connector::create_adapter;
pub use error::{ErrorKind, ExchangeError, ExchangeResult};
pub use traits::ExchangeAdapter;
pub use try_mode::TryModeEngine;
