//! 기본 타입 정의.

pub mod decimal;

pub use decimal::*;
