//! 어댑터 설정 표면.
//!
//! 이 모듈은 어댑터가 `init` 시점에 소비하는 읽기 전용 설정을 정의합니다.
//! 로드 단계에서는 형태만 확인하며, 값 검증은 어댑터의 `init`에서 한 번 수행됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::CoreResult;

/// 어댑터 전체 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// 인증 설정
    pub authentication: AuthenticationConfig,
    /// 네트워크 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 수수료 등 어댑터별 설정
    pub other: OtherConfig,
    /// Try-Mode 시뮬레이션 설정 (Try-Mode 어댑터에만 필요)
    #[serde(default)]
    pub try_mode: Option<TryModeConfig>,
}

impl AdapterConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `QUANTGATE` 접두사와 `__` 구분자를 사용합니다.
    /// 예: `QUANTGATE_AUTHENTICATION__API_KEY`
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUANTGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

/// 인증 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
#[derive(Clone, Deserialize, Serialize)]
pub struct AuthenticationConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: String,
    /// 클라이언트 ID (일부 거래소의 서명에 사용)
    #[serde(default)]
    pub client_id: Option<String>,
}

impl fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = if self.api_key.len() > 8 {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("AuthenticationConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl AuthenticationConfig {
    /// 새 인증 설정을 생성합니다.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            client_id: None,
        }
    }

    /// 클라이언트 ID를 설정합니다.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// 네트워크 설정.
///
/// 비치명적 에러 코드/메시지 목록은 어댑터 인스턴스의 재시도 분류표가 되며
/// `init` 이후 변하지 않습니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// 연결 타임아웃 (초, 양수)
    pub connection_timeout_secs: u64,
    /// 논리 요청당 최대 시도 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 재시도 간 대기 시간 (밀리초)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 일시적 장애로 분류할 HTTP 상태 코드
    #[serde(default)]
    pub non_fatal_error_codes: Vec<u16>,
    /// 일시적 장애로 분류할 에러 메시지 부분 문자열
    #[serde(default)]
    pub non_fatal_error_messages: Vec<String>,
    /// REST API 기본 URL 재정의 (미설정 시 어댑터 기본값)
    #[serde(default)]
    pub rest_base_url: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 30,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            non_fatal_error_codes: Vec::new(),
            non_fatal_error_messages: Vec::new(),
            rest_base_url: None,
        }
    }
}

impl NetworkConfig {
    /// 기본 URL을 재정의합니다.
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// 비치명적 상태 코드를 설정합니다.
    pub fn with_non_fatal_codes(mut self, codes: Vec<u16>) -> Self {
        self.non_fatal_error_codes = codes;
        self
    }

    /// 비치명적 메시지 부분 문자열을 설정합니다.
    pub fn with_non_fatal_messages(mut self, messages: Vec<String>) -> Self {
        self.non_fatal_error_messages = messages;
        self
    }
}

/// 수수료 등 어댑터별 설정.
///
/// 수수료는 소수 문자열로 표현합니다 (예: "0.001" = 0.1%).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtherConfig {
    /// 매수 주문 수수료율
    pub buy_fee: String,
    /// 매도 주문 수수료율
    pub sell_fee: String,
}

impl OtherConfig {
    /// 새 설정을 생성합니다.
    pub fn new(buy_fee: impl Into<String>, sell_fee: impl Into<String>) -> Self {
        Self {
            buy_fee: buy_fee.into(),
            sell_fee: sell_fee.into(),
        }
    }
}

/// Try-Mode 시뮬레이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TryModeConfig {
    /// 기준 통화 (예: "BTC")
    pub base_currency: String,
    /// 기준 통화 시작 잔고 (소수 문자열)
    pub base_starting_balance: String,
    /// 상대 통화 (예: "USD")
    pub counter_currency: String,
    /// 상대 통화 시작 잔고 (소수 문자열)
    pub counter_starting_balance: String,
    /// 공개 API 호출을 위임할 어댑터 식별자 (예: "binance")
    pub delegate: String,
}
