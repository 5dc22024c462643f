//! 재시도 정책이 적용된 HTTP 전송 계층.
//!
//! 이 계층은 "완료된 응답은 무조건 반환"을 원칙으로 합니다. HTTP 에러
//! 상태(4xx/5xx)도 해석 없이 호출자에게 전달하며, 의미 해석은 각 어댑터의
//! 응답 처리 코드가 담당합니다.
//!
//! 단 두 가지 경우만 일시적 장애로 분류되어 재시도됩니다:
//! - 응답이 완료되지 못한 전송 실패 (연결 거부, 타임아웃 등)
//! - 설정된 비치명적 상태 코드 또는 비치명적 메시지 부분 문자열에 해당하는 응답

use std::collections::HashSet;
use std::time::Duration;

use quantgate_core::config::NetworkConfig;
use reqwest::Method;
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};
use crate::retry::{with_retry, RetryConfig};

/// 완료된 HTTP 응답.
///
/// 상태 코드와 무관하게 거래소가 응답을 돌려주기만 하면 생성됩니다.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP 상태 코드
    pub status_code: u16,
    /// 상태 텍스트 (예: "OK", "Bad Request")
    pub status_text: String,
    /// 응답 본문
    pub body: String,
}

impl HttpResponse {
    /// 상태 코드가 2xx인지 확인합니다.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// 전송할 HTTP 요청.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP 메서드
    pub method: Method,
    /// 전체 URL (쿼리 문자열 포함)
    pub url: String,
    /// 추가 헤더
    pub headers: Vec<(String, String)>,
    /// 요청 본문 (POST에서 사용)
    pub body: Option<String>,
}

impl TransportRequest {
    /// GET 요청을 생성합니다.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST 요청을 생성합니다.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// DELETE 요청을 생성합니다.
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 헤더를 추가합니다.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 본문을 설정합니다.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// 재시도 정책이 적용된 HTTP 전송기.
///
/// 비치명적 분류표는 `init` 시점에 고정되며 이후 변하지 않습니다.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
    retry: RetryConfig,
    non_fatal_status_codes: HashSet<u16>,
    non_fatal_message_parts: Vec<String>,
}

impl RetryingTransport {
    /// 네트워크 설정에서 전송기를 생성합니다.
    pub fn new(network: &NetworkConfig) -> ExchangeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.connection_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig::from(network),
            non_fatal_status_codes: network.non_fatal_error_codes.iter().copied().collect(),
            non_fatal_message_parts: network.non_fatal_error_messages.clone(),
        })
    }

    /// 요청을 전송하고 완료된 응답을 반환합니다.
    ///
    /// 일시적 장애(전송 실패 또는 비치명적 분류표 일치)는 설정된 횟수만큼
    /// 재시도하고, 소진되면 마지막 원인을 담은 네트워크 에러를 반환합니다.
    pub async fn send(&self, request: TransportRequest) -> ExchangeResult<HttpResponse> {
        with_retry(&self.retry, || self.attempt(request.clone())).await
    }

    /// 단일 시도를 수행합니다.
    async fn attempt(&self, request: TransportRequest) -> ExchangeResult<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            "HTTP response received"
        );

        // 비치명적 분류표는 응답 반환보다 먼저 평가됩니다. 그렇지 않으면
        // 완료된 응답이 분류표를 우회하게 됩니다.
        if self.non_fatal_status_codes.contains(&status.as_u16()) {
            return Err(ExchangeError::Network(format!(
                "Non-fatal status {}: {}",
                status.as_u16(),
                body
            )));
        }
        if let Some(part) = self
            .non_fatal_message_parts
            .iter()
            .find(|part| body.contains(part.as_str()))
        {
            return Err(ExchangeError::Network(format!(
                "Non-fatal message \"{}\" in response: {}",
                part, body
            )));
        }

        Ok(HttpResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}
