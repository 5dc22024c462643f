//! 거래소 요청 서명.
//!
//! 거래소마다 서명 방식이 다릅니다. nonce 생성 방식, 서명 대상 문자열의
//! 정규화 방식, 다이제스트 알고리즘, 서명 배치 위치를 조합해 하나의
//! `RequestSigner`로 표현합니다.
//!
//! | 거래소   | nonce        | 정규화              | 다이제스트   | 배치                |
//! |----------|--------------|---------------------|--------------|---------------------|
//! | Binance  | 타임스탬프   | 쿼리 문자열(삽입순) | HMAC-SHA256  | `signature` 파라미터|
//! | Bitstamp | 카운터       | nonce+ID+키 연접    | HMAC-SHA256  | `signature` 파라미터|

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Sha256, Sha512};

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// nonce 생성 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceSource {
    /// 시작값부터 1씩 증가하는 카운터
    Counter(u64),
    /// epoch 밀리초 타임스탬프 (시계가 멈춰도 단조 증가 보장)
    TimestampMillis,
}

/// 파라미터 정렬 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOrder {
    /// 추가된 순서 유지
    Insertion,
    /// 키 사전순 정렬
    Lexicographic,
}

/// 서명 대상 문자열의 정규화 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalForm {
    /// `k=v&k=v` 형태의 쿼리 문자열
    QueryString(ParamOrder),
    /// `nonce + client_id + api_key` 연접 (Bitstamp 방식)
    IdentityConcat,
}

/// 다이제스트 알고리즘.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA512
    HmacSha512,
}

/// 서명 배치 위치.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePlacement {
    /// 파라미터로 추가 (쿼리 또는 본문)
    Param(&'static str),
    /// 헤더로 추가
    Header(&'static str),
}

/// 서명된 요청.
///
/// `encoded_params`는 GET/DELETE에서는 쿼리 문자열로, POST에서는
/// 폼 본문으로 사용됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    /// 요청에 추가할 헤더
    pub headers: Vec<(String, String)>,
    /// 인코딩된 파라미터 (nonce와 서명 포함)
    pub encoded_params: String,
}

/// 거래소 요청 서명기.
///
/// 한 인스턴스가 발급하는 nonce는 항상 순증가합니다. 어댑터 인스턴스당
/// 하나의 서명기를 유지해야 합니다.
pub struct RequestSigner {
    api_key: String,
    api_secret: SecretString,
    client_id: Option<String>,
    nonce_source: NonceSource,
    nonce_param: &'static str,
    canonical_form: CanonicalForm,
    digest: DigestAlgorithm,
    placement: SignaturePlacement,
    uppercase_hex: bool,
    last_nonce: Option<u64>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &"***REDACTED***")
            .field("nonce_source", &self.nonce_source)
            .field("canonical_form", &self.canonical_form)
            .field("digest", &self.digest)
            .field("placement", &self.placement)
            .field("last_nonce", &self.last_nonce)
            .finish()
    }
}

impl RequestSigner {
    /// 새 서명기를 생성합니다.
    ///
    /// 기본값: 타임스탬프 nonce(`timestamp` 파라미터), 삽입순 쿼리 문자열,
    /// HMAC-SHA256 소문자 hex, `signature` 파라미터 배치.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            client_id: None,
            nonce_source: NonceSource::TimestampMillis,
            nonce_param: "timestamp",
            canonical_form: CanonicalForm::QueryString(ParamOrder::Insertion),
            digest: DigestAlgorithm::HmacSha256,
            placement: SignaturePlacement::Param("signature"),
            uppercase_hex: false,
            last_nonce: None,
        }
    }

    /// 클라이언트 ID를 설정합니다 (IdentityConcat 정규화에 필요).
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// nonce 생성 방식과 파라미터 이름을 설정합니다.
    pub fn with_nonce(mut self, source: NonceSource, param: &'static str) -> Self {
        self.nonce_source = source;
        self.nonce_param = param;
        self
    }

    /// 정규화 방식을 설정합니다.
    pub fn with_canonical_form(mut self, form: CanonicalForm) -> Self {
        self.canonical_form = form;
        self
    }

    /// 다이제스트 알고리즘을 설정합니다.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// 서명 배치 위치를 설정합니다.
    pub fn with_placement(mut self, placement: SignaturePlacement) -> Self {
        self.placement = placement;
        self
    }

    /// 서명을 대문자 hex로 인코딩합니다 (Bitstamp 방식).
    pub fn with_uppercase_hex(mut self) -> Self {
        self.uppercase_hex = true;
        self
    }

    /// 다음 nonce를 발급합니다. 같은 인스턴스에서는 항상 순증가합니다.
    fn next_nonce(&mut self) -> u64 {
        let nonce = match self.nonce_source {
            NonceSource::Counter(start) => match self.last_nonce {
                Some(last) => last + 1,
                None => start,
            },
            NonceSource::TimestampMillis => {
                let now = Utc::now().timestamp_millis() as u64;
                now.max(self.last_nonce.map(|last| last + 1).unwrap_or(0))
            }
        };
        self.last_nonce = Some(nonce);
        nonce
    }

    /// 파라미터에 nonce를 더해 서명하고, 서명이 배치된 요청 조각을 반환합니다.
    ///
    /// 파라미터 값은 호출자가 이미 인코딩 가능한 형태로 준비해야 합니다.
    pub fn sign(&mut self, params: &[(String, String)]) -> ExchangeResult<SignedRequest> {
        let nonce = self.next_nonce();

        let mut all_params: Vec<(String, String)> = params.to_vec();
        all_params.push((self.nonce_param.to_string(), nonce.to_string()));

        let canonical = match self.canonical_form {
            CanonicalForm::QueryString(order) => {
                let mut ordered = all_params.clone();
                if order == ParamOrder::Lexicographic {
                    ordered.sort_by(|a, b| a.0.cmp(&b.0));
                }
                encode_params(&ordered)
            }
            CanonicalForm::IdentityConcat => {
                let client_id = self.client_id.as_ref().ok_or_else(|| {
                    ExchangeError::Config(
                        "client_id is required for identity-concat signing".to_string(),
                    )
                })?;
                format!("{}{}{}", nonce, client_id, self.api_key)
            }
        };

        let signature = self.compute_digest(&canonical)?;

        let mut headers = Vec::new();
        match self.placement {
            SignaturePlacement::Param(name) => {
                all_params.push((name.to_string(), signature));
            }
            SignaturePlacement::Header(name) => {
                headers.push((name.to_string(), signature));
            }
        }

        Ok(SignedRequest {
            headers,
            encoded_params: encode_params(&all_params),
        })
    }

    /// 정규화된 문자열의 HMAC 다이제스트를 hex로 인코딩합니다.
    fn compute_digest(&self, canonical: &str) -> ExchangeResult<String> {
        let secret = self.api_secret.expose_secret().as_bytes();

        let digest = match self.digest {
            DigestAlgorithm::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .map_err(|e| ExchangeError::Config(format!("Invalid API secret: {}", e)))?;
                mac.update(canonical.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            DigestAlgorithm::HmacSha512 => {
                let mut mac = HmacSha512::new_from_slice(secret)
                    .map_err(|e| ExchangeError::Config(format!("Invalid API secret: {}", e)))?;
                mac.update(canonical.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        };

        if self.uppercase_hex {
            Ok(digest.to_uppercase())
        } else {
            Ok(digest)
        }
    }
}

/// 파라미터를 `k=v&k=v` 형태로 인코딩합니다.
fn encode_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
