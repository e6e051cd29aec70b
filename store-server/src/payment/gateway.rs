//! Payment gateway integration via REST API (no SDK dependency)
//!
//! 对接外部支付网关：创建支付意图、查询、取消、校验回调签名。
//! 请求签名：对字段按 key 排序后拼接 `key=value`，以 `&` 连接，
//! HMAC-SHA256(checksum secret) 取 hex。回调用同一算法验证，
//! 比较走常数时间路径。
//!
//! 重试约定：`create_intent` 永不自动重试（重复意图风险，幂等性靠
//! 调用前生成的唯一交易码兜底）；`query_intent` 是幂等读，调用方
//! 可以安全重试。超时后交易保持 pending，由调用方重新查询。

use std::collections::BTreeMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// 网关配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 网关 API 地址
    pub base_url: String,
    /// 商户号
    pub merchant_code: String,
    /// 签名密钥
    pub checksum_secret: String,
    /// 支付完成跳转地址
    pub return_url: String,
    /// 取消跳转地址
    pub cancel_url: String,
    /// 请求超时 (毫秒)
    pub timeout_ms: u64,
    /// 支付意图有效期 (分钟)
    pub intent_expiry_minutes: i64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.gateway.example.com".into()),
            merchant_code: std::env::var("GATEWAY_MERCHANT_CODE").unwrap_or_else(|_| "DEMO".into()),
            checksum_secret: std::env::var("GATEWAY_CHECKSUM_SECRET")
                .unwrap_or_else(|_| "demo-checksum-secret".into()),
            return_url: std::env::var("GATEWAY_RETURN_URL")
                .unwrap_or_else(|_| "https://localhost/payment/return".into()),
            cancel_url: std::env::var("GATEWAY_CANCEL_URL")
                .unwrap_or_else(|_| "https://localhost/payment/cancel".into()),
            timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            intent_expiry_minutes: std::env::var("GATEWAY_INTENT_EXPIRY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway rejected the request: {code} {message}")]
    Rejected { code: String, message: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("webhook signature mismatch")]
    InvalidSignature,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

impl From<GatewayError> for crate::utils::AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Timeout => crate::utils::AppError::GatewayTimeout,
            other => crate::utils::AppError::Gateway(other.to_string()),
        }
    }
}

/// A created payment intent: where to send the buyer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub gateway_txn_id: String,
    pub checkout_url: String,
    #[serde(default)]
    pub qr_payload: Option<String>,
}

/// Gateway-side view of an intent's progress.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentStatus {
    pub gateway_txn_id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct GatewayEnvelope<T> {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<T>,
}

/// Payment gateway client.
///
/// Constructed once at startup and handed down; there is no hidden global.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Create a payment intent. NEVER retried automatically.
    pub async fn create_intent(
        &self,
        transaction_code: &str,
        amount: f64,
        description: &str,
        buyer_email: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let expires_at =
            chrono::Utc::now() + chrono::Duration::minutes(self.config.intent_expiry_minutes);

        let mut fields = BTreeMap::new();
        fields.insert("amount".to_string(), format_amount(amount));
        fields.insert("buyer_email".to_string(), buyer_email.to_string());
        fields.insert("cancel_url".to_string(), self.config.cancel_url.clone());
        fields.insert("description".to_string(), description.to_string());
        fields.insert("expires_at".to_string(), expires_at.timestamp().to_string());
        fields.insert("merchant_code".to_string(), self.config.merchant_code.clone());
        fields.insert("return_url".to_string(), self.config.return_url.clone());
        fields.insert("transaction_code".to_string(), transaction_code.to_string());

        let signature = self.sign_fields(&fields);

        let mut body: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        body.insert("signature".to_string(), serde_json::Value::String(signature));

        let url = format!("{}/v1/intents", self.config.base_url);
        let envelope: GatewayEnvelope<PaymentIntent> = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        unwrap_envelope(envelope)
    }

    /// Query an intent. Idempotent read; safe for callers to retry.
    pub async fn query_intent(&self, transaction_code: &str) -> Result<IntentStatus, GatewayError> {
        let mut fields = BTreeMap::new();
        fields.insert("merchant_code".to_string(), self.config.merchant_code.clone());
        fields.insert("transaction_code".to_string(), transaction_code.to_string());
        let signature = self.sign_fields(&fields);

        let url = format!(
            "{}/v1/intents/{}?merchant_code={}&signature={}",
            self.config.base_url, transaction_code, self.config.merchant_code, signature
        );
        let envelope: GatewayEnvelope<IntentStatus> = self
            .http
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        unwrap_envelope(envelope)
    }

    /// Cancel an intent that has not been paid.
    pub async fn cancel_intent(&self, transaction_code: &str) -> Result<(), GatewayError> {
        let mut fields = BTreeMap::new();
        fields.insert("merchant_code".to_string(), self.config.merchant_code.clone());
        fields.insert("transaction_code".to_string(), transaction_code.to_string());
        let signature = self.sign_fields(&fields);

        let url = format!(
            "{}/v1/intents/{}/cancel",
            self.config.base_url, transaction_code
        );
        let envelope: GatewayEnvelope<serde_json::Value> = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "merchant_code": self.config.merchant_code,
                "signature": signature,
            }))
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        unwrap_envelope(envelope).map(|_| ())
    }

    /// HMAC-SHA256 over `key=value` pairs joined with `&` in key order.
    pub fn sign_fields(&self, fields: &BTreeMap<String, String>) -> String {
        let canonical = canonical_string(fields);
        let mut mac = HmacSha256::new_from_slice(self.config.checksum_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify an inbound webhook. Constant-time comparison via
    /// `Mac::verify_slice`; the `signature` field itself is excluded from
    /// the canonical string.
    pub fn verify_webhook(
        &self,
        fields: &BTreeMap<String, String>,
        signature_hex: &str,
    ) -> Result<(), GatewayError> {
        let canonical = canonical_string(fields);
        let mut mac = HmacSha256::new_from_slice(self.config.checksum_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());

        let sig_bytes = hex::decode(signature_hex).map_err(|_| GatewayError::InvalidSignature)?;
        mac.verify_slice(&sig_bytes)
            .map_err(|_| GatewayError::InvalidSignature)
    }
}

/// `key=value` pairs joined with `&`, keys in lexicographic order
/// (BTreeMap iteration order).
fn canonical_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Amounts travel as plain decimal strings; whole numbers stay whole.
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{amount:.2}")
    }
}

fn unwrap_envelope<T>(envelope: GatewayEnvelope<T>) -> Result<T, GatewayError> {
    if envelope.code != "00" {
        return Err(GatewayError::Rejected {
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::InvalidResponse("missing data in success response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            base_url: "https://gateway.test".into(),
            merchant_code: "M001".into(),
            checksum_secret: "test-checksum-secret".into(),
            return_url: "https://shop.test/return".into(),
            cancel_url: "https://shop.test/cancel".into(),
            timeout_ms: 1000,
            intent_expiry_minutes: 15,
        })
        .unwrap()
    }

    fn sample_fields() -> BTreeMap<String, String> {
        let mut f = BTreeMap::new();
        f.insert("transaction_code".to_string(), "PAY20250101123".to_string());
        f.insert("amount".to_string(), "250000".to_string());
        f.insert("status".to_string(), "success".to_string());
        f
    }

    #[test]
    fn canonical_string_sorts_keys() {
        let mut f = BTreeMap::new();
        f.insert("b".to_string(), "2".to_string());
        f.insert("a".to_string(), "1".to_string());
        f.insert("c".to_string(), "3".to_string());
        assert_eq!(canonical_string(&f), "a=1&b=2&c=3");
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let client = client();
        let fields = sample_fields();
        let sig = client.sign_fields(&fields);
        assert!(client.verify_webhook(&fields, &sig).is_ok());
    }

    #[test]
    fn tampered_field_fails_verification() {
        let client = client();
        let mut fields = sample_fields();
        let sig = client.sign_fields(&fields);
        fields.insert("amount".to_string(), "1".to_string());
        assert!(matches!(
            client.verify_webhook(&fields, &sig),
            Err(GatewayError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_signature_fails_verification() {
        let client = client();
        let fields = sample_fields();
        assert!(client.verify_webhook(&fields, "zz-not-hex").is_err());
        assert!(client.verify_webhook(&fields, "deadbeef").is_err());
    }

    #[test]
    fn different_secret_produces_different_signature() {
        let a = client();
        let mut config = a.config().clone();
        config.checksum_secret = "another-secret".into();
        let b = GatewayClient::new(config).unwrap();
        let fields = sample_fields();
        assert_ne!(a.sign_fields(&fields), b.sign_fields(&fields));
    }

    #[test]
    fn amounts_format_without_trailing_zeros() {
        assert_eq!(format_amount(250000.0), "250000");
        assert_eq!(format_amount(99.5), "99.50");
    }
}
