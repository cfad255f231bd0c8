//! Web push delivery: RFC 8291 payload encryption (`aes128gcm`) with
//! RFC 8292 VAPID authorization.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::agreement;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use super::{PushError, PushSender};
use crate::config::PushConfig;

type HmacSha256 = Hmac<Sha256>;

/// Record size advertised in the content coding header
const RECORD_SIZE: u32 = 4096;
/// HKDF-Expand counter for the first output block
const BLOCK_ONE: &[u8] = &[0x01];
/// VAPID tokens are valid for this long; push services reject more than 24h
const VAPID_EXPIRY_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Deserialize)]
struct SubscriptionInfo {
    endpoint: String,
    keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VapidClaims {
    aud: String,
    exp: i64,
    sub: String,
}

fn decode_key(value: &str) -> Result<Vec<u8>, PushError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| PushError::InvalidSubscription(e.to_string()))
}

fn hmac(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], PushError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| PushError::Crypto)?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Content encryption key and nonce derived from the ECDH secret.
#[derive(Debug, PartialEq, Eq)]
struct ContentKeys {
    cek: [u8; 16],
    nonce: [u8; 12],
}

/// HKDF-SHA256 in the shape RFC 8291 uses it. Every output fits in one
/// block so expand is a single HMAC over `info || 0x01`.
fn derive_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<ContentKeys, PushError> {
    let prk_key = hmac(auth_secret, &[ecdh_secret])?;
    let ikm = hmac(
        &prk_key,
        &[b"WebPush: info\0".as_slice(), ua_public, as_public, BLOCK_ONE],
    )?;
    let prk = hmac(salt, &[ikm.as_slice()])?;

    let cek = hmac(&prk, &[b"Content-Encoding: aes128gcm\0".as_slice(), BLOCK_ONE])?;
    let nonce = hmac(&prk, &[b"Content-Encoding: nonce\0".as_slice(), BLOCK_ONE])?;

    let mut keys = ContentKeys {
        cek: [0; 16],
        nonce: [0; 12],
    };
    keys.cek.copy_from_slice(&cek[..16]);
    keys.nonce.copy_from_slice(&nonce[..12]);
    Ok(keys)
}

/// Encrypt `payload` as a single `aes128gcm` record with the given salt and
/// application server key share.
fn seal(
    payload: &[u8],
    keys: &ContentKeys,
    salt: &[u8; 16],
    as_public: &[u8],
) -> Result<Vec<u8>, PushError> {
    let cipher = Aes128Gcm::new_from_slice(&keys.cek).map_err(|_| PushError::Crypto)?;

    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    // last record delimiter
    plaintext.push(0x02);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&keys.nonce), plaintext.as_slice())
        .map_err(|_| PushError::Crypto)?;

    let idlen = u8::try_from(as_public.len()).map_err(|_| PushError::Crypto)?;
    let mut body = Vec::with_capacity(21 + as_public.len() + ciphertext.len());
    body.extend_from_slice(salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(idlen);
    body.extend_from_slice(as_public);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Encrypt a payload for one user agent with a fresh ephemeral key.
pub fn encrypt(payload: &[u8], ua_public: &[u8], auth_secret: &[u8]) -> Result<Vec<u8>, PushError> {
    let rng = ring::rand::SystemRandom::new();
    let private = agreement::EphemeralPrivateKey::generate(&agreement::ECDH_P256, &rng)
        .map_err(|_| PushError::Crypto)?;
    let as_public = private.compute_public_key().map_err(|_| PushError::Crypto)?;
    let as_public = as_public.as_ref().to_vec();

    let peer = agreement::UnparsedPublicKey::new(&agreement::ECDH_P256, ua_public);
    let ecdh_secret = agreement::agree_ephemeral(private, &peer, |secret| secret.to_vec())
        .map_err(|_| PushError::InvalidSubscription("bad p256dh key".to_string()))?;

    let salt: [u8; 16] = rand::random();
    let keys = derive_keys(&ecdh_secret, auth_secret, ua_public, &as_public, &salt)?;
    seal(payload, &keys, &salt, &as_public)
}

/// Sends encrypted pushes signed with the server's VAPID key.
pub struct WebPushSender {
    http: reqwest::Client,
    signing_key: EncodingKey,
    public_key: String,
    subject: String,
    ttl: u32,
}

impl WebPushSender {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let signing_key = EncodingKey::from_ec_pem(config.vapid_private_key_pem.as_bytes())
            .map_err(|e| PushError::Vapid(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.delivery_timeout_secs))
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            signing_key,
            public_key: config.vapid_public_key.trim_end_matches('=').to_string(),
            subject: config.vapid_subject.clone(),
            ttl: config.ttl_secs,
        })
    }

    /// `Authorization` header value for a push to `endpoint`
    fn authorization(&self, endpoint: &str) -> Result<String, PushError> {
        let endpoint =
            url::Url::parse(endpoint).map_err(|e| PushError::InvalidSubscription(e.to_string()))?;
        let claims = VapidClaims {
            aud: endpoint.origin().ascii_serialization(),
            exp: chrono::Utc::now().timestamp() + VAPID_EXPIRY_SECS,
            sub: self.subject.clone(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.signing_key)
            .map_err(|e| PushError::Vapid(e.to_string()))?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &Value, payload: &[u8]) -> Result<(), PushError> {
        let info: SubscriptionInfo = serde_json::from_value(subscription.clone())
            .map_err(|e| PushError::InvalidSubscription(e.to_string()))?;

        let ua_public = decode_key(&info.keys.p256dh)?;
        let auth_secret = decode_key(&info.keys.auth)?;
        let body = encrypt(payload, &ua_public, &auth_secret)?;
        let authorization = self.authorization(&info.endpoint)?;

        let response = self
            .http
            .post(&info.endpoint)
            .header("Authorization", authorization)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("TTL", self.ttl.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, detail = %detail, "Push service rejected message");
            return Err(PushError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
