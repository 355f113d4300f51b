//! 凭证校验实现
//!
//! - `JwtCredentialVerifier`：HS256 令牌，身份取自 `user_id` 声明
//! - `SharedSecretVerifier`：与配置的共享密钥做常量时间比较，用于本地开发

use application::{AuthError, CredentialVerifier};
use chrono::{DateTime, Duration, Utc};
use domain::UserId;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::{hmac, rand::SystemRandom};
use serde::{Deserialize, Serialize};

/// JWT 声明。`user_id` 可以是数字或数字字符串
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub exp: i64,
}

pub struct JwtCredentialVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl JwtCredentialVerifier {
    pub fn new(secret: &[u8], token_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_ttl,
        }
    }

    /// 签发令牌，供运维脚本和测试使用
    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            user_id,
            exp: (now + self.token_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::invalid(format!("failed to sign token: {err}")))
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.user_id)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::invalid(err.to_string()),
            })
    }
}

/// 共享密钥校验：凭证与密钥一致时解析为固定身份。
///
/// 比较通过 HMAC 标签校验完成，耗时与不匹配位置无关。
pub struct SharedSecretVerifier {
    key: hmac::Key,
    expected: hmac::Tag,
    identity: UserId,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str, identity: UserId) -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &rng)
            .map_err(|_| AuthError::invalid("failed to generate comparison key"))?;
        let expected = hmac::sign(&key, secret.as_bytes());
        Ok(Self {
            key,
            expected,
            identity,
        })
    }
}

impl CredentialVerifier for SharedSecretVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        hmac::verify(&self.key, token.as_bytes(), self.expected.as_ref())
            .map(|()| self.identity)
            .map_err(|_| AuthError::invalid("shared secret mismatch"))
    }
}
