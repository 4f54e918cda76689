//! `encrypt` -- 지정 필드를 대칭키로 암호화합니다.
//!
//! AES-256-GCM, 96비트 무작위 nonce를 사용하며 결과는 `base64(nonce ‖ ciphertext)`입니다.
//! 키가 없으면 변환은 아무것도 하지 않습니다.

use std::future::Future;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

/// AES-256 키 길이
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// 암호화 키 제공자
pub trait KeyProvider: Send + Sync {
    /// 현재 키. 없으면 암호화를 건너뜁니다.
    fn key(&self) -> Option<&[u8; KEY_LEN]>;
}

/// 고정 키
#[derive(Clone)]
pub struct StaticKey([u8; KEY_LEN]);

impl StaticKey {
    /// 키 바이트로 생성합니다.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// base64로 인코딩된 32바이트 키를 해석합니다.
    pub fn from_base64(encoded: &str) -> Result<Self, RouterError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RouterError::Encryption(format!("invalid base64 key: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            RouterError::Encryption(format!("key must be {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self(key))
    }

    /// 환경변수에서 base64 키를 읽습니다. 변수가 없으면 `None`입니다.
    pub fn from_env(var: &str) -> Result<Option<Self>, RouterError> {
        match std::env::var(var) {
            Ok(encoded) => Self::from_base64(&encoded).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl std::fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticKey(..)")
    }
}

impl KeyProvider for StaticKey {
    fn key(&self) -> Option<&[u8; KEY_LEN]> {
        Some(&self.0)
    }
}

/// 필드 암호화기
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// 키로 암호화기를 생성합니다.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// 평문을 암호화해 `base64(nonce ‖ ciphertext)`를 반환합니다.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, RouterError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| RouterError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// [`encrypt`](Self::encrypt) 결과를 복호화합니다.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, RouterError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| RouterError::Encryption(format!("invalid base64: {e}")))?;
        if bytes.len() < NONCE_LEN {
            return Err(RouterError::Encryption("ciphertext too short".to_owned()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| RouterError::Encryption(e.to_string()))
    }
}

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    field: Option<String>,
}

/// 필드 암호화
///
/// 문자열은 그대로, 그 외 값은 JSON 표기를 암호화합니다.
pub struct Encrypt {
    cipher: Option<FieldCipher>,
}

impl Encrypt {
    /// 키 제공자로 변환기를 생성합니다.
    pub fn new(provider: Option<Arc<dyn KeyProvider>>) -> Self {
        let cipher = provider
            .as_deref()
            .and_then(KeyProvider::key)
            .map(FieldCipher::new);
        Self { cipher }
    }

    fn encrypt(&self, mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let Some(cipher) = &self.cipher else {
            debug!("no encryption key available, skipping");
            return Ok(record);
        };

        let fields = params.fields.iter().map(String::as_str).chain(params.field.as_deref());
        for field in fields {
            let Some(value) = record::get_path(&record, field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let plaintext = record::value_to_string(value);
            let encrypted = cipher.encrypt(plaintext.as_bytes())?;
            record::set_path(&mut record, field, Value::String(encrypted));
        }
        Ok(record)
    }
}

impl Transformer for Encrypt {
    fn name(&self) -> &str {
        "encrypt"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(self.encrypt(record, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    fn encryptor() -> Encrypt {
        Encrypt::new(Some(Arc::new(StaticKey::new(KEY))))
    }

    #[test]
    fn encrypted_field_round_trips() {
        let record = json!({"user": {"email": "a@example.com"}, "n": 5})
            .as_object()
            .cloned()
            .unwrap();
        let step = TransformStep::new("encrypt").with("fields", json!(["user.email", "n"]));
        let out = encryptor().encrypt(record, &step).unwrap();

        let cipher = FieldCipher::new(&KEY);
        let email = out["user"]["email"].as_str().unwrap();
        assert_ne!(email, "a@example.com");
        assert_eq!(cipher.decrypt(email).unwrap(), b"a@example.com");
        assert_eq!(cipher.decrypt(out["n"].as_str().unwrap()).unwrap(), b"5");
    }

    #[test]
    fn nonce_is_random_per_encryption() {
        let cipher = FieldCipher::new(&KEY);
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn absent_key_is_noop() {
        let record = json!({"secret": "x"}).as_object().cloned().unwrap();
        let step = TransformStep::new("encrypt").with("field", "secret");
        let out = Encrypt::new(None).encrypt(record.clone(), &step).unwrap();
        assert_eq!(out, record);
    }

    #[test]
    fn key_from_base64() {
        let encoded = STANDARD.encode(KEY);
        assert!(StaticKey::from_base64(&encoded).is_ok());
        assert!(StaticKey::from_base64(&STANDARD.encode([1u8; 16])).is_err());
        assert!(StaticKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = FieldCipher::new(&KEY);
        let mut bytes = STANDARD.decode(cipher.encrypt(b"data").unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(cipher.decrypt(&STANDARD.encode(bytes)).is_err());
    }
}
