//! TC3-HMAC-SHA256 request signing
//!
//! See <https://www.tencentcloud.com/document/api/213/33224>. Only the
//! `content-type` and `host` headers are signed, which is what the API
//! requires for JSON POST calls.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Result, TCloudError};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host";

/// Key pair plus the clock reading of one request.
pub struct Tc3Signer<'a> {
    pub secret_id: &'a str,
    pub secret_key: &'a str,
    pub service: &'a str,
    pub host: &'a str,
}

impl Tc3Signer<'_> {
    /// Value of the `Authorization` header for a JSON payload sent at `now`.
    pub fn authorization(&self, payload: &[u8], now: DateTime<Utc>) -> Result<String> {
        let date = now.format("%Y-%m-%d").to_string();
        let scope = format!("{}/{}/tc3_request", date, self.service);

        let canonical_request = format!(
            "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
            CONTENT_TYPE,
            self.host,
            SIGNED_HEADERS,
            sha256_hex(payload)
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            now.timestamp(),
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes())?;
        let secret_service = hmac_sha256(&secret_date, self.service.as_bytes())?;
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request")?;
        let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.secret_id, scope, SIGNED_HEADERS, signature
        ))
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| TCloudError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> Tc3Signer<'static> {
        Tc3Signer {
            secret_id: "AKIDEXAMPLE",
            secret_key: "secret",
            service: "cvm",
            host: "cvm.tencentcloudapi.com",
        }
    }

    #[test]
    fn test_authorization_layout() {
        let now = Utc.with_ymd_and_hms(2019, 2, 25, 8, 44, 10).unwrap();
        let auth = signer().authorization(b"{}", now).unwrap();

        assert!(auth.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2019-02-25/cvm/tc3_request, SignedHeaders=content-type;host, Signature="
        ));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_signature_depends_on_payload_and_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let a = signer().authorization(br#"{"Limit":100}"#, now).unwrap();
        let b = signer().authorization(br#"{"Limit":100}"#, now).unwrap();
        let c = signer().authorization(br#"{"Limit":20}"#, now).unwrap();
        let d = signer()
            .authorization(br#"{"Limit":100}"#, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_sha256_hex_of_empty_payload() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
