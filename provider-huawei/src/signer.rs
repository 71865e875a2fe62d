//! APIG `SDK-HMAC-SHA256` request signing
//!
//! The canonical URI always ends with `/`, query pairs are sorted after
//! encoding, and the signing key is the raw secret key.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{HuaWeiError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const CONTENT_TYPE: &str = "application/json";
const SIGNED_HEADERS: &str = "content-type;host;x-project-id;x-sdk-date";

/// `X-Sdk-Date` layout
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub struct ApigSigner<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub project_id: &'a str,
}

/// The parts of a request that take part in the signature.
pub struct Signable<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Already encoded and sorted, without the leading `?`
    pub canonical_query: &'a str,
    pub body: &'a [u8],
}

pub struct SignedHeaders {
    pub sdk_date: String,
    pub authorization: String,
}

impl ApigSigner<'_> {
    pub fn sign(&self, request: &Signable<'_>, now: DateTime<Utc>) -> Result<SignedHeaders> {
        let sdk_date = now.format(DATE_FORMAT).to_string();

        let canonical_request = format!(
            "{}\n{}\n{}\ncontent-type:{}\nhost:{}\nx-project-id:{}\nx-sdk-date:{}\n\n{}\n{}",
            request.method,
            canonical_uri(request.path),
            request.canonical_query,
            CONTENT_TYPE,
            request.host,
            self.project_id,
            sdk_date,
            SIGNED_HEADERS,
            sha256_hex(request.body)
        );
        let string_to_sign = format!(
            "{}\n{}\n{}",
            ALGORITHM,
            sdk_date,
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(
            self.secret_key.as_bytes(),
            string_to_sign.as_bytes(),
        )?);

        Ok(SignedHeaders {
            authorization: format!(
                "{} Access={}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access_key, SIGNED_HEADERS, signature
            ),
            sdk_date,
        })
    }
}

/// Sorted `k=v&...` with both sides percent-encoded.
pub fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_uri(path: &str) -> String {
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if encoded.ends_with('/') {
        encoded
    } else {
        format!("{}/", encoded)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| HuaWeiError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
