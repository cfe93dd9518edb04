//! Request signing.
//!
//! Every API call carries a fresh `timestamp` and a `sign` field derived from the
//! sorted parameter set and a shared secret. The digest is behind
//! [`SignatureDigest`] so the construction can be swapped without touching callers.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use log::trace;

use crate::Config;

/// Hashes the canonical string into the `sign` value.
pub trait SignatureDigest: Send + Sync {
    fn hex_digest(&self, input: &str) -> String;
}

/// Lowercase hex MD5, what the service expects today.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Digest;

impl SignatureDigest for Md5Digest {
    fn hex_digest(&self, input: &str) -> String {
        format!("{:x}", md5::compute(input.as_bytes()))
    }
}

/// Builds the final, signed query parameters for any endpoint.
#[derive(Clone)]
pub struct RequestSigner {
    base: BTreeMap<String, String>,
    secret: String,
    digest: Arc<dyn SignatureDigest>,
}

impl RequestSigner {
    /// Signer using the literals and secret from `config` and MD5.
    pub fn new(config: &Config) -> Self {
        Self::with_digest(config, Arc::new(Md5Digest))
    }

    pub fn with_digest(config: &Config, digest: Arc<dyn SignatureDigest>) -> Self {
        let base = [
            ("api_key", &config.api_key),
            ("app_version", &config.app_version),
            ("platform", &config.platform),
            ("webp", &config.webp),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

        Self {
            base,
            secret: config.secret.clone(),
            digest,
        }
    }

    /// Signs `params` with the current wall-clock time.
    ///
    /// Call once per request: a retry must sign again rather than resend.
    pub fn sign<I, K, V>(&self, params: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.sign_at(params, Utc::now().timestamp())
    }

    /// Signs `params` as of `timestamp` (Unix seconds).
    ///
    /// Caller parameters are merged over the base literals, except `timestamp`,
    /// which always comes from the argument.
    pub fn sign_at<I, K, V>(&self, params: I, timestamp: i64) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut signed = self.base.clone();
        for (key, value) in params {
            let key = key.into();
            if key == "timestamp" {
                continue;
            }
            signed.insert(key, value.into());
        }
        signed.insert("timestamp".to_string(), timestamp.to_string());

        let mut input = canonical_string(&signed);
        input.push_str(&self.secret);
        let sign = self.digest.hex_digest(&input);
        trace!("Signed {} parameters", signed.len());

        signed.insert("sign".to_string(), sign);
        signed
    }
}

/// `key=value` pairs in key order, joined by `&`.
pub fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> RequestSigner {
        RequestSigner::new(&Config::default())
    }

    #[test]
    fn test_md5_digest_is_lowercase_hex() {
        assert_eq!(
            Md5Digest.hex_digest("abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = signer().sign_at([("limit", "200"), ("tz", "8:0")], 1_700_000_000);
        let b = signer().sign_at([("limit", "200"), ("tz", "8:0")], 1_700_000_000);
        assert_eq!(a, b);
        assert_eq!(a["sign"].len(), 32);
    }

    #[test]
    fn test_signature_matches_canonical_construction() {
        let signed = signer().sign_at([("limit", "200")], 1_700_000_000);
        let expected_input = "api_key=flomo_web&app_version=4.0&limit=200&platform=web\
                              &timestamp=1700000000&webp=1dbbc3dd73364b4084c3a69346e0ce2b2";
        assert_eq!(signed["sign"], Md5Digest.hex_digest(expected_input));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward = signer().sign_at(
            [("limit", "200"), ("tz", "8:0"), ("latest_slug", "abc")],
            1_700_000_000,
        );
        let backward = signer().sign_at(
            [("latest_slug", "abc"), ("tz", "8:0"), ("limit", "200")],
            1_700_000_000,
        );
        assert_eq!(forward["sign"], backward["sign"]);
    }

    #[test]
    fn test_any_change_changes_signature() {
        let base = signer().sign_at([("limit", "200")], 1_700_000_000);
        let other_value = signer().sign_at([("limit", "201")], 1_700_000_000);
        let other_time = signer().sign_at([("limit", "200")], 1_700_000_001);
        assert_ne!(base["sign"], other_value["sign"]);
        assert_ne!(base["sign"], other_time["sign"]);
    }

    #[test]
    fn test_caller_cannot_override_timestamp() {
        let signed = signer().sign_at([("timestamp", "1"), ("limit", "10")], 1_700_000_000);
        assert_eq!(signed["timestamp"], "1700000000");
        assert_eq!(signed["limit"], "10");
        assert_eq!(signed["api_key"], "flomo_web");
    }

    #[test]
    fn test_digest_is_injectable() {
        struct Reverse;
        impl SignatureDigest for Reverse {
            fn hex_digest(&self, input: &str) -> String {
                input.chars().rev().collect()
            }
        }

        let config = Config {
            secret: "s".to_string(),
            ..Config::default()
        };
        let signed = RequestSigner::with_digest(&config, Arc::new(Reverse)).sign_at(
            Vec::<(String, String)>::new(),
            5,
        );
        assert!(signed["sign"].starts_with("s1=pbew"));
    }
}
