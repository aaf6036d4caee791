// src/publish/oauth.rs
//! OAuth 1.0a request signing (HMAC-SHA1), as required for user-context posts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// RFC 3986 percent-encoding: everything except `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// 32 random alphanumeric characters.
pub fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn oauth_params<'a>(
    creds: &'a OAuthCredentials,
    nonce: &'a str,
    timestamp: &'a str,
) -> Vec<(&'a str, &'a str)> {
    vec![
        ("oauth_consumer_key", creds.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_timestamp", timestamp),
        ("oauth_token", creds.access_token.as_str()),
        ("oauth_version", OAUTH_VERSION),
    ]
}

/// Normalized parameter string: encoded pairs sorted by key then value.
pub fn parameter_string(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signature over `method`, `url` (without query) and all query/form `extra` params.
pub fn signature(
    creds: &OAuthCredentials,
    method: &str,
    url: &str,
    extra: &[(&str, &str)],
    nonce: &str,
    timestamp: u64,
) -> String {
    let ts = timestamp.to_string();
    let mut params = oauth_params(creds, nonce, &ts);
    params.extend_from_slice(extra);

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&parameter_string(&params))
    );
    let key = format!(
        "{}&{}",
        percent_encode(&creds.consumer_secret),
        percent_encode(&creds.access_token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Value for the `Authorization` header.
pub fn authorization_header(
    creds: &OAuthCredentials,
    method: &str,
    url: &str,
    extra: &[(&str, &str)],
    nonce: &str,
    timestamp: u64,
) -> String {
    let sig = signature(creds, method, url, extra, nonce, timestamp);
    let ts = timestamp.to_string();
    let mut params = oauth_params(creds, nonce, &ts);
    params.push(("oauth_signature", sig.as_str()));
    params.sort();

    let fields = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from Twitter's "Creating a signature" documentation.
    fn doc_creds() -> OAuthCredentials {
        OAuthCredentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    const DOC_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const DOC_TS: u64 = 1318622958;
    const DOC_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const DOC_EXTRA: [(&str, &str); 2] = [
        ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
        ("include_entities", "true"),
    ];

    #[test]
    fn percent_encoding_is_rfc3986() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
        assert_eq!(percent_encode("!"), "%21");
    }

    #[test]
    fn parameter_string_matches_documented_example() {
        let creds = doc_creds();
        let ts = DOC_TS.to_string();
        let mut params = oauth_params(&creds, DOC_NONCE, &ts);
        params.extend_from_slice(&DOC_EXTRA);
        assert_eq!(
            parameter_string(&params),
            "include_entities=true&oauth_consumer_key=xvz1evFS4wEEPTGEFPHBog\
             &oauth_nonce=kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             &oauth_signature_method=HMAC-SHA1&oauth_timestamp=1318622958\
             &oauth_token=370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\
             &oauth_version=1.0\
             &status=Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
    }

    #[test]
    fn signature_matches_documented_example() {
        let sig = signature(&doc_creds(), "post", DOC_URL, &DOC_EXTRA, DOC_NONCE, DOC_TS);
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn header_lists_sorted_encoded_fields() {
        let h = authorization_header(&doc_creds(), "POST", DOC_URL, &DOC_EXTRA, DOC_NONCE, DOC_TS);
        assert!(h.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(h.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(h.ends_with("oauth_version=\"1.0\""));
        assert!(!h.contains("status="), "body params are signed, not sent in the header");
    }

    #[test]
    fn nonces_are_alphanumeric_and_distinct() {
        let a = nonce();
        let b = nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = format!("{:?}", doc_creds());
        assert!(!s.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"));
        assert!(s.contains("<redacted>"));
    }
}
