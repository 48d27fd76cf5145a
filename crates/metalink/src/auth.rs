//! Auth negotiation: the hourly credential a service presents to the broker.
//!
//! The broker and the service share a secret. Instead of sending it, the
//! service sends `sha256(service_name + secret + hour_bucket)` as a hex
//! string, where the hour bucket is the local wall-clock hour:
//!
//! ```text
//! "{year}:{month0}:{day}:{hour}"     e.g. "2024:0:5:9" for 5 Jan 2024, 09:xx
//! ```
//!
//! `month0` is zero-based (January is 0) and nothing is zero-padded. Both
//! quirks are part of what the broker computes on its side, so they must be
//! reproduced exactly. The same token stays valid for the rest of the
//! current clock hour.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Builds auth request params for one service identity.
#[derive(Clone)]
pub struct AuthNegotiator {
    service_name: String,
    secret: String,
}

impl AuthNegotiator {
    pub fn new(service_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            secret: secret.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The credential for the current local hour.
    pub fn token(&self) -> String {
        self.token_at(&Local::now())
    }

    /// The credential for the hour containing `now`.
    pub fn token_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.service_name.as_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.update(hour_bucket(now).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Params of the auth request: `{ serviceName, token }`.
    pub fn request_params(&self) -> Value {
        json!({
            "serviceName": self.service_name,
            "token": self.token(),
        })
    }
}

impl std::fmt::Debug for AuthNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthNegotiator")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

/// Formats the time bucket the credential is derived from.
pub fn hour_bucket<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    format!("{}:{}:{}:{}", now.year(), now.month0(), now.day(), now.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_hour_bucket_uses_zero_based_month_without_padding() {
        assert_eq!(hour_bucket(&at(2024, 1, 5, 9, 30)), "2024:0:5:9");
        assert_eq!(hour_bucket(&at(2023, 12, 31, 23, 59)), "2023:11:31:23");
    }

    #[test]
    fn test_token_matches_known_digest() {
        let auth = AuthNegotiator::new("weather", "secret");
        assert_eq!(
            auth.token_at(&at(2024, 1, 5, 9, 30)),
            "5ec694dc1ed9f3bf76dc7782cf83797045a25123d1217e330f24ff07470359c8"
        );
    }

    #[test]
    fn test_token_is_stable_within_the_hour() {
        let auth = AuthNegotiator::new("weather", "secret");
        assert_eq!(
            auth.token_at(&at(2024, 1, 5, 9, 0)),
            auth.token_at(&at(2024, 1, 5, 9, 59))
        );
        assert_ne!(
            auth.token_at(&at(2024, 1, 5, 9, 59)),
            auth.token_at(&at(2024, 1, 5, 10, 0))
        );
    }

    #[test]
    fn test_request_params_shape() {
        let params = AuthNegotiator::new("weather", "secret").request_params();
        assert_eq!(params["serviceName"], "weather");
        let token = params["token"].as_str().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_debug_hides_secret() {
        let dbg = format!("{:?}", AuthNegotiator::new("weather", "hunter2"));
        assert!(!dbg.contains("hunter2"));
    }
}
