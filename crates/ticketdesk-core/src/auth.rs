//! Dashboard credentials.
//!
//! The dashboard proves who it acts for in one of two ways:
//! - a session token signed by [`SessionSigner`], handed out when a link code
//!   is claimed or on password login
//! - the init data Telegram passes to a Web App, checked by
//!   [`verify_init_data`] against the bot token
//!
//! Neither proves the caller is a technician; that is a separate membership
//! check against the configuration and the technician registry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;
use url::form_urlencoded;

use ticketdesk_models::TechnicianRef;

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

const ISSUER: &str = "ticketdesk";

/// Key Telegram uses to derive the Web App signing secret from a bot token.
const WEB_APP_KEY: &[u8] = b"WebAppData";

/// Credential failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid or expired session token")]
    InvalidToken,

    #[error("invalid Telegram init data: {0}")]
    InvalidInitData(String),

    #[error("Telegram init data has expired")]
    StaleInitData,

    #[error("failed to sign session token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// A signed session token and its expiry.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 session tokens.
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Builds a signer from `[auth]`. Without a configured secret a random
    /// one is used, so sessions do not survive a restart.
    pub fn from_config(config: &AuthConfig) -> Self {
        let ttl = config.session_ttl();
        match config.session_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret.as_bytes(), ttl),
            None => {
                warn!("auth.session_secret not set; dashboard sessions end on restart");
                let mut secret = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                Self::new(&secret, ttl)
            }
        }
    }

    pub fn issue(&self, technician: &TechnicianRef) -> Result<SessionToken, AuthError> {
        self.issue_at(technician, Utc::now())
    }

    fn issue_at(&self, technician: &TechnicianRef, now: DateTime<Utc>) -> Result<SessionToken, AuthError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: technician.id.to_string(),
            name: technician.name.clone(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        Ok(SessionToken { token, expires_at })
    }

    /// Returns the technician a valid, unexpired token was issued for.
    pub fn verify(&self, token: &str) -> Result<TechnicianRef, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        let id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(TechnicianRef::new(id, data.claims.name))
    }
}

#[derive(Debug, Deserialize)]
struct WebAppUser {
    id: i64,
    #[serde(default)]
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

impl WebAppUser {
    fn into_technician(self) -> TechnicianRef {
        let name = match (&self.last_name, self.first_name.is_empty()) {
            (Some(last), false) if !last.is_empty() => format!("{} {}", self.first_name, last),
            (_, false) => self.first_name.clone(),
            _ => self
                .username
                .clone()
                .unwrap_or_else(|| format!("Technician {}", self.id)),
        };
        TechnicianRef::new(self.id, name)
    }
}

/// Checks Web App init data signed with `bot_token` and returns its user.
///
/// The data-check string is every field except `hash`, sorted by key and
/// joined as `key=value` lines; the signature is HMAC-SHA256 under
/// `HMAC-SHA256("WebAppData", bot_token)`.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<TechnicianRef, AuthError> {
    let mut hash = None;
    let mut fields: Vec<(String, String)> = Vec::new();
    for (key, value) in form_urlencoded::parse(init_data.trim().as_bytes()) {
        if key == "hash" {
            hash = Some(value.into_owned());
        } else {
            fields.push((key.into_owned(), value.into_owned()));
        }
    }
    let hash = hash.ok_or_else(|| AuthError::InvalidInitData("missing hash".into()))?;
    let signature =
        hex::decode(hash).map_err(|_| AuthError::InvalidInitData("malformed hash".into()))?;

    let mut mac = HmacSha256::new_from_slice(&web_app_secret(bot_token)?)
        .map_err(|e| AuthError::InvalidInitData(e.to_string()))?;
    mac.update(data_check_string(&mut fields).as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidInitData("signature mismatch".into()))?;

    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let auth_date = field("auth_date")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| AuthError::InvalidInitData("missing auth_date".into()))?;
    if now - auth_date > max_age {
        return Err(AuthError::StaleInitData);
    }

    let user = field("user").ok_or_else(|| AuthError::InvalidInitData("missing user".into()))?;
    let user: WebAppUser =
        serde_json::from_str(user).map_err(|e| AuthError::InvalidInitData(e.to_string()))?;
    Ok(user.into_technician())
}

/// Signs init data fields the way Telegram does and returns the encoded
/// query string, `hash` included.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String, AuthError> {
    let mut owned: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut mac = HmacSha256::new_from_slice(&web_app_secret(bot_token)?)
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    mac.update(data_check_string(&mut owned).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &owned {
        query.append_pair(key, value);
    }
    query.append_pair("hash", &hash);
    Ok(query.finish())
}

fn web_app_secret(bot_token: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(WEB_APP_KEY).map_err(|e| AuthError::Signing(e.to_string()))?;
    mac.update(bot_token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn data_check_string(fields: &mut [(String, String)]) -> String {
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compares secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123:abc";

    fn signer() -> SessionSigner {
        SessionSigner::new(b"test-secret", Duration::hours(24))
    }

    fn init_data(auth_date: i64) -> String {
        sign_init_data(
            &[
                ("auth_date", &auth_date.to_string()),
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", r#"{"id":501,"first_name":"Bob","last_name":"Stone"}"#),
            ],
            TOKEN,
        )
        .unwrap()
    }

    #[test]
    fn test_session_token_round_trip() {
        let signer = signer();
        let issued = signer.issue(&TechnicianRef::new(501, "Bob")).unwrap();
        assert!(issued.expires_at > Utc::now());
        assert_eq!(signer.verify(&issued.token).unwrap(), TechnicianRef::new(501, "Bob"));
    }

    #[test]
    fn test_session_token_rejects_tampering_and_expiry() {
        let signer = signer();
        let issued = signer.issue(&TechnicianRef::new(501, "Bob")).unwrap();

        let other = SessionSigner::new(b"other-secret", Duration::hours(24));
        assert_eq!(other.verify(&issued.token), Err(AuthError::InvalidToken));
        assert_eq!(signer.verify("not-a-token"), Err(AuthError::InvalidToken));

        let old = signer
            .issue_at(&TechnicianRef::new(501, "Bob"), Utc::now() - Duration::days(2))
            .unwrap();
        assert_eq!(signer.verify(&old.token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_init_data_verifies() {
        let now = Utc::now();
        let technician = verify_init_data(&init_data(now.timestamp()), TOKEN, Duration::hours(1), now).unwrap();
        assert_eq!(technician, TechnicianRef::new(501, "Bob Stone"));
    }

    #[test]
    fn test_init_data_rejects_wrong_bot_and_edits() {
        let now = Utc::now();
        let data = init_data(now.timestamp());

        let err = verify_init_data(&data, "999:zzz", Duration::hours(1), now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidInitData(_)));

        let forged = data.replace("501", "777");
        let err = verify_init_data(&forged, TOKEN, Duration::hours(1), now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidInitData(_)));

        let unsigned = "auth_date=1&user=%7B%22id%22%3A501%7D";
        let err = verify_init_data(unsigned, TOKEN, Duration::hours(1), now).unwrap_err();
        assert_eq!(err, AuthError::InvalidInitData("missing hash".into()));
    }

    #[test]
    fn test_init_data_expires() {
        let now = Utc::now();
        let data = init_data((now - Duration::hours(2)).timestamp());
        assert_eq!(
            verify_init_data(&data, TOKEN, Duration::hours(1), now),
            Err(AuthError::StaleInitData)
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc", "abc123"));
    }
}
