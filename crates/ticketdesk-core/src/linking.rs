//! Short-lived technician link codes.
//!
//! The dashboard issues a six-digit code, the technician sends `/link <code>`
//! to the technician bot, and the dashboard polls until the code is linked.
//! Polling needs the secret handed out with the code, so a guessed code
//! reveals nothing and cannot be claimed.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use ticketdesk_models::TechnicianRef;

use crate::auth::constant_time_eq;

/// Link code lifetime (5 minutes).
pub const CODE_TTL_SECS: i64 = 300;

/// State of a link code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Pending,
    Linked(TechnicianRef),
}

#[derive(Debug, Clone)]
struct Entry {
    state: LinkState,
    secret: String,
    expires_at: DateTime<Utc>,
}

/// A freshly issued code plus the secret needed to poll and claim it.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of redeeming a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Linked,
    AlreadyLinked,
    Expired,
    Unknown,
}

/// In-memory table of link codes with a fixed TTL.
pub struct ExpiringCodes {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for ExpiringCodes {
    fn default() -> Self {
        Self::new(Duration::seconds(CODE_TTL_SECS))
    }
}

impl ExpiringCodes {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issues a fresh pending code.
    pub fn issue(&self) -> IssuedCode {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut entries = self.entries();
        let mut rng = rand::thread_rng();
        let code = loop {
            let candidate = format!("{:06}", rng.gen_range(0..1_000_000u32));
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        let secret = format!("{:032x}", rng.gen::<u128>());
        entries.insert(
            code.clone(),
            Entry {
                state: LinkState::Pending,
                secret: secret.clone(),
                expires_at,
            },
        );
        debug!(code = %code, "Issued link code");
        IssuedCode {
            code,
            secret,
            expires_at,
        }
    }

    /// Current state of a code, or `None` if unknown, expired or polled
    /// with the wrong secret.
    pub fn status(&self, code: &str, secret: &str) -> Option<LinkState> {
        let now = Utc::now();
        self.entries()
            .get(code.trim())
            .filter(|e| e.expires_at > now && constant_time_eq(&e.secret, secret))
            .map(|e| e.state.clone())
    }

    /// Removes a linked code and returns its technician. Pending, expired
    /// and unknown codes, or a wrong secret, yield `None` and change nothing.
    pub fn claim(&self, code: &str, secret: &str) -> Option<TechnicianRef> {
        let now = Utc::now();
        let mut entries = self.entries();
        let code = code.trim();
        let technician = match entries.get(code) {
            Some(entry) if entry.expires_at > now && constant_time_eq(&entry.secret, secret) => {
                match &entry.state {
                    LinkState::Linked(technician) => technician.clone(),
                    LinkState::Pending => return None,
                }
            }
            _ => return None,
        };
        entries.remove(code);
        Some(technician)
    }

    /// Marks a pending code as linked to `technician`.
    pub fn redeem(&self, code: &str, technician: TechnicianRef) -> RedeemOutcome {
        let now = Utc::now();
        let mut entries = self.entries();
        match entries.get_mut(code.trim()) {
            None => RedeemOutcome::Unknown,
            Some(entry) if entry.expires_at <= now => RedeemOutcome::Expired,
            Some(entry) => match entry.state {
                LinkState::Linked(_) => RedeemOutcome::AlreadyLinked,
                LinkState::Pending => {
                    entry.state = LinkState::Linked(technician);
                    RedeemOutcome::Linked
                }
            },
        }
    }

    /// Removes expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
