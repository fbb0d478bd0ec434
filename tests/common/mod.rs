//! Shared fixtures for the integration suites: a fully wired `AppState` over an
//! in-memory document store, an in-process cache, a manual clock and a
//! capturing mailer.
#![allow(dead_code)]

use std::sync::Arc;

use babytrack::clock::{ManualClock, SharedClock};
use babytrack::config::Config;
use babytrack::identity::UserRecord;
use babytrack::mail::{MemoryMailer, SharedMailer};
use babytrack::server::AppState;
use babytrack::storage::{DocumentStore, KvStore, SharedCache};

pub const ACCESS_TTL_SECS: i64 = 600;
pub const REFRESH_TTL_SECS: i64 = 3600;

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<MemoryMailer>,
    pub cache: KvStore,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let overrides: Vec<(String, String)> = overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(move |key| {
        if let Some((_, v)) = overrides.iter().find(|(k, _)| k == key) {
            return Some(v.clone());
        }
        match key {
            "ACCESS_TOKEN_SECRET" => Some("test-access-secret".to_string()),
            "REFRESH_TOKEN_SECRET" => Some("test-refresh-secret".to_string()),
            "ACTIVATION_SECRET" => Some("test-activation-secret".to_string()),
            "ACCESS_TOKEN_TTL_SECS" => Some(ACCESS_TTL_SECS.to_string()),
            "REFRESH_TOKEN_TTL_SECS" => Some(REFRESH_TTL_SECS.to_string()),
            _ => None,
        }
    })
    .expect("test config")
}

pub fn harness() -> Harness {
    harness_with(&[])
}

pub fn harness_with(overrides: &[(&str, &str)]) -> Harness {
    let config = test_config(overrides);
    let clock = Arc::new(ManualClock::starting_now());
    let shared_clock: SharedClock = clock.clone();
    let mailer = Arc::new(MemoryMailer::new());
    let shared_mailer: SharedMailer = mailer.clone();
    let cache = KvStore::new(shared_clock.clone());
    let shared_cache: SharedCache = Arc::new(cache.clone());
    let documents = DocumentStore::in_memory().shared();
    let state = AppState::assemble(config, shared_clock, shared_mailer, documents, shared_cache, Some(cache.clone()));
    Harness { state, clock, mailer, cache }
}

/// The 4-digit code from the most recent mail to `to`.
pub fn code_for(mailer: &MemoryMailer, to: &str) -> String {
    let mail = mailer.last_to(to).unwrap_or_else(|| panic!("no mail sent to {}", to));
    let marker = "Your verification code is: ";
    let start = mail.body.find(marker).expect("code marker in body") + marker.len();
    mail.body[start..start + 4].to_string()
}

impl Harness {
    /// Register and activate an account, returning the stored row.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> UserRecord {
        let ticket = self.state.activation.request_registration(name, email, password, None).await.expect("registration");
        let code = code_for(&self.mailer, email);
        self.state.activation.activate_registration(&ticket.activation_token, &code).await.expect("activation")
    }
}
