//!
//! babytrack storage module
//! ------------------------
//! Two kinds of state live here:
//! - the credential cache (`kv`), a TTL key-value store holding one serialized
//!   session per user; in-process by default, Redis behind the `redis` feature;
//! - the document store (`documents`), the durable home of accounts, pending
//!   activations and baby records, kept in memory and flushed to one JSON file
//!   per collection under the data directory after every mutation.
//!
//! Services only see the traits (`CredentialCache`, `AccountStore`,
//! `ActivationStore`, `BabyStore`), so backends can be swapped in `AppState`.

pub mod kv;
pub mod documents;
#[cfg(feature = "redis")]
pub mod redis_cache;

pub use kv::{CredentialCache, KvStore, SharedCache};
pub use documents::{AccountStore, ActivationStore, BabyStore, BabyMutation, DocumentStore, InsertOutcome};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
