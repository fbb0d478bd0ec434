//! Document store for accounts, pending activations and babies.
//!
//! Each collection is a `BTreeMap` keyed by id behind one `RwLock`. Mutations
//! are serialized by a writer lock and applied to a copy of the collection:
//! uniqueness checks and the change they guard see the same copy, which makes
//! "check then insert" atomic for concurrent callers. When the store is opened
//! on a directory, the copy is written to `<dir>/<collection>.json` (tmp file
//! then rename) and only then swapped in, so a failed write changes nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::care::Baby;
use crate::error::{AppError, AppResult};
use crate::identity::{PendingActivation, Purpose, UserPatch, UserRecord};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserRecord>>;
    /// Fails with `DuplicateEmail` when another account already owns the email.
    async fn insert(&self, user: UserRecord) -> AppResult<()>;
    /// Apply `patch` and return the updated row. Email uniqueness is enforced.
    async fn update(&self, id: &str, patch: UserPatch, now: DateTime<Utc>) -> AppResult<UserRecord>;
    async fn delete(&self, id: &str) -> AppResult<bool>;
    async fn list(&self) -> AppResult<Vec<UserRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A live row for the same (email, purpose) won the race.
    Existing(PendingActivation),
}

#[async_trait]
pub trait ActivationStore: Send + Sync {
    async fn find_live(&self, email: &str, purpose: Purpose, now: DateTime<Utc>) -> AppResult<Option<PendingActivation>>;
    async fn find_by_token(&self, token: &str) -> AppResult<Option<PendingActivation>>;
    /// Insert unless a live row for (email, purpose) exists. Expired rows for the
    /// same pair are discarded first.
    async fn insert_unique(&self, row: PendingActivation, now: DateTime<Utc>) -> AppResult<InsertOutcome>;
    /// Swap `prev_id` for `row`. False when `prev_id` is already gone.
    async fn replace(&self, prev_id: &str, row: PendingActivation) -> AppResult<bool>;
    async fn delete(&self, id: &str) -> AppResult<bool>;
    async fn delete_expired_for_email(&self, email: &str, now: DateTime<Utc>) -> AppResult<usize>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

pub type BabyMutation = Box<dyn FnOnce(&mut Baby) -> AppResult<()> + Send>;

#[async_trait]
pub trait BabyStore: Send + Sync {
    async fn insert_baby(&self, baby: Baby) -> AppResult<()>;
    async fn find_baby(&self, id: &str) -> AppResult<Option<Baby>>;
    async fn list_babies(&self, owner_id: &str) -> AppResult<Vec<Baby>>;
    /// Run `f` on the stored baby; nothing is written if `f` fails.
    async fn modify_baby(&self, id: &str, f: BabyMutation) -> AppResult<Baby>;
    async fn delete_baby(&self, id: &str) -> AppResult<bool>;
    async fn delete_babies_for_owner(&self, owner_id: &str) -> AppResult<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection { Users, Activations, Babies }

impl Collection {
    fn file_name(&self) -> &'static str {
        match self {
            Collection::Users => "users.json",
            Collection::Activations => "activations.json",
            Collection::Babies => "babies.json",
        }
    }
}

#[derive(Default)]
struct Collections {
    users: BTreeMap<String, UserRecord>,
    activations: BTreeMap<String, PendingActivation>,
    babies: BTreeMap<String, Baby>,
}

fn users(c: &mut Collections) -> &mut BTreeMap<String, UserRecord> { &mut c.users }
fn activations(c: &mut Collections) -> &mut BTreeMap<String, PendingActivation> { &mut c.activations }
fn babies(c: &mut Collections) -> &mut BTreeMap<String, Baby> { &mut c.babies }

/// What a mutation did to its working copy.
enum Change<R> {
    Commit(R),
    Skip(R),
}

pub struct DocumentStore {
    inner: RwLock<Collections>,
    dir: Option<PathBuf>,
    /// Held for the whole of a mutation, file write included.
    writer: Mutex<()>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self { inner: RwLock::new(Collections::default()), dir: None, writer: Mutex::new(()) }
    }

    /// Open (or create) a store rooted at `dir`, loading any existing collections.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).with_context(|| format!("create data dir {}", dir.display()))?;
        let cols = Collections {
            users: read_collection(&dir.join(Collection::Users.file_name()))?,
            activations: read_collection(&dir.join(Collection::Activations.file_name()))?,
            babies: read_collection(&dir.join(Collection::Babies.file_name()))?,
        };
        info!(target: "startup", "document store at {:?}: users={}, activations={}, babies={}", dir, cols.users.len(), cols.activations.len(), cols.babies.len());
        Ok(Self { inner: RwLock::new(cols), dir: Some(dir), writer: Mutex::new(()) })
    }

    pub fn shared(self) -> Arc<Self> { Arc::new(self) }

    pub fn data_dir(&self) -> Option<&Path> { self.dir.as_deref() }

    /// Run `f` on a copy of one collection; persist the copy, then publish it.
    /// Readers keep seeing the previous state until the file write succeeded.
    fn mutate<T, R>(
        &self,
        which: Collection,
        table: fn(&mut Collections) -> &mut BTreeMap<String, T>,
        f: impl FnOnce(&mut BTreeMap<String, T>) -> AppResult<Change<R>>,
    ) -> AppResult<R>
    where
        T: Clone + Serialize,
    {
        let _writer = self.writer.lock();
        let mut next = table(&mut self.inner.write()).clone();
        let out = match f(&mut next)? {
            Change::Skip(out) => return Ok(out),
            Change::Commit(out) => out,
        };
        if let Some(dir) = self.dir.as_ref() {
            let bytes = serde_json::to_vec_pretty(&next)?;
            let path = dir.join(which.file_name());
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, &path)?;
            debug!(target: "storage", "flushed {}", which.file_name());
        }
        *table(&mut self.inner.write()) = next;
        Ok(out)
    }
}

fn read_collection<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<BTreeMap<String, T>> {
    if !path.exists() { return Ok(BTreeMap::new()); }
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let m = serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(m)
}

/// Keep the rows matching `keep`; commit only when something was dropped.
fn removed_count<T>(m: &mut BTreeMap<String, T>, mut keep: impl FnMut(&T) -> bool) -> Change<usize> {
    let before = m.len();
    m.retain(|_, v| keep(v));
    match before - m.len() {
        0 => Change::Skip(0),
        n => Change::Commit(n),
    }
}

fn email_taken(users: &BTreeMap<String, UserRecord>, email: &str, except_id: Option<&str>) -> bool {
    users.values().any(|u| u.email == email && Some(u.id.as_str()) != except_id)
}

#[async_trait]
impl AccountStore for DocumentStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.inner.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.inner.read().users.get(id).cloned())
    }

    async fn insert(&self, user: UserRecord) -> AppResult<()> {
        self.mutate(Collection::Users, users, |m| {
            if email_taken(m, &user.email, None) || m.contains_key(&user.id) {
                return Err(AppError::duplicate_email("An account with this email already exists"));
            }
            m.insert(user.id.clone(), user);
            Ok(Change::Commit(()))
        })
    }

    async fn update(&self, id: &str, patch: UserPatch, now: DateTime<Utc>) -> AppResult<UserRecord> {
        self.mutate(Collection::Users, users, |m| {
            if let Some(email) = patch.email.as_deref() {
                if email_taken(m, email, Some(id)) {
                    return Err(AppError::duplicate_email("An account with this email already exists"));
                }
            }
            let Some(u) = m.get_mut(id) else {
                return Err(AppError::not_found("user_not_found", "User not found"));
            };
            patch.apply(u, now);
            Ok(Change::Commit(u.clone()))
        })
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        self.mutate(Collection::Users, users, |m| {
            Ok(if m.remove(id).is_some() { Change::Commit(true) } else { Change::Skip(false) })
        })
    }

    async fn list(&self) -> AppResult<Vec<UserRecord>> {
        Ok(self.inner.read().users.values().cloned().collect())
    }
}

#[async_trait]
impl ActivationStore for DocumentStore {
    async fn find_live(&self, email: &str, purpose: Purpose, now: DateTime<Utc>) -> AppResult<Option<PendingActivation>> {
        Ok(self.inner.read().activations.values()
            .find(|a| a.email == email && a.purpose == purpose && a.is_live(now))
            .cloned())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<PendingActivation>> {
        Ok(self.inner.read().activations.values().find(|a| a.activation_token == token).cloned())
    }

    async fn insert_unique(&self, row: PendingActivation, now: DateTime<Utc>) -> AppResult<InsertOutcome> {
        self.mutate(Collection::Activations, activations, |m| {
            if let Some(existing) = m.values()
                .find(|a| a.email == row.email && a.purpose == row.purpose && a.is_live(now))
            {
                return Ok(Change::Skip(InsertOutcome::Existing(existing.clone())));
            }
            m.retain(|_, a| !(a.email == row.email && a.purpose == row.purpose));
            m.insert(row.id.clone(), row);
            Ok(Change::Commit(InsertOutcome::Inserted))
        })
    }

    async fn replace(&self, prev_id: &str, row: PendingActivation) -> AppResult<bool> {
        self.mutate(Collection::Activations, activations, |m| {
            if m.remove(prev_id).is_none() { return Ok(Change::Skip(false)); }
            m.insert(row.id.clone(), row);
            Ok(Change::Commit(true))
        })
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        self.mutate(Collection::Activations, activations, |m| {
            Ok(if m.remove(id).is_some() { Change::Commit(true) } else { Change::Skip(false) })
        })
    }

    async fn delete_expired_for_email(&self, email: &str, now: DateTime<Utc>) -> AppResult<usize> {
        self.mutate(Collection::Activations, activations, |m| {
            Ok(removed_count(m, |a| a.email != email || a.is_live(now)))
        })
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.mutate(Collection::Activations, activations, |m| {
            Ok(removed_count(m, |a| a.is_live(now)))
        })
    }
}

#[async_trait]
impl BabyStore for DocumentStore {
    async fn insert_baby(&self, baby: Baby) -> AppResult<()> {
        self.mutate(Collection::Babies, babies, |m| {
            m.insert(baby.id.clone(), baby);
            Ok(Change::Commit(()))
        })
    }

    async fn find_baby(&self, id: &str) -> AppResult<Option<Baby>> {
        Ok(self.inner.read().babies.get(id).cloned())
    }

    async fn list_babies(&self, owner_id: &str) -> AppResult<Vec<Baby>> {
        let mut out: Vec<Baby> = self.inner.read().babies.values().filter(|b| b.owner_id == owner_id).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn modify_baby(&self, id: &str, f: BabyMutation) -> AppResult<Baby> {
        self.mutate(Collection::Babies, babies, |m| {
            let Some(baby) = m.get_mut(id) else {
                return Err(AppError::not_found("baby_not_found", "Baby not found"));
            };
            f(baby)?;
            Ok(Change::Commit(baby.clone()))
        })
    }

    async fn delete_baby(&self, id: &str) -> AppResult<bool> {
        self.mutate(Collection::Babies, babies, |m| {
            Ok(if m.remove(id).is_some() { Change::Commit(true) } else { Change::Skip(false) })
        })
    }

    async fn delete_babies_for_owner(&self, owner_id: &str) -> AppResult<usize> {
        self.mutate(Collection::Babies, babies, |m| {
            Ok(removed_count(m, |b| b.owner_id != owner_id))
        })
    }
}
