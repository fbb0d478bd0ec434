use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::storage::BabyStore;

use super::model::*;
use super::stats::{breast_feeding_stats, BreastFeedingStats};

fn new_id() -> String { Uuid::new_v4().to_string() }

fn required(field: &str, value: &str) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::user("missing_field".to_string(), format!("{} is required", field)));
    }
    Ok(v.to_string())
}

fn positive(field: &str, value: f64) -> AppResult<f64> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(AppError::user("invalid_measurement".to_string(), format!("{} must be a positive number", field)));
    }
    Ok(value)
}

fn entry_missing(what: &str) -> AppError {
    AppError::not_found("entry_not_found".to_string(), format!("{} not found", what))
}

/// Babies and their records. Every call is scoped to the authenticated owner.
pub struct CareService {
    babies: Arc<dyn BabyStore>,
    clock: SharedClock,
}

impl CareService {
    pub fn new(babies: Arc<dyn BabyStore>, clock: SharedClock) -> Self { Self { babies, clock } }

    pub async fn create_baby(&self, owner: &Identity, input: NewBaby) -> AppResult<Baby> {
        let now = self.clock.now();
        let baby = Baby {
            id: new_id(),
            owner_id: owner.id.clone(),
            name: required("name", &input.name)?,
            gender: input.gender,
            birth_date: input.birth_date,
            birth_weight: positive("birthWeight", input.birth_weight)?,
            birth_height: positive("birthHeight", input.birth_height)?,
            photo: input.photo.filter(|p| !p.trim().is_empty()),
            vaccines: Vec::new(),
            allergies: Vec::new(),
            teeth: Vec::new(),
            growth: Vec::new(),
            feedings: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.babies.insert_baby(baby.clone()).await?;
        info!(target: "care", "baby {} created for {}", baby.id, owner.id);
        Ok(baby)
    }

    pub async fn list_babies(&self, owner: &Identity) -> AppResult<Vec<Baby>> {
        self.babies.list_babies(&owner.id).await
    }

    pub async fn get_baby(&self, owner: &Identity, baby_id: &str) -> AppResult<Baby> {
        let Some(baby) = self.babies.find_baby(baby_id).await? else {
            return Err(AppError::not_found("baby_not_found", "Baby not found"));
        };
        if baby.owner_id != owner.id {
            return Err(AppError::forbidden("You do not have access to this baby"));
        }
        Ok(baby)
    }

    pub async fn delete_baby(&self, owner: &Identity, baby_id: &str) -> AppResult<()> {
        self.get_baby(owner, baby_id).await?;
        if !self.babies.delete_baby(baby_id).await? {
            return Err(AppError::not_found("baby_not_found", "Baby not found"));
        }
        info!(target: "care", "baby {} deleted by {}", baby_id, owner.id);
        Ok(())
    }

    /// Ownership check, then a mutation stamped with `updated_at`.
    async fn modify<F>(&self, owner: &Identity, baby_id: &str, f: F) -> AppResult<Baby>
    where
        F: FnOnce(&mut Baby) -> AppResult<()> + Send + 'static,
    {
        self.get_baby(owner, baby_id).await?;
        let now = self.clock.now();
        self.babies.modify_baby(baby_id, Box::new(move |b: &mut Baby| {
            f(b)?;
            b.updated_at = now;
            Ok(())
        })).await
    }

    pub async fn add_vaccine(&self, owner: &Identity, baby_id: &str, input: NewVaccine) -> AppResult<VaccineEntry> {
        let entry = VaccineEntry { id: new_id(), name: required("name", &input.name)?, date: input.date, notes: input.notes };
        let e = entry.clone();
        self.modify(owner, baby_id, move |b| { b.vaccines.push(e); Ok(()) }).await?;
        Ok(entry)
    }

    pub async fn remove_vaccine(&self, owner: &Identity, baby_id: &str, entry_id: &str) -> AppResult<()> {
        let id = entry_id.to_string();
        self.modify(owner, baby_id, move |b| remove_by_id(&mut b.vaccines, &id, |v| &v.id, "Vaccine")).await?;
        Ok(())
    }

    pub async fn add_allergy(&self, owner: &Identity, baby_id: &str, input: NewAllergy) -> AppResult<AllergyEntry> {
        let entry = AllergyEntry {
            id: new_id(),
            name: required("name", &input.name)?,
            discovery_date: input.discovery_date,
            symptoms: input.symptoms,
        };
        let e = entry.clone();
        self.modify(owner, baby_id, move |b| { b.allergies.push(e); Ok(()) }).await?;
        Ok(entry)
    }

    pub async fn remove_allergy(&self, owner: &Identity, baby_id: &str, entry_id: &str) -> AppResult<()> {
        let id = entry_id.to_string();
        self.modify(owner, baby_id, move |b| remove_by_id(&mut b.allergies, &id, |v| &v.id, "Allergy")).await?;
        Ok(())
    }

    pub async fn add_tooth(&self, owner: &Identity, baby_id: &str, input: NewTooth) -> AppResult<ToothEntry> {
        let entry = ToothEntry {
            id: new_id(),
            tooth_id: required("toothId", &input.tooth_id)?,
            name: required("name", &input.name)?,
            tooth_type: required("toothType", &input.tooth_type)?,
            date: input.date,
        };
        let e = entry.clone();
        self.modify(owner, baby_id, move |b| {
            if b.teeth.iter().any(|t| t.tooth_id == e.tooth_id) {
                return Err(AppError::user("duplicate_tooth".to_string(), format!("Tooth {} is already recorded", e.tooth_id)));
            }
            b.teeth.push(e);
            Ok(())
        }).await?;
        Ok(entry)
    }

    pub async fn remove_tooth(&self, owner: &Identity, baby_id: &str, entry_id: &str) -> AppResult<()> {
        let id = entry_id.to_string();
        self.modify(owner, baby_id, move |b| remove_by_id(&mut b.teeth, &id, |v| &v.id, "Tooth")).await?;
        Ok(())
    }

    pub async fn add_growth(&self, owner: &Identity, baby_id: &str, input: NewGrowth) -> AppResult<GrowthRecord> {
        let record = GrowthRecord {
            id: new_id(),
            date: input.date,
            weight: positive("weight", input.weight)?,
            height: positive("height", input.height)?,
            notes: input.notes,
        };
        let r = record.clone();
        self.modify(owner, baby_id, move |b| { b.growth.push(r); Ok(()) }).await?;
        Ok(record)
    }

    /// Growth records in chronological order.
    pub async fn list_growth(&self, owner: &Identity, baby_id: &str) -> AppResult<Vec<GrowthRecord>> {
        let mut records = self.get_baby(owner, baby_id).await?.growth;
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    pub async fn remove_growth(&self, owner: &Identity, baby_id: &str, record_id: &str) -> AppResult<()> {
        let id = record_id.to_string();
        self.modify(owner, baby_id, move |b| remove_by_id(&mut b.growth, &id, |v| &v.id, "Growth record")).await?;
        Ok(())
    }

    pub async fn add_feeding(&self, owner: &Identity, baby_id: &str, input: NewFeeding) -> AppResult<FeedingEvent> {
        input.detail.validate()?;
        let event = FeedingEvent { id: new_id(), start_time: input.start_time, notes: input.notes, detail: input.detail };
        let e = event.clone();
        self.modify(owner, baby_id, move |b| { b.feedings.push(e); Ok(()) }).await?;
        Ok(event)
    }

    /// Feedings newest first, optionally restricted to one kind.
    pub async fn list_feedings(&self, owner: &Identity, baby_id: &str, kind: Option<FeedingKind>) -> AppResult<Vec<FeedingEvent>> {
        let mut feedings: Vec<FeedingEvent> = self.get_baby(owner, baby_id).await?.feedings
            .into_iter()
            .filter(|f| kind.map(|k| f.detail.kind() == k).unwrap_or(true))
            .collect();
        feedings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(feedings)
    }

    pub async fn remove_feeding(&self, owner: &Identity, baby_id: &str, feeding_id: &str) -> AppResult<()> {
        let id = feeding_id.to_string();
        self.modify(owner, baby_id, move |b| remove_by_id(&mut b.feedings, &id, |v| &v.id, "Feeding")).await?;
        Ok(())
    }

    pub async fn breast_milk_stats(&self, owner: &Identity, baby_id: &str) -> AppResult<BreastFeedingStats> {
        let baby = self.get_baby(owner, baby_id).await?;
        Ok(breast_feeding_stats(&baby.feedings))
    }
}

fn remove_by_id<T>(items: &mut Vec<T>, id: &str, key: impl Fn(&T) -> &String, what: &str) -> AppResult<()> {
    let before = items.len();
    items.retain(|it| key(it) != id);
    if items.len() == before { return Err(entry_missing(what)); }
    Ok(())
}
