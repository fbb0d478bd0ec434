use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender { Male, Female }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breast { Left, Right }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineEntry {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyEntry {
    pub id: String,
    pub name: String,
    pub discovery_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToothEntry {
    pub id: String,
    pub tooth_id: String,
    pub name: String,
    pub tooth_type: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRecord {
    pub id: String,
    pub date: NaiveDate,
    /// kg
    pub weight: f64,
    /// cm
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// What was fed. The `kind` tag selects the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FeedingDetail {
    BreastMilk { duration_minutes: u32, breast: Breast },
    Formula {
        amount_ml: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        brand: Option<String>,
    },
    SolidFood {
        food_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount_grams: Option<f64>,
    },
    Water { amount_ml: f64 },
    Snack {
        snack_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
    },
    Supplement {
        supplement_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
    },
}

impl FeedingDetail {
    pub fn kind(&self) -> FeedingKind {
        match self {
            FeedingDetail::BreastMilk { .. } => FeedingKind::BreastMilk,
            FeedingDetail::Formula { .. } => FeedingKind::Formula,
            FeedingDetail::SolidFood { .. } => FeedingKind::SolidFood,
            FeedingDetail::Water { .. } => FeedingKind::Water,
            FeedingDetail::Snack { .. } => FeedingKind::Snack,
            FeedingDetail::Supplement { .. } => FeedingKind::Supplement,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let bad = |msg: &str| Err(AppError::user("invalid_feeding".to_string(), msg.to_string()));
        match self {
            FeedingDetail::BreastMilk { duration_minutes, .. } if *duration_minutes == 0 => bad("Duration must be positive"),
            FeedingDetail::Formula { amount_ml, .. } | FeedingDetail::Water { amount_ml } if !(*amount_ml > 0.0) => bad("Amount must be positive"),
            FeedingDetail::SolidFood { food_type: t, amount_grams: a }
            | FeedingDetail::Snack { snack_type: t, amount: a }
            | FeedingDetail::Supplement { supplement_type: t, amount: a } => {
                if t.trim().is_empty() { return bad("Type must not be empty"); }
                if a.map(|v| v < 0.0 || v.is_nan()).unwrap_or(false) { return bad("Amount must not be negative"); }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedingKind { BreastMilk, Formula, SolidFood, Water, Snack, Supplement }

impl std::str::FromStr for FeedingKind {
    type Err = AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "breast_milk" => Ok(FeedingKind::BreastMilk),
            "formula" => Ok(FeedingKind::Formula),
            "solid_food" => Ok(FeedingKind::SolidFood),
            "water" => Ok(FeedingKind::Water),
            "snack" => Ok(FeedingKind::Snack),
            "supplement" => Ok(FeedingKind::Supplement),
            other => Err(AppError::user("invalid_feeding_kind".to_string(), format!("unknown feeding kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedingEvent {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub detail: FeedingDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baby {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub birth_weight: f64,
    pub birth_height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub vaccines: Vec<VaccineEntry>,
    #[serde(default)]
    pub allergies: Vec<AllergyEntry>,
    #[serde(default)]
    pub teeth: Vec<ToothEntry>,
    #[serde(default)]
    pub growth: Vec<GrowthRecord>,
    #[serde(default)]
    pub feedings: Vec<FeedingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request payloads.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBaby {
    pub name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub birth_weight: f64,
    pub birth_height: f64,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVaccine {
    pub name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAllergy {
    pub name: String,
    pub discovery_date: NaiveDate,
    #[serde(default)]
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTooth {
    pub tooth_id: String,
    pub name: String,
    pub tooth_type: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGrowth {
    pub date: NaiveDate,
    pub weight: f64,
    pub height: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeeding {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub detail: FeedingDetail,
}
