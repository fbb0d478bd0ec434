//! Baby records: profile, vaccines, allergies, teeth, growth and feedings.

pub mod model;
pub mod stats;
mod service;

pub use model::{
    AllergyEntry, Baby, Breast, FeedingDetail, FeedingEvent, FeedingKind, Gender, GrowthRecord, NewAllergy, NewBaby,
    NewFeeding, NewGrowth, NewTooth, NewVaccine, ToothEntry, VaccineEntry,
};
pub use service::CareService;
pub use stats::{breast_feeding_stats, BreastFeedingStats};
