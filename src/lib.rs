//! babytrack: infant care tracking backend.
//!
//! Accounts are created through an emailed-code activation workflow; logins get
//! an access/refresh credential pair whose validity is tied to a session in the
//! credential cache. Care records (babies, feedings, growth, vaccines,
//! allergies, teeth) hang off the authenticated owner.

pub mod clock;
pub mod config;
pub mod error;
pub mod security;
pub mod mail;
pub mod storage;
pub mod identity;
pub mod care;
pub mod server;
