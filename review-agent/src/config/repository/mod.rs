//! Repository layer for database operations

pub mod accounts;
pub mod analysis;
pub mod locations;
pub mod preferences;
pub mod reviews;
pub mod users;
