//! Domain layer for the padlink binary.

pub mod profile;

pub use profile::{Profile, ProfileError};
