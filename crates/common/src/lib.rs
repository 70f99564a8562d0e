//! Shared types for the Filevine connector workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
