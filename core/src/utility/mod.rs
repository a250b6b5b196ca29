//! Local (non-provider) finalization utilities.

pub mod compliance;
pub mod json;
pub mod structured_data;

pub use compliance::{ComplianceCheck, ComplianceReport};
