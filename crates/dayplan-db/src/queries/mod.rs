pub mod plans;
pub mod preferences;
