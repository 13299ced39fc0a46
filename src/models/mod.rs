pub mod prediction_types;
pub mod status_types;
