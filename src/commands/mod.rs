pub mod predict;
pub mod status;
