pub mod frame_decoder;
pub mod gate;
pub mod model_manager;
pub mod prediction_service;
pub mod predictor;
pub mod preprocessor;
