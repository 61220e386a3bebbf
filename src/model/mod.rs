pub mod backends;
pub mod loader;
pub mod model_manager;
pub mod model_utils;
