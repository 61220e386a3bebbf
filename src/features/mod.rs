pub mod feature_utils;
pub mod trip_features;
