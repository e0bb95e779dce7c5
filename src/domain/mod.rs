// Domain layer - Core tuning logic

pub mod errors;
pub mod model;
pub mod rules;
