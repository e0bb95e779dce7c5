// Application layer - Use case interactors

pub mod breathing_interactor;
pub mod container;
pub mod experiment_interactor;
pub mod reference_interactor;

// Re-export interactors
pub use breathing_interactor::BreathingInteractor;
pub use experiment_interactor::{ExperimentInteractor, RunContext, RunSettings};
pub use reference_interactor::{Aggregate, ReferenceInteractor, ReferenceRequest};
