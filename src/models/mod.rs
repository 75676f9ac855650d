pub mod artifact;
pub mod c_source;
pub mod interpreter;
pub mod settings;

// Re-export main types for convenient access
pub use artifact::{DeployableArtifact, ModelKind};
pub use interpreter::{ArtifactLoader, InferenceModel, TfliteLoader};
pub use settings::ModelSettings;
