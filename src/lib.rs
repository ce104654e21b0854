//! AWS IAM Policy Component Library
//!
//! Declaratively manages a single IAM managed policy: creates it, pushes new
//! default versions when the document changes, recreates it on rename, and
//! deletes it on teardown. State is persisted between runs through a
//! [`StateStore`].

pub mod component;
pub mod config;
pub mod iam;
pub mod reconciler;
pub mod state;
pub mod types;

pub use component::PolicyComponent;
pub use iam::{
    AwsConnector, AwsIamClient, IamConnector, IamError, IamErrorKind, PolicyApi, ProviderContext,
};
pub use reconciler::{DeployAction, DeployOutcome, RemoveAction};
pub use state::{JsonFileStore, MemoryStore, StateError, StateStore};
pub use types::{PolicyDocument, PolicyError, PolicyInputs, PolicyOutputs, PolicyState};
