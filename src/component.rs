//! IAM Policy Component
//!
//! Ties state persistence, region resolution and the reconciler together:
//! load state, connect to IAM for the resolved region, run, save.
//!
//! ## Example Usage
//!
//! ```ignore
//! use aws_iam_policy::{AwsConnector, JsonFileStore, PolicyComponent, PolicyInputs, ProviderContext};
//!
//! let context = ProviderContext::default();
//! let mut component = PolicyComponent::new(
//!     JsonFileStore::new(".iam-policy/state.json"),
//!     AwsConnector::new(context.clone()),
//!     context,
//! );
//!
//! let outputs = component
//!     .deploy(PolicyInputs::new().name("read-buckets").policy(document))
//!     .await?;
//! println!("{}", outputs.arn);
//! ```

use tracing::{debug, info};

use crate::config::{self, Defaults};
use crate::iam::{IamConnector, PolicyApi, ProviderContext};
use crate::reconciler::{self, DeployAction, RemoveAction};
use crate::state::StateStore;
use crate::types::{PolicyError, PolicyInputs, PolicyOutputs, PolicyState};

/// One managed IAM policy and its persisted state
pub struct PolicyComponent<S, C> {
    store: S,
    connector: C,
    context: ProviderContext,
}

impl<S: StateStore, C: IamConnector> PolicyComponent<S, C> {
    pub fn new(store: S, connector: C, context: ProviderContext) -> Self {
        Self {
            store,
            connector,
            context,
        }
    }

    /// Create or update the policy to match `inputs`
    pub async fn deploy(&mut self, inputs: PolicyInputs) -> Result<PolicyOutputs, PolicyError> {
        info!("Deploying");

        let state = self.store.load().await?;
        let defaults = Defaults::new(self.context.region.as_deref());
        let resolved = config::resolve(&inputs, &state, &defaults)?;

        let api = self.connect(&resolved.region).await?;
        let outcome = reconciler::deploy(api.as_ref(), state, &resolved).await?;

        self.store.save(&outcome.state).await?;

        if outcome.action == DeployAction::Unchanged {
            debug!(arn = %outcome.outputs.arn, "Deploy made no remote changes");
        }

        Ok(outcome.outputs)
    }

    /// Delete the policy and clear state
    pub async fn remove(&mut self, inputs: PolicyInputs) -> Result<RemoveAction, PolicyError> {
        let state = self.store.load().await?;

        let action = if state.arn.is_none() && state.last_policy_arn.is_none() {
            debug!("No policy in state, nothing to remove");
            RemoveAction::Skipped
        } else {
            info!("Removing");

            let defaults = Defaults::new(self.context.region.as_deref());
            let region = config::resolve_region(&inputs, &defaults);
            let api = self.connect(&region).await?;

            let (_, action) = reconciler::remove(api.as_ref(), state).await?;
            action
        };

        self.store.save(&PolicyState::default()).await?;
        Ok(action)
    }

    /// Currently persisted state
    pub async fn state(&self) -> Result<PolicyState, PolicyError> {
        Ok(self.store.load().await?)
    }

    async fn connect(&self, region: &str) -> Result<Box<dyn PolicyApi>, PolicyError> {
        debug!(region = %region, "Connecting to IAM");

        self.connector
            .connect(region)
            .await
            .map_err(|e| PolicyError::Connect {
                region: region.to_string(),
                message: e.to_string(),
            })
    }
}
