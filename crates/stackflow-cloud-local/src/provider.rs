//! Sandbox provider implementation
//!
//! Keeps "live" resources in `.stackflow/sandbox.json` so a declaration can
//! be planned, applied and destroyed without touching a real control plane.
//! Freshly created IAM roles are hidden from the next few calls that
//! reference their ARN, the way a real control plane propagates them.

use crate::catalog::{attributes_for, mentions};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_cloud::{Attributes, CreatedResource, ProviderError, ResourceProvider};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Sandbox file name inside the project's `.stackflow` directory
pub const SANDBOX_FILE: &str = "sandbox.json";

pub const DEFAULT_REGION: &str = "ap-northeast-1";

/// Calls a new IAM role stays invisible to
pub const DEFAULT_PROPAGATION_CALLS: u32 = 1;

/// One resource living in the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxResource {
    pub kind: String,
    pub desired: Value,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SandboxState {
    /// Last issued sequence number per kind
    #[serde(default)]
    sequences: BTreeMap<String, u64>,
    #[serde(default)]
    resources: BTreeMap<String, SandboxResource>,
    /// ARN → calls it is still invisible to
    #[serde(default)]
    propagating: BTreeMap<String, u32>,
}

/// Local provider backed by a JSON file
pub struct SandboxProvider {
    path: Option<PathBuf>,
    region: String,
    propagation_calls: u32,
    state: Mutex<SandboxState>,
}

impl SandboxProvider {
    /// Open (or start) the sandbox under `<project_root>/.stackflow/`
    pub async fn open(project_root: impl AsRef<Path>) -> Result<Self> {
        let path = project_root
            .as_ref()
            .join(stackflow_cloud::state::STATE_DIR)
            .join(SANDBOX_FILE);
        let state = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            SandboxState::default()
        };
        debug!(path = %path.display(), "Opened sandbox");
        Ok(Self {
            path: Some(path),
            region: DEFAULT_REGION.to_string(),
            propagation_calls: DEFAULT_PROPAGATION_CALLS,
            state: Mutex::new(state),
        })
    }

    /// Sandbox that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            region: DEFAULT_REGION.to_string(),
            propagation_calls: DEFAULT_PROPAGATION_CALLS,
            state: Mutex::new(SandboxState::default()),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Number of calls referencing a new IAM role's ARN that fail with
    /// "not yet visible" (0 disables the simulation)
    pub fn with_propagation_calls(mut self, calls: u32) -> Self {
        self.propagation_calls = calls;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn resource(&self, identity: &str) -> Option<SandboxResource> {
        self.state.lock().await.resources.get(identity).cloned()
    }

    /// All live resources keyed by identity
    pub async fn resources(&self) -> BTreeMap<String, SandboxResource> {
        self.state.lock().await.resources.clone()
    }

    async fn persist(&self, state: &SandboxState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent()
            && !dir.exists()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let content = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Refuse a call whose payload references a role that has not
    /// propagated yet, consuming one unit of its invisibility
    fn check_visibility(
        state: &mut SandboxState,
        desired: &Value,
    ) -> std::result::Result<(), ProviderError> {
        let hidden = state
            .propagating
            .iter_mut()
            .find(|(arn, remaining)| **remaining > 0 && mentions(desired, arn));
        if let Some((arn, remaining)) = hidden {
            *remaining -= 1;
            let message = format!("role {} cannot be assumed yet", arn);
            state.propagating.retain(|_, remaining| *remaining > 0);
            return Err(ProviderError::not_yet_visible(message));
        }
        Ok(())
    }

    fn next_identity(state: &mut SandboxState, kind: &str) -> String {
        let sequence = state.sequences.entry(kind.to_string()).or_insert(0);
        *sequence += 1;
        format!("{}-{}", kind, sequence)
    }
}

fn validate_desired(kind: &str, desired: &Value) -> Result<()> {
    if !desired.is_object() {
        return Err(SandboxError::InvalidDesiredState {
            kind: kind.to_string(),
            reason: "payload must be an object".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ResourceProvider for SandboxProvider {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn create(&self, kind: &str, desired: &Value) -> std::result::Result<CreatedResource, ProviderError> {
        validate_desired(kind, desired)?;
        let mut state = self.state.lock().await;
        let visible = Self::check_visibility(&mut state, desired);
        if visible.is_err() {
            self.persist(&state).await?;
        }
        visible?;

        let identity = Self::next_identity(&mut state, kind);
        let attributes = attributes_for(kind, &identity, desired, &self.region);
        let now = Utc::now();

        if kind == "iam-role"
            && self.propagation_calls > 0
            && let Some(Value::String(arn)) = attributes.get("arn")
        {
            state.propagating.insert(arn.clone(), self.propagation_calls);
        }
        state.resources.insert(
            identity.clone(),
            SandboxResource {
                kind: kind.to_string(),
                desired: desired.clone(),
                attributes: attributes.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        self.persist(&state).await?;

        info!(kind = %kind, identity = %identity, "Created sandbox resource");
        Ok(CreatedResource {
            identity,
            attributes,
        })
    }

    async fn update(
        &self,
        identity: &str,
        kind: &str,
        desired: &Value,
    ) -> std::result::Result<Attributes, ProviderError> {
        validate_desired(kind, desired)?;
        let mut state = self.state.lock().await;
        let visible = Self::check_visibility(&mut state, desired);
        if visible.is_err() {
            self.persist(&state).await?;
        }
        visible?;

        let region = self.region.clone();
        let resource = state
            .resources
            .get_mut(identity)
            .ok_or_else(|| SandboxError::ResourceNotFound(identity.to_string()))?;
        if resource.kind != kind {
            return Err(SandboxError::KindMismatch {
                identity: identity.to_string(),
                recorded: resource.kind.clone(),
                requested: kind.to_string(),
            }
            .into());
        }
        resource.desired = desired.clone();
        resource.attributes = attributes_for(kind, identity, desired, &region);
        resource.updated_at = Utc::now();
        let attributes = resource.attributes.clone();
        self.persist(&state).await?;

        info!(kind = %kind, identity = %identity, "Updated sandbox resource");
        Ok(attributes)
    }

    async fn delete(&self, identity: &str, kind: &str) -> std::result::Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        match state.resources.remove(identity) {
            Some(resource) => {
                if let Some(Value::String(arn)) = resource.attributes.get("arn") {
                    state.propagating.remove(arn);
                }
                self.persist(&state).await?;
                info!(kind = %kind, identity = %identity, "Deleted sandbox resource");
            }
            None => {
                debug!(identity = %identity, "Resource already absent");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackflow_cloud::TransientReason;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_issues_sequential_identities() {
        let provider = SandboxProvider::in_memory();
        let first = provider.create("vpc", &json!({})).await.unwrap();
        let second = provider.create("vpc", &json!({})).await.unwrap();
        let bucket = provider.create("s3-bucket", &json!({})).await.unwrap();

        assert_eq!(first.identity, "vpc-1");
        assert_eq!(second.identity, "vpc-2");
        assert_eq!(bucket.identity, "s3-bucket-1");
        assert_eq!(first.attributes["vpc_id"], json!("vpc-1"));
    }

    #[tokio::test]
    async fn test_new_role_is_invisible_to_next_call() {
        let provider = SandboxProvider::in_memory();
        let role = provider
            .create("iam-role", &json!({"name": "ecr-access"}))
            .await
            .unwrap();
        let arn = role.attributes["arn"].clone();
        let payload = json!({"access_role_arn": arn});

        let err = provider.create("apprunner-service", &payload).await.unwrap_err();
        assert_eq!(err.transient_reason(), Some(TransientReason::NotYetVisible));

        let service = provider.create("apprunner-service", &payload).await.unwrap();
        assert_eq!(service.identity, "apprunner-service-1");

        // unrelated calls are never delayed
        provider.create("s3-bucket", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_propagation_can_be_disabled() {
        let provider = SandboxProvider::in_memory().with_propagation_calls(0);
        let role = provider.create("iam-role", &json!({})).await.unwrap();
        let payload = json!({"role": role.attributes["arn"]});
        assert!(provider.create("apprunner-service", &payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let provider = SandboxProvider::in_memory();
        let bucket = provider
            .create("s3-bucket", &json!({"bucket_name": "old"}))
            .await
            .unwrap();

        let attributes = provider
            .update(&bucket.identity, "s3-bucket", &json!({"bucket_name": "new"}))
            .await
            .unwrap();
        assert_eq!(attributes["bucket"], json!("new"));

        let err = provider
            .update(&bucket.identity, "vpc", &json!({}))
            .await
            .unwrap_err();
        assert!(!err.is_transient());

        provider.delete(&bucket.identity, "s3-bucket").await.unwrap();
        assert!(provider.resource(&bucket.identity).await.is_none());
        // deleting again is fine
        provider.delete(&bucket.identity, "s3-bucket").await.unwrap();

        let err = provider
            .update(&bucket.identity, "s3-bucket", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        {
            let provider = SandboxProvider::open(temp_dir.path()).await.unwrap();
            provider.create("vpc", &json!({})).await.unwrap();
        }
        assert!(temp_dir.path().join(".stackflow").join(SANDBOX_FILE).exists());

        let provider = SandboxProvider::open(temp_dir.path()).await.unwrap();
        assert!(provider.resource("vpc-1").await.is_some());
        // sequences continue where they left off
        let next = provider.create("vpc", &json!({})).await.unwrap();
        assert_eq!(next.identity, "vpc-2");
    }

    #[tokio::test]
    async fn test_non_object_payload_is_rejected() {
        let provider = SandboxProvider::in_memory();
        let err = provider.create("vpc", &json!([1, 2])).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
