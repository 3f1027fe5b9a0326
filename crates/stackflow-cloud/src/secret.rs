//! Secret sources
//!
//! Secret references look like `scheme://path`. `env://NAME` reads an
//! environment variable, `op://Vault/Item/Field` reads from 1Password via the
//! `op` CLI. Resolved values are wrapped in [`SecretValue`], which never prints
//! its content.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Reference to a secret, e.g. `env://DB_PASSWORD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scheme part (`env`, `op`, ...)
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Part after `scheme://`
    pub fn path(&self) -> &str {
        self.0
            .split_once("://")
            .map(|(_, path)| path)
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved secret plaintext
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue>;
}

/// Reads `env://NAME` from the process environment
#[derive(Debug, Default, Clone)]
pub struct EnvSecretSource;

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue> {
        let name = reference.path();
        std::env::var(name).map(SecretValue::new).map_err(|_| {
            CloudError::SecretError(format!("environment variable {} is not set", name))
        })
    }
}

/// Reads `op://Vault/Item/Field` through the 1Password CLI
#[derive(Debug, Default, Clone)]
pub struct OnePasswordSecretSource {
    account: Option<String>,
}

impl OnePasswordSecretSource {
    pub fn new(account: Option<String>) -> Self {
        Self { account }
    }

    /// Uses `OP_ACCOUNT` when set
    pub fn from_env() -> Self {
        Self::new(std::env::var("OP_ACCOUNT").ok())
    }
}

#[async_trait]
impl SecretSource for OnePasswordSecretSource {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue> {
        if reference.scheme() != Some("op") {
            return Err(CloudError::SecretError(format!(
                "invalid 1Password reference: {} (must start with op://)",
                reference
            )));
        }

        debug!(reference = %reference, "Resolving 1Password reference");

        let mut cmd = Command::new("op");
        cmd.arg("read").arg(reference.as_str());
        if let Some(account) = &self.account {
            cmd.arg("--account").arg(account);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| CloudError::CommandFailed(format!("failed to run op: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let hint = if stderr.contains("not signed in") || stderr.contains("session expired") {
                " (run `op signin` or set OP_SERVICE_ACCOUNT_TOKEN)"
            } else if stderr.contains("multiple accounts") {
                " (set OP_ACCOUNT)"
            } else {
                ""
            };
            return Err(CloudError::SecretError(format!(
                "failed to resolve {}: {}{}",
                reference,
                stderr.trim(),
                hint
            )));
        }

        Ok(SecretValue::new(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }
}

/// Fixed reference → value map
#[derive(Debug, Default, Clone)]
pub struct StaticSecretSource {
    values: HashMap<String, String>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(reference.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue> {
        self.values
            .get(reference.as_str())
            .map(SecretValue::new)
            .ok_or_else(|| CloudError::SecretError(format!("unknown secret {}", reference)))
    }
}

/// Dispatches references to a source by scheme
#[derive(Default, Clone)]
pub struct SecretRouter {
    sources: BTreeMap<String, Arc<dyn SecretSource>>,
}

impl SecretRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `env://` and `op://`
    pub fn standard() -> Self {
        Self::new()
            .with_source("env", Arc::new(EnvSecretSource))
            .with_source("op", Arc::new(OnePasswordSecretSource::from_env()))
    }

    pub fn with_source(mut self, scheme: impl Into<String>, source: Arc<dyn SecretSource>) -> Self {
        self.sources.insert(scheme.into(), source);
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

#[async_trait]
impl SecretSource for SecretRouter {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue> {
        let scheme = reference.scheme().ok_or_else(|| {
            CloudError::SecretError(format!("secret reference {} has no scheme", reference))
        })?;
        let source = self.sources.get(scheme).ok_or_else(|| {
            CloudError::SecretError(format!("no secret source for scheme {}://", scheme))
        })?;
        source.resolve(reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_ref_parts() {
        let r = SecretRef::new("op://Vault/database/password");
        assert_eq!(r.scheme(), Some("op"));
        assert_eq!(r.path(), "Vault/database/password");

        let bare = SecretRef::new("password");
        assert_eq!(bare.scheme(), None);
    }

    #[test]
    fn test_secret_value_is_redacted() {
        let value = SecretValue::new("hunter2");
        assert_eq!(format!("{:?}", value), "SecretValue(***)");
        assert_eq!(value.expose(), "hunter2");
    }

    #[test]
    fn test_env_source() {
        temp_env::with_var("STACKFLOW_TEST_DB_PASSWORD", Some("s3cret"), || {
            let value = tokio_test::block_on(
                EnvSecretSource.resolve(&SecretRef::new("env://STACKFLOW_TEST_DB_PASSWORD")),
            )
            .unwrap();
            assert_eq!(value.expose(), "s3cret");
        });

        temp_env::with_var_unset("STACKFLOW_TEST_DB_PASSWORD", || {
            let err = tokio_test::block_on(
                EnvSecretSource.resolve(&SecretRef::new("env://STACKFLOW_TEST_DB_PASSWORD")),
            )
            .unwrap_err();
            assert!(err.to_string().contains("STACKFLOW_TEST_DB_PASSWORD"));
        });
    }

    #[tokio::test]
    async fn test_router_dispatches_by_scheme() {
        let router = SecretRouter::new().with_source(
            "vault",
            Arc::new(StaticSecretSource::new().with_secret("vault://db/user", "admin")),
        );

        let value = router.resolve(&SecretRef::new("vault://db/user")).await.unwrap();
        assert_eq!(value.expose(), "admin");

        assert!(router.resolve(&SecretRef::new("env://X")).await.is_err());
        assert!(router.resolve(&SecretRef::new("plain")).await.is_err());
    }

    #[tokio::test]
    async fn test_onepassword_rejects_other_schemes() {
        let err = OnePasswordSecretSource::new(None)
            .resolve(&SecretRef::new("env://X"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("op://"));
    }
}
