//! StackFlow Cloud
//!
//! Provider-facing half of StackFlow: the contract a resource provider
//! implements, the plan/apply result types, the persisted convergence state
//! and secret sources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 StackFlow CLI                    │
//! │          (stackflow plan/apply/destroy)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-core                    │
//! │   graph · attribute futures · scheduler          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ResourceProvider { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Convergence  │  │   Secrets    │            │
//! │  │    Store     │  │              │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │    sandbox    │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod secret;
pub mod state;
pub mod store;

// Re-exports
pub use action::{
    Action, ActionType, ApplyResult, ApplySummary, NodeOutcome, OutcomeStatus, Plan, PlanSummary,
};
pub use error::{CloudError, ProviderError, Result, TransientReason};
pub use provider::{Attributes, CreatedResource, ResourceProvider, RetryConfig};
pub use secret::{
    EnvSecretSource, OnePasswordSecretSource, SecretRef, SecretRouter, SecretSource, SecretValue,
    StaticSecretSource,
};
pub use state::{ConvergenceRecord, RetiredResource, StateLock, StateManager, StateSnapshot};
pub use store::{ConvergenceStore, RecordLock};
