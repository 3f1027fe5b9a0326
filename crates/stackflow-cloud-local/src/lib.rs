//! Local sandbox provider for StackFlow
//!
//! This crate implements the ResourceProvider trait over a JSON file,
//! enabling StackFlow to plan, apply and destroy a declaration locally.
//!
//! # Features
//!
//! - Provider identities of the form `<kind>-<n>`
//! - Per-kind attributes (VPC subnets, DocumentDB endpoint, App Runner URL,
//!   S3 website endpoint, IAM ARNs)
//! - Simulated IAM propagation lag reported as a transient error
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud_local::SandboxProvider;
//! use stackflow_cloud::ResourceProvider;
//!
//! let provider = SandboxProvider::open(".").await?;
//! let vpc = provider.create("vpc", &serde_json::json!({"cidr": "10.0.0.0/16"})).await?;
//! println!("{}", vpc.attributes["vpc_id"]);
//! ```

pub mod catalog;
pub mod error;
pub mod provider;

pub use error::{Result, SandboxError};
pub use provider::{SANDBOX_FILE, SandboxProvider, SandboxResource};
