//! StackFlow Core
//!
//! Declaration model and execution engine: resource nodes, attribute
//! futures, the dependency graph, fingerprints, the consistency compensator,
//! the planner and the provisioning scheduler, plus the KDL loader.

pub mod compensator;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod future;
pub mod graph;
pub mod inputs;
pub mod loader;
pub mod model;
pub mod parser;
pub mod planner;
pub mod scheduler;

pub use compensator::{Compensated, CompensationFailure, Compensator};
pub use config::EngineConfig;
pub use error::{AlreadyResolvedError, DeclarationError, FlowError, Result};
pub use fingerprint::{fingerprint, node_fingerprint};
pub use future::{AttributeFuture, FutureFailure, FutureState, FutureTable, PendingGuard};
pub use graph::{DependencyGraph, GraphDiff, deletion_order};
pub use inputs::{InputError, render_payload, resolve_inputs, wait_for_references};
pub use loader::{Stack, load_stack, load_stack_from_str};
pub use model::{AttributeRef, ID_ATTRIBUTE, Input, ResourceNode, StackDeclaration, Template};
pub use parser::{parse_stack_file, parse_stack_string};
pub use planner::{plan, plan_destroy};
pub use scheduler::{CancelHandle, Scheduler};
