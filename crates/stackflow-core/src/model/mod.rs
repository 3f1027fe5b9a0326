//! Declaration model

mod input;
mod node;
mod stack;

pub use input::{AttributeRef, Input, Template, is_valid_logical_id};
pub use node::ResourceNode;
pub use stack::StackDeclaration;

/// Built-in attribute carrying a resource's provider identity
pub const ID_ATTRIBUTE: &str = "id";
