use super::node::ResourceNode;
use crate::config::EngineConfig;
use std::collections::BTreeMap;

/// Everything a declaration file declares
#[derive(Debug, Clone, Default)]
pub struct StackDeclaration {
    pub name: String,
    pub engine: EngineConfig,
    /// Tags merged into the `tags` of every resource's desired state
    pub tags: BTreeMap<String, String>,
    pub resources: Vec<ResourceNode>,
}

impl StackDeclaration {
    pub fn resource(&self, id: &str) -> Option<&ResourceNode> {
        self.resources.iter().find(|r| r.id == id)
    }
}
