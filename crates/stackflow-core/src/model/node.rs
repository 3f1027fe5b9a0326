use super::input::{AttributeRef, Input};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A declared unit of desired state
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    /// Logical name, stable across runs
    pub id: String,
    /// Resource kind understood by the provider (e.g. "vpc", "s3-bucket")
    pub kind: String,
    pub inputs: BTreeMap<String, Input>,
    /// Opaque provider payload; resolved inputs are merged into it
    pub desired_state: Value,
    /// Provider calls for this node may hit propagation lag
    pub lag_sensitive: bool,
    /// Ordering-only dependencies
    pub depends_on: Vec<String>,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            inputs: BTreeMap::new(),
            desired_state: Value::Object(Default::default()),
            lag_sensitive: false,
            depends_on: Vec::new(),
        }
    }

    pub fn with_state(mut self, desired_state: Value) -> Self {
        self.desired_state = desired_state;
        self
    }

    pub fn with_input(mut self, param: impl Into<String>, input: Input) -> Self {
        self.inputs.insert(param.into(), input);
        self
    }

    pub fn with_value(self, param: impl Into<String>, value: Value) -> Self {
        self.with_input(param, Input::Value(value))
    }

    pub fn with_ref(
        self,
        param: impl Into<String>,
        owner: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.with_input(param, Input::reference(owner, attribute))
    }

    pub fn with_secret(self, param: impl Into<String>, reference: impl Into<String>) -> Self {
        self.with_input(param, Input::secret(reference))
    }

    pub fn with_template(self, param: impl Into<String>, source: impl Into<String>) -> Self {
        self.with_input(param, Input::template(source))
    }

    pub fn depends_on(mut self, producer: impl Into<String>) -> Self {
        self.depends_on.push(producer.into());
        self
    }

    pub fn lag_sensitive(mut self, lag_sensitive: bool) -> Self {
        self.lag_sensitive = lag_sensitive;
        self
    }

    /// Every attribute this node waits on, including the identities of
    /// `depends_on` producers
    pub fn references(&self) -> BTreeSet<AttributeRef> {
        self.inputs
            .values()
            .flat_map(|input| input.references().into_iter().cloned())
            .chain(self.depends_on.iter().map(AttributeRef::identity_of))
            .collect()
    }

    /// Logical ids of the producers this node depends on
    pub fn producers(&self) -> BTreeSet<String> {
        self.references().into_iter().map(|r| r.owner).collect()
    }
}
