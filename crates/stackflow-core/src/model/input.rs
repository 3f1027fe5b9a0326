//! Input values of a resource node

use regex::Regex;
use serde_json::Value;
use stackflow_cloud::SecretRef;
use std::sync::LazyLock;

/// `${owner.attribute}` placeholder
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)\s*\}")
        .expect("placeholder pattern is valid")
});

/// Logical ids are referenced as `id.attribute`, so they must not contain dots
pub fn is_valid_logical_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Reference to an attribute exposed by another resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeRef {
    pub owner: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(owner: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            attribute: attribute.into(),
        }
    }

    /// The provider identity of `owner`
    pub fn identity_of(owner: impl Into<String>) -> Self {
        Self::new(owner, super::ID_ATTRIBUTE)
    }

    /// Parse `owner.attribute`
    pub fn parse(reference: &str) -> Option<Self> {
        let (owner, attribute) = reference.split_once('.')?;
        if !is_valid_logical_id(owner) || attribute.is_empty() {
            return None;
        }
        Some(Self::new(owner, attribute))
    }
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner, self.attribute)
    }
}

/// String with `${owner.attribute}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    references: Vec<AttributeRef>,
}

impl Template {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut references: Vec<AttributeRef> = PLACEHOLDER
            .captures_iter(&source)
            .map(|caps| AttributeRef::new(&caps[1], &caps[2]))
            .collect();
        references.sort();
        references.dedup();
        Self { source, references }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct attributes used by the template
    pub fn references(&self) -> &[AttributeRef] {
        &self.references
    }

    /// Substitute every placeholder. Strings are inserted verbatim, other
    /// values as JSON text. Returns the first reference `lookup` cannot answer.
    pub fn render<F>(&self, lookup: F) -> Result<String, AttributeRef>
    where
        F: Fn(&AttributeRef) -> Option<Value>,
    {
        let mut rendered = String::with_capacity(self.source.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let Some(whole) = caps.get(0) else { continue };
            let key = AttributeRef::new(&caps[1], &caps[2]);
            let value = lookup(&key).ok_or(key)?;
            rendered.push_str(&self.source[last..whole.start()]);
            match value {
                Value::String(s) => rendered.push_str(&s),
                other => rendered.push_str(&other.to_string()),
            }
            last = whole.end();
        }
        rendered.push_str(&self.source[last..]);
        Ok(rendered)
    }
}

/// Value bound to an input parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Literal value known at declaration time
    Value(Value),
    /// Attribute of another resource, known once that resource is applied
    Ref(AttributeRef),
    /// Secret fetched from a secret source at dispatch time
    Secret(SecretRef),
    /// String interpolating attributes of other resources
    Template(Template),
}

impl Input {
    pub fn reference(owner: impl Into<String>, attribute: impl Into<String>) -> Self {
        Input::Ref(AttributeRef::new(owner, attribute))
    }

    pub fn secret(reference: impl Into<String>) -> Self {
        Input::Secret(SecretRef::new(reference))
    }

    pub fn template(source: impl Into<String>) -> Self {
        Input::Template(Template::parse(source))
    }

    /// Attributes this input waits on
    pub fn references(&self) -> Vec<&AttributeRef> {
        match self {
            Input::Ref(r) => vec![r],
            Input::Template(t) => t.references().iter().collect(),
            Input::Value(_) | Input::Secret(_) => Vec::new(),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}
