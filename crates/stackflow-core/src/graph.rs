//! Dependency graph
//!
//! Edges point from producer to consumer and are derived from attribute
//! references, never from declaration order. The graph is validated once
//! when built: ids are unique, every reference names a declared node and
//! there are no cycles.

use crate::error::DeclarationError;
use crate::model::{Input, ResourceNode, is_valid_logical_id};
use serde_json::Value;
use stackflow_cloud::ConvergenceRecord;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, ResourceNode>,
    /// Declaration order, used for display only
    declared: Vec<String>,
    producers: BTreeMap<String, BTreeSet<String>>,
    consumers: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn build(resources: Vec<ResourceNode>) -> Result<Self, DeclarationError> {
        let mut graph = DependencyGraph::default();

        for mut node in resources {
            if !is_valid_logical_id(&node.id) {
                return Err(DeclarationError::InvalidLogicalId(node.id));
            }
            if graph.nodes.contains_key(&node.id) {
                return Err(DeclarationError::DuplicateId(node.id));
            }
            node.desired_state = normalize_desired_state(&node)?;
            validate_inputs(&node)?;
            graph.declared.push(node.id.clone());
            graph.nodes.insert(node.id.clone(), node);
        }

        for node in graph.nodes.values() {
            let producers = node.producers();
            for producer in &producers {
                if !graph.nodes.contains_key(producer) {
                    return Err(DeclarationError::UnknownReference {
                        consumer: node.id.clone(),
                        producer: producer.clone(),
                    });
                }
                graph
                    .consumers
                    .entry(producer.clone())
                    .or_default()
                    .insert(node.id.clone());
            }
            graph.producers.insert(node.id.clone(), producers);
        }

        graph.detect_cycle()?;
        Ok(graph)
    }

    /// Depth-first search; a back edge to a node still on the stack is a cycle
    fn detect_cycle(&self) -> Result<(), DeclarationError> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();

        for id in &self.declared {
            if !marks.contains_key(id.as_str()) {
                self.visit(id, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), DeclarationError> {
        marks.insert(id, Mark::Visiting);
        stack.push(id);

        for producer in self.producers_of(id) {
            match marks.get(producer.as_str()) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == producer).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|n| n.to_string()).collect();
                    path.push(producer.clone());
                    return Err(DeclarationError::Cycle { path });
                }
                Some(Mark::Done) => {}
                None => self.visit(producer, marks, stack)?,
            }
        }

        stack.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.declared.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct producers of `id`
    pub fn producers_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.producers.get(id).into_iter().flatten()
    }

    /// Direct consumers of `id`
    pub fn consumers_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.consumers.get(id).into_iter().flatten()
    }

    /// Every node that transitively consumes `id`
    pub fn dependents_of(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for consumer in self.consumers_of(current) {
                if seen.insert(consumer.clone()) {
                    queue.push_back(consumer);
                }
            }
        }
        seen
    }

    /// Producers before consumers; ties broken by logical id
    pub fn topological_order(&self) -> Vec<String> {
        self.levels().into_iter().flatten().collect()
    }

    /// Consumers before producers
    pub fn reverse_topological_order(&self) -> Vec<String> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    /// Nodes grouped by depth: level 0 has no producers, level n only
    /// depends on earlier levels
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), self.producers_of(id).count()))
            .collect();
        let mut levels = Vec::new();

        loop {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(id, _)| id.to_string())
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in &ready {
                remaining.remove(id.as_str());
                for consumer in self.consumers_of(id) {
                    if let Some(count) = remaining.get_mut(consumer.as_str()) {
                        *count -= 1;
                    }
                }
            }
            levels.push(ready);
        }
        levels
    }

    /// Compare declared nodes with the records of a previous run
    pub fn diff(&self, records: &[ConvergenceRecord]) -> GraphDiff {
        let mut diff = GraphDiff::default();
        let recorded: BTreeMap<&str, &ConvergenceRecord> = records
            .iter()
            .map(|r| (r.logical_id.as_str(), r))
            .collect();

        for id in self.nodes.keys() {
            match recorded.get(id.as_str()) {
                None => diff.added.push(id.clone()),
                Some(record) => {
                    diff.retained.push(id.clone());
                    if self.nodes[id].kind != record.kind {
                        diff.kind_changed.push(id.clone());
                    }
                }
            }
        }
        diff.removed = deletion_order(
            records
                .iter()
                .filter(|r| !self.nodes.contains_key(&r.logical_id)),
        );
        diff
    }
}

/// Declared versus recorded resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    /// Declared but never applied
    pub added: Vec<String>,
    /// Recorded but no longer declared, in deletion order
    pub removed: Vec<String>,
    /// Declared and recorded
    pub retained: Vec<String>,
    /// Retained ids whose kind changed
    pub kind_changed: Vec<String>,
}

/// Order recorded resources so that consumers are deleted before the
/// producers they depended on at their last apply. Dependencies outside the
/// given set are ignored.
pub fn deletion_order<'a>(records: impl IntoIterator<Item = &'a ConvergenceRecord>) -> Vec<String> {
    let records: BTreeMap<&str, &ConvergenceRecord> = records
        .into_iter()
        .map(|r| (r.logical_id.as_str(), r))
        .collect();

    // number of recorded consumers still to be deleted before each id
    let mut pending: BTreeMap<&str, usize> = records.keys().map(|id| (*id, 0)).collect();
    for record in records.values() {
        for dependency in &record.dependencies {
            if let Some(count) = pending.get_mut(dependency.as_str()) {
                *count += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(records.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            pending.remove(id);
            order.push(id.to_string());
            for dependency in &records[id].dependencies {
                if let Some(count) = pending.get_mut(dependency.as_str()) {
                    *count -= 1;
                }
            }
        }
    }
    // a corrupted state file could contain a cycle; delete the rest by id
    order.extend(pending.keys().map(|id| id.to_string()));
    order
}

fn normalize_desired_state(node: &ResourceNode) -> Result<Value, DeclarationError> {
    match &node.desired_state {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(node.desired_state.clone()),
        other => Err(DeclarationError::InvalidDesiredState {
            logical_id: node.id.clone(),
            reason: format!("got {}", other),
        }),
    }
}

fn validate_inputs(node: &ResourceNode) -> Result<(), DeclarationError> {
    for (param, input) in &node.inputs {
        let invalid = |reason: &str| DeclarationError::InvalidInput {
            logical_id: node.id.clone(),
            param: param.clone(),
            reason: reason.to_string(),
        };
        if param.is_empty() {
            return Err(invalid("パラメータ名が空です"));
        }
        if let Input::Secret(secret) = input
            && (secret.scheme().is_none() || secret.path().is_empty())
        {
            return Err(invalid("シークレット参照は scheme://path 形式で指定してください"));
        }
    }
    for producer in &node.depends_on {
        if !is_valid_logical_id(producer) {
            return Err(DeclarationError::InvalidLogicalId(producer.clone()));
        }
    }
    Ok(())
}
