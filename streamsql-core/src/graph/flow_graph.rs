use super::*;

/// The role of the element at a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Bound to a transport node; events enter the flow here.
    Source,
    Projection,
    Aggregation,
    /// Terminal element writing events out of the flow.
    Output,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::Source => "source",
            ElementKind::Projection => "projection",
            ElementKind::Aggregation => "aggregation",
            ElementKind::Output => "output",
        };
        f.write_str(s)
    }
}

/// A node in the flow DAG.
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: NodeId,
    pub kind: ElementKind,
    pub name: String,
}

/// An edge: every event `source` emits is delivered to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEdge {
    pub source: NodeId,
    pub target: NodeId,
}

/// The logical DAG of one flow.
#[derive(Debug, Default)]
pub struct FlowGraph {
    pub nodes: HashMap<NodeId, FlowNode>,
    pub edges: Vec<FlowEdge>,
    next_id: NodeId,
}

impl FlowGraph {
    /// Create an empty flow graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its assigned ID.
    pub fn add_node(&mut self, kind: ElementKind, name: impl Into<String>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            FlowNode {
                id,
                kind,
                name: name.into(),
            },
        );
        id
    }

    /// Add an edge between two nodes.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) {
        self.edges.push(FlowEdge { source, target });
    }

    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.get(&id)
    }

    /// Get downstream node IDs for a given node.
    pub fn downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id)
            .map(|e| e.target)
            .collect()
    }

    /// Get upstream node IDs for a given node.
    pub fn upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source)
            .collect()
    }

    /// Source nodes, in ID order.
    pub fn sources(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.kind == ElementKind::Source)
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Check that the graph can be materialized: edges join known nodes,
    /// sources have no inbound edges, every other element is fed by
    /// something, and there are no cycles.
    pub fn validate(&self) -> FlowResult<()> {
        if self.nodes.is_empty() {
            return Err(FlowError::Graph("flow has no elements".into()));
        }
        for edge in &self.edges {
            for end in [edge.source, edge.target] {
                if !self.nodes.contains_key(&end) {
                    return Err(FlowError::Graph(format!("edge references unknown node {end}")));
                }
            }
        }
        for node in self.nodes.values() {
            let fed = !self.upstream(node.id).is_empty();
            match node.kind {
                ElementKind::Source if fed => {
                    return Err(FlowError::Graph(format!(
                        "source {} ({}) has inbound edges",
                        node.id, node.name
                    )));
                }
                ElementKind::Source => {}
                _ if !fed => {
                    return Err(FlowError::Graph(format!(
                        "{} {} ({}) has no upstream",
                        node.kind, node.id, node.name
                    )));
                }
                _ => {}
            }
        }
        if topo_sort(self).len() != self.nodes.len() {
            return Err(FlowError::Graph("flow graph contains a cycle".into()));
        }
        Ok(())
    }
}

/// Topological sort of the flow graph (Kahn's algorithm). Ties go to the
/// lowest node ID. Nodes on a cycle are left out.
pub fn topo_sort(graph: &FlowGraph) -> Vec<NodeId> {
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
    let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for &id in graph.nodes.keys() {
        in_degree.entry(id).or_insert(0);
        adj.entry(id).or_default();
    }
    for edge in &graph.edges {
        *in_degree.entry(edge.target).or_insert(0) += 1;
        adj.entry(edge.source).or_default().push(edge.target);
    }

    // Kept sorted descending so `pop` yields the lowest ready ID.
    let mut queue: Vec<NodeId> = in_degree
        .iter()
        .filter(|entry| *entry.1 == 0)
        .map(|entry| *entry.0)
        .collect();
    queue.sort_unstable_by(|a, b| b.cmp(a));

    let mut result = Vec::new();
    while let Some(node) = queue.pop() {
        result.push(node);
        let Some(neighbors) = adj.get(&node) else {
            continue;
        };
        for &next in neighbors {
            if let Some(deg) = in_degree.get_mut(&next) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push(next);
                    queue.sort_unstable_by(|a, b| b.cmp(a));
                }
            }
        }
    }
    result
}

/// Build adjacency list (downstream map) from the graph.
pub fn downstream_map(graph: &FlowGraph) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &id in graph.nodes.keys() {
        adj.entry(id).or_default();
    }
    for edge in &graph.edges {
        adj.entry(edge.source).or_default().push(edge.target);
    }
    adj
}
