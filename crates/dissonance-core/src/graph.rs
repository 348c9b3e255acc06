// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Verified Knowledge Graph
// ─────────────────────────────────────────────────────────────────────
//! Directed, attributed graph of verified facts.
//!
//! Storage is an explicit adjacency structure: nodes live in insertion
//! order in a `Vec`, an id → index map gives O(1) node lookup, and each
//! node keeps its outgoing and incoming edge lists so that edge lookup
//! is O(degree).
//!
//! The whole structure sits behind one `parking_lot::RwLock`. Queries
//! share the read lock; every ingestion call (single fact, bulk batch,
//! whole-graph load) holds the write lock for its full duration, so a
//! reader never sees a half-applied update. Whole-graph loads build the
//! replacement off-lock and swap it in.
//!
//! # Relationship search
//!
//! `query_relationship(a, b)` reports a direct `a → b` edge if present,
//! otherwise runs a breadth-first search over outgoing edges capped at
//! [`MAX_PATH_NODES`] nodes (three intermediate hops). Neighbours are
//! expanded in ascending id order, so among several shortest paths the
//! one with the lexicographically smallest id sequence is returned,
//! independent of insertion order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use dissonance_types::{clamp_score, KernelError, KernelResult};

/// Longest indirect path reported, endpoints included.
pub const MAX_PATH_NODES: usize = 4;

/// Numerator of the indirect-path confidence `0.7 / path_len`.
pub const INDIRECT_CONFIDENCE: f64 = 0.7;

/// Relation label reported for indirect connections.
pub const INDIRECT_RELATION: &str = "indirect";

/// Node type given to endpoints created implicitly by edge insertion.
pub const PLACEHOLDER_TYPE: &str = "unknown";

/// Keys a node record uses for its own fields. Attributes may not reuse
/// them, or the flattened node-link record could not be read back.
pub const RESERVED_ATTRIBUTES: [&str; 3] = ["id", "node_type", "verified"];

/// Scalar or string attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Case-insensitive substring match. Only `Text` values take part;
    /// lists, numbers and booleans never match.
    fn matches(&self, needle_lower: &str) -> bool {
        match self {
            AttrValue::Text(s) => s.to_lowercase().contains(needle_lower),
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Text(v) => f.write_str(v),
            AttrValue::List(v) => f.write_str(&v.join(", ")),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// An entity in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub attributes: Attributes,
    /// `false` for placeholders created by edge insertion.
    pub verified: bool,
}

impl Node {
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: PLACEHOLDER_TYPE.to_string(),
            attributes: Attributes::new(),
            verified: false,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    fn matches(&self, needle_lower: &str) -> bool {
        self.id.to_lowercase().contains(needle_lower)
            || self.node_type.to_lowercase().contains(needle_lower)
            || self.attributes.values().any(|v| v.matches(needle_lower))
    }
}

/// A directed, labelled fact `source → target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub relation: String,
    /// Reliability in [0, 1].
    pub confidence: f64,
    /// Where the fact came from.
    pub provenance: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Answer to a relationship query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub exists: bool,
    /// Edge label for direct edges, `"indirect"` for paths, `None` if absent.
    pub relation_type: Option<String>,
    pub confidence: f64,
    /// Node ids from `a` to `b`; empty when absent.
    pub path: Vec<String>,
    pub is_direct: bool,
}

impl Relationship {
    pub fn absent() -> Self {
        Self {
            exists: false,
            relation_type: None,
            confidence: 0.0,
            path: Vec::new(),
            is_direct: false,
        }
    }
}

/// Append-only record of a verified fact being learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub sequence: u64,
    /// Rendered as `a --[relation]--> b`.
    pub fact: String,
    pub confidence: f64,
    pub provenance: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Whether an upsert created a new edge or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactOutcome {
    Inserted,
    Updated,
}

/// Input record for bulk ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedFact {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub confidence: f64,
    #[serde(default)]
    pub provenance: Option<String>,
}

impl VerifiedFact {
    pub fn new(
        source: impl Into<String>,
        relation: impl Into<String>,
        target: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            confidence,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = Some(provenance.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub verified_nodes: usize,
    pub learning_events: usize,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

// ── Node-link persistence format ─────────────────────────────────────

/// Whole-graph document: a node list and a link list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkData {
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default = "default_node_type")]
    pub node_type: String,
    #[serde(default = "default_verified")]
    pub verified: bool,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source: String,
    pub target: String,
    #[serde(default = "default_node_type")]
    pub relation: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub provenance: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

fn default_directed() -> bool {
    true
}

fn default_node_type() -> String {
    PLACEHOLDER_TYPE.to_string()
}

fn default_verified() -> bool {
    true
}

fn default_confidence() -> f64 {
    0.5
}

fn reserved_attribute(attributes: &Attributes) -> Option<&str> {
    RESERVED_ATTRIBUTES
        .iter()
        .copied()
        .find(|key| attributes.contains_key(*key))
}

fn sanitize_confidence(confidence: f64, fact: &str) -> f64 {
    let clamped = clamp_score(confidence, 0.0, 1.0);
    if clamped != confidence {
        log::warn!("confidence {confidence} for {fact} clamped to {clamped:.4}");
    }
    clamped
}

// ── Adjacency storage ────────────────────────────────────────────────

struct GraphInner {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Per node: `(target index, edge index)`.
    outgoing: Vec<Vec<(usize, usize)>>,
    /// Per node: `(source index, edge index)`.
    incoming: Vec<Vec<(usize, usize)>>,
    learning_log: Vec<LearningEvent>,
    next_event: u64,
    created_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
}

impl GraphInner {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            learning_log: Vec::new(),
            next_event: 0,
            created_at: now,
            last_update: now,
        }
    }

    fn lookup(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    fn push_node(&mut self, node: Node) -> usize {
        let ix = self.nodes.len();
        self.index.insert(node.id.clone(), ix);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        ix
    }

    fn ensure_node(&mut self, id: &str) -> usize {
        match self.lookup(id) {
            Some(ix) => ix,
            None => self.push_node(Node::placeholder(id)),
        }
    }

    fn upsert_node(
        &mut self,
        id: &str,
        node_type: &str,
        attributes: Attributes,
        verified: bool,
    ) -> usize {
        match self.lookup(id) {
            Some(ix) => {
                let node = &mut self.nodes[ix];
                node.node_type = node_type.to_string();
                node.verified = verified;
                node.attributes.extend(attributes);
                ix
            }
            None => self.push_node(Node {
                id: id.to_string(),
                node_type: node_type.to_string(),
                attributes,
                verified,
            }),
        }
    }

    fn find_edge(&self, source: usize, target: usize) -> Option<usize> {
        self.outgoing[source]
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, e)| *e)
    }

    fn upsert_edge(
        &mut self,
        source: &str,
        target: &str,
        relation: &str,
        confidence: f64,
        provenance: Option<&str>,
        added_at: DateTime<Utc>,
    ) -> FactOutcome {
        let s = self.ensure_node(source);
        let t = self.ensure_node(target);
        let edge = Edge {
            source: source.to_string(),
            target: target.to_string(),
            relation: relation.to_string(),
            confidence,
            provenance: provenance.map(str::to_string),
            added_at,
        };
        self.last_update = Utc::now();
        match self.find_edge(s, t) {
            Some(e) => {
                self.edges[e] = edge;
                FactOutcome::Updated
            }
            None => {
                let e = self.edges.len();
                self.edges.push(edge);
                self.outgoing[s].push((t, e));
                self.incoming[t].push((s, e));
                FactOutcome::Inserted
            }
        }
    }

    fn add_verified_fact(
        &mut self,
        a: &str,
        b: &str,
        relation: &str,
        confidence: f64,
        source: Option<&str>,
    ) -> FactOutcome {
        let fact = format!("{a} --[{relation}]--> {b}");
        let confidence = sanitize_confidence(confidence, &fact);
        let now = Utc::now();
        let outcome = self.upsert_edge(a, b, relation, confidence, source, now);
        self.learning_log.push(LearningEvent {
            sequence: self.next_event,
            fact,
            confidence,
            provenance: source.map(str::to_string),
            timestamp: now,
        });
        self.next_event += 1;
        outcome
    }

    fn relationship(&self, a: &str, b: &str) -> Relationship {
        let (Some(start), Some(goal)) = (self.lookup(a), self.lookup(b)) else {
            return Relationship::absent();
        };

        if let Some(e) = self.find_edge(start, goal) {
            let edge = &self.edges[e];
            return Relationship {
                exists: true,
                relation_type: Some(edge.relation.clone()),
                confidence: edge.confidence,
                path: vec![a.to_string(), b.to_string()],
                is_direct: true,
            };
        }

        match self.bounded_path(start, goal) {
            Some(path) => Relationship {
                exists: true,
                relation_type: Some(INDIRECT_RELATION.to_string()),
                confidence: INDIRECT_CONFIDENCE / path.len() as f64,
                path: path.into_iter().map(|ix| self.nodes[ix].id.clone()).collect(),
                is_direct: false,
            },
            None => Relationship::absent(),
        }
    }

    /// Capped BFS over outgoing edges with ascending-id expansion order.
    fn bounded_path(&self, start: usize, goal: usize) -> Option<Vec<usize>> {
        let max_depth = MAX_PATH_NODES - 1;
        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        parent.insert(start, start);
        queue.push_back((start, 0));

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut neighbours: Vec<usize> = self.outgoing[node].iter().map(|(t, _)| *t).collect();
            neighbours.sort_by(|x, y| self.nodes[*x].id.cmp(&self.nodes[*y].id));

            for next in neighbours {
                if parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, node);
                if next == goal {
                    let mut path = vec![goal];
                    let mut cursor = goal;
                    while cursor != start {
                        cursor = parent[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((next, depth + 1));
            }
        }
        None
    }

    fn from_node_link(data: NodeLinkData) -> KernelResult<Self> {
        if !data.directed {
            return Err(KernelError::Persistence(
                "undirected node-link documents are not supported".to_string(),
            ));
        }
        let mut inner = Self::new();
        for record in data.nodes {
            if record.id.is_empty() {
                return Err(KernelError::Persistence(
                    "node id must not be empty".to_string(),
                ));
            }
            if let Some(key) = reserved_attribute(&record.attributes) {
                return Err(KernelError::Persistence(format!(
                    "node {:?} uses reserved attribute name {key:?}",
                    record.id
                )));
            }
            inner.upsert_node(&record.id, &record.node_type, record.attributes, record.verified);
        }
        for link in data.links {
            if link.source.is_empty() || link.target.is_empty() {
                return Err(KernelError::Persistence(format!(
                    "link endpoints must not be empty ({:?} -> {:?})",
                    link.source, link.target
                )));
            }
            let fact = format!("{} --[{}]--> {}", link.source, link.relation, link.target);
            let confidence = sanitize_confidence(link.confidence, &fact);
            inner.upsert_edge(
                &link.source,
                &link.target,
                &link.relation,
                confidence,
                link.provenance.as_deref(),
                link.added_at.unwrap_or_else(Utc::now),
            );
        }
        Ok(inner)
    }

    fn to_node_link(&self) -> NodeLinkData {
        NodeLinkData {
            directed: true,
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeRecord {
                    id: n.id.clone(),
                    node_type: n.node_type.clone(),
                    verified: n.verified,
                    attributes: n.attributes.clone(),
                })
                .collect(),
            links: self
                .edges
                .iter()
                .map(|e| LinkRecord {
                    source: e.source.clone(),
                    target: e.target.clone(),
                    relation: e.relation.clone(),
                    confidence: e.confidence,
                    provenance: e.provenance.clone(),
                    added_at: Some(e.added_at),
                })
                .collect(),
        }
    }
}

// ── Public graph ─────────────────────────────────────────────────────

/// Thread-safe verified knowledge graph.
pub struct KnowledgeGraph {
    inner: RwLock<GraphInner>,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeGraph {
    /// Empty graph. Seed content is supplied through a fixture, see
    /// [`KnowledgeGraph::from_node_link`].
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::new()),
        }
    }

    /// Build a graph from a node-link document.
    pub fn from_node_link(data: NodeLinkData) -> KernelResult<Self> {
        let inner = GraphInner::from_node_link(data)?;
        log::info!(
            "knowledge graph loaded: {} nodes, {} edges",
            inner.nodes.len(),
            inner.edges.len()
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Build a graph from a node-link JSON document.
    pub fn from_json(json: &str) -> KernelResult<Self> {
        let data: NodeLinkData = serde_json::from_str(json)?;
        Self::from_node_link(data)
    }

    /// Read a node-link JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> KernelResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Replace the entire graph with `data`. The learning log restarts.
    ///
    /// The replacement is built before the write lock is taken; on error
    /// the current graph is left untouched.
    pub fn load_node_link(&self, data: NodeLinkData) -> KernelResult<()> {
        let replacement = GraphInner::from_node_link(data)?;
        let (nodes, edges) = (replacement.nodes.len(), replacement.edges.len());
        *self.inner.write() = replacement;
        log::info!("knowledge graph replaced: {nodes} nodes, {edges} edges");
        Ok(())
    }

    pub fn to_node_link(&self) -> NodeLinkData {
        self.inner.read().to_node_link()
    }

    pub fn to_json(&self) -> KernelResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_node_link())?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> KernelResult<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Relationship from `a` to `b`. Unknown ids yield an absent result.
    pub fn query_relationship(&self, a: &str, b: &str) -> Relationship {
        self.inner.read().relationship(a, b)
    }

    pub fn get_node_info(&self, id: &str) -> Option<Node> {
        let inner = self.inner.read();
        inner.lookup(id).map(|ix| inner.nodes[ix].clone())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.inner.read().index.contains_key(id)
    }

    /// Direct edge `a → b`, if any.
    pub fn edge(&self, a: &str, b: &str) -> Option<Edge> {
        let inner = self.inner.read();
        let (s, t) = (inner.lookup(a)?, inner.lookup(b)?);
        inner.find_edge(s, t).map(|e| inner.edges[e].clone())
    }

    pub fn edges_from(&self, id: &str) -> Vec<Edge> {
        let inner = self.inner.read();
        match inner.lookup(id) {
            Some(ix) => inner.outgoing[ix]
                .iter()
                .map(|(_, e)| inner.edges[*e].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn edges_to(&self, id: &str) -> Vec<Edge> {
        let inner = self.inner.read();
        match inner.lookup(id) {
            Some(ix) => inner.incoming[ix]
                .iter()
                .map(|(_, e)| inner.edges[*e].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Case-insensitive substring search over ids, node types and string
    /// attributes, in node insertion order, truncated to `limit`.
    pub fn search_nodes(&self, query: &str, limit: usize) -> Vec<(String, Attributes)> {
        let needle = query.to_lowercase();
        let inner = self.inner.read();
        inner
            .nodes
            .iter()
            .filter(|n| n.matches(&needle))
            .take(limit)
            .map(|n| (n.id.clone(), n.attributes.clone()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }

    pub fn learning_events(&self) -> Vec<LearningEvent> {
        self.inner.read().learning_log.clone()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let inner = self.inner.read();
        GraphStatistics {
            node_count: inner.nodes.len(),
            edge_count: inner.edges.len(),
            verified_nodes: inner.nodes.iter().filter(|n| n.verified).count(),
            learning_events: inner.learning_log.len(),
            created_at: inner.created_at,
            last_update: inner.last_update,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Record the verified fact `a --[relation]--> b`.
    ///
    /// Missing endpoints become unverified placeholders. An existing
    /// `a → b` edge is overwritten (last write wins). A learning event is
    /// appended in every case.
    pub fn add_verified_fact(
        &self,
        a: &str,
        b: &str,
        relation: &str,
        confidence: f64,
        source: Option<&str>,
    ) -> FactOutcome {
        let outcome = self
            .inner
            .write()
            .add_verified_fact(a, b, relation, confidence, source);
        log::debug!("fact {a} --[{relation}]--> {b}: {outcome:?}");
        outcome
    }

    /// Apply a batch of facts under a single write lock.
    ///
    /// Returns the number of newly created edges.
    pub fn ingest<I>(&self, facts: I) -> usize
    where
        I: IntoIterator<Item = VerifiedFact>,
    {
        let mut inner = self.inner.write();
        let mut inserted = 0;
        let mut total = 0;
        for fact in facts {
            total += 1;
            let outcome = inner.add_verified_fact(
                &fact.source,
                &fact.target,
                &fact.relation,
                fact.confidence,
                fact.provenance.as_deref(),
            );
            if outcome == FactOutcome::Inserted {
                inserted += 1;
            }
        }
        drop(inner);
        log::info!("ingested {total} facts ({inserted} new edges)");
        inserted
    }

    /// Insert or update a node. Attributes are merged; new keys win.
    /// Attributes named after a [`RESERVED_ATTRIBUTES`] key are dropped.
    pub fn add_node(&self, id: &str, node_type: &str, mut attributes: Attributes, verified: bool) {
        attributes.retain(|key, _| {
            let reserved = RESERVED_ATTRIBUTES.contains(&key.as_str());
            if reserved {
                log::warn!("dropping reserved attribute {key:?} on node {id}");
            }
            !reserved
        });
        let mut inner = self.inner.write();
        inner.upsert_node(id, node_type, attributes, verified);
        inner.last_update = Utc::now();
    }

    /// Insert or overwrite the edge `source → target` without recording a
    /// learning event.
    pub fn insert_edge(
        &self,
        source: &str,
        target: &str,
        relation: &str,
        confidence: f64,
        provenance: Option<&str>,
    ) -> FactOutcome {
        let fact = format!("{source} --[{relation}]--> {target}");
        let confidence = sanitize_confidence(confidence, &fact);
        self.inner
            .write()
            .upsert_edge(source, target, relation, confidence, provenance, Utc::now())
    }
}
