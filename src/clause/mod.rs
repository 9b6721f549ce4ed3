//! Deferred clause trees.
//!
//! A [`Clause`] describes how to derive a [`JointState`](crate::JointState)
//! without evaluating anything yet. Leaves are concrete states or oracle
//! [`Query`]s; named placeholders are resolved against `with_defs`
//! definitions on the nearest enclosing clause.
//!
//! Nodes live in an arena (`Vec<Node>`) and point at their parent by index,
//! so scope lookup walks up the tree without reference cycles. Composing
//! clauses grafts each child's arena into the parent's.

mod eval;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DeserializationError, EvaluationError};
use crate::query::Query;
use crate::state::{Operator, UnitState};

pub use eval::EvalPass;

/// Index of a node inside a clause arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Leaf of a base clause: known state or pending oracle query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Leaf {
    /// Evidence fetched from an oracle.
    Query(Query),
    /// Known state.
    State(UnitState),
}

impl From<UnitState> for Leaf {
    fn from(state: UnitState) -> Self {
        Self::State(state)
    }
}

impl From<Query> for Leaf {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Base(BTreeMap<String, Leaf>),
    Named(String),
    Compound {
        operator: Operator,
        children: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    defs: BTreeMap<String, NodeId>,
    /// Union of parties of structural (non-named) descendants.
    parties: BTreeSet<String>,
    /// True if a named reference occurs in this subtree.
    has_names: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            defs: BTreeMap::new(),
            parties: BTreeSet::new(),
            has_names: false,
        }
    }

    fn shift(&mut self, offset: usize) {
        let bump = |id: &mut NodeId| id.0 += offset;
        if let Some(parent) = self.parent.as_mut() {
            bump(parent);
        }
        self.defs.values_mut().for_each(bump);
        if let NodeKind::Compound { children, .. } = &mut self.kind {
            children.iter_mut().for_each(bump);
        }
    }
}

/// Deferred, composable expression tree.
///
/// # Examples
///
/// ```
/// use oc_contracts::{Clause, UnitState};
///
/// let x = UnitState::new(0.7).unwrap().with_source("Odin");
/// let y = UnitState::new(0.5).unwrap().with_source("Vishnu");
///
/// let clause = Clause::and(["AdidX", "BdidY"]).with_defs([
///     ("AdidX", Clause::single("alice", x)),
///     ("BdidY", Clause::single("bob", y)),
/// ]);
/// assert!(clause.parties().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ClauseRecord", try_from = "ClauseRecord")]
pub struct Clause {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Clause {
    fn leaf(kind: NodeKind) -> Self {
        let mut node = Node::new(kind);
        match &node.kind {
            NodeKind::Base(leaves) => node.parties = leaves.keys().cloned().collect(),
            NodeKind::Named(_) => node.has_names = true,
            NodeKind::Compound { .. } => {}
        }
        Self {
            nodes: vec![node],
            root: NodeId(0),
        }
    }

    /// Base clause for one party.
    #[must_use]
    pub fn single(party: impl Into<String>, leaf: impl Into<Leaf>) -> Self {
        Self::base([(party.into(), leaf.into())])
    }

    /// Base clause for one party whose leaf is supplied later through
    /// [`Clause::state`] or [`Clause::query`]. Until then it is undefined.
    #[must_use]
    pub fn party(party: impl Into<String>) -> Self {
        Self::single(party, UnitState::UNDEFINED)
    }

    /// Base clause over any number of parties.
    #[must_use]
    pub fn base<I, S>(leaves: I) -> Self
    where
        I: IntoIterator<Item = (S, Leaf)>,
        S: Into<String>,
    {
        Self::leaf(NodeKind::Base(
            leaves.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Reference to a definition on an enclosing clause.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::leaf(NodeKind::Named(name.into()))
    }

    /// Conjunction of `children`; strings become named references.
    #[must_use]
    pub fn and<I, C>(children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Clause>,
    {
        Self::compound(Operator::And, children.into_iter().map(Into::into).collect())
    }

    /// Disjunction of `children`; strings become named references.
    #[must_use]
    pub fn or<I, C>(children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Clause>,
    {
        Self::compound(Operator::Or, children.into_iter().map(Into::into).collect())
    }

    /// Complement of `child`.
    #[must_use]
    pub fn not(child: impl Into<Clause>) -> Self {
        Self::compound(Operator::Not, vec![child.into()])
    }

    fn compound(operator: Operator, children: Vec<Clause>) -> Self {
        let mut nodes = vec![Node::new(NodeKind::Compound {
            operator,
            children: Vec::new(),
        })];
        let root = NodeId(0);

        let mut child_ids = Vec::with_capacity(children.len());
        let mut parties = BTreeSet::new();
        let mut has_names = false;
        for child in children {
            let id = graft(&mut nodes, child, root);
            parties.extend(nodes[id.0].parties.iter().cloned());
            has_names |= nodes[id.0].has_names;
            child_ids.push(id);
        }

        let node = &mut nodes[root.0];
        node.kind = NodeKind::Compound {
            operator,
            children: child_ids,
        };
        node.parties = parties;
        node.has_names = has_names;
        Self { nodes, root }
    }

    /// Attaches named definitions visible to this clause and its descendants.
    #[must_use]
    pub fn with_defs<I, S, C>(mut self, defs: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<Clause>,
    {
        for (name, def) in defs {
            let id = graft(&mut self.nodes, def.into(), self.root);
            self.nodes[self.root.0].defs.insert(name.into(), id);
        }
        self
    }

    /// Sets the state of a single-party base clause.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::NotABaseClause` for compound and named
    /// clauses, `EvaluationError::AmbiguousClauseUsage` for a base clause
    /// without exactly one party.
    pub fn state(self, state: UnitState) -> Result<Self, EvaluationError> {
        self.set_leaf(state.into(), "state")
    }

    /// Sets the query of a single-party base clause.
    ///
    /// # Errors
    ///
    /// See [`Clause::state`].
    pub fn query(self, query: Query) -> Result<Self, EvaluationError> {
        self.set_leaf(query.into(), "query")
    }

    fn set_leaf(mut self, leaf: Leaf, method: &'static str) -> Result<Self, EvaluationError> {
        let root = self.root.0;
        match &mut self.nodes[root].kind {
            NodeKind::Base(leaves) if leaves.len() == 1 => {
                if let Some(slot) = leaves.values_mut().next() {
                    *slot = leaf;
                }
                Ok(self)
            }
            NodeKind::Base(leaves) => Err(EvaluationError::AmbiguousClauseUsage {
                method,
                parties: leaves.len(),
            }),
            NodeKind::Named(_) | NodeKind::Compound { .. } => {
                Err(EvaluationError::NotABaseClause { method })
            }
        }
    }

    /// Parties declared structurally by this clause, cached at construction.
    ///
    /// Parties reachable only through named references are not included;
    /// they are resolved during evaluation.
    #[must_use]
    pub fn parties(&self) -> &BTreeSet<String> {
        &self.nodes[self.root.0].parties
    }

    /// Operator at the root, if the root is a compound clause.
    #[must_use]
    pub fn operator(&self) -> Option<Operator> {
        match &self.nodes[self.root.0].kind {
            NodeKind::Compound { operator, .. } => Some(*operator),
            _ => None,
        }
    }

    /// Every query leaf in the tree, definitions included.
    #[must_use]
    pub fn queries(&self) -> Vec<&Query> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Base(leaves) => Some(leaves.values()),
                _ => None,
            })
            .flatten()
            .filter_map(|leaf| match leaf {
                Leaf::Query(q) => Some(q),
                Leaf::State(_) => None,
            })
            .collect()
    }

    /// Finds the definition of `name` visible from `from`, nearest scope first.
    fn resolve(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = &self.nodes[id.0];
            if let Some(def) = node.defs.get(name) {
                return Some(*def);
            }
            current = node.parent;
        }
        None
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn to_record(&self, id: NodeId) -> ClauseRecord {
        let node = self.node(id);
        let defs: BTreeMap<String, ClauseRecord> = node
            .defs
            .iter()
            .map(|(name, def)| (name.clone(), self.to_record(*def)))
            .collect();
        match &node.kind {
            NodeKind::Named(name) if defs.is_empty() => ClauseRecord::Named(name.clone()),
            NodeKind::Named(name) => ClauseRecord::ScopedName {
                name: name.clone(),
                defs,
            },
            NodeKind::Base(leaves) => ClauseRecord::Base {
                states_or_queries: leaves.clone(),
                defs,
            },
            NodeKind::Compound { operator, children } => ClauseRecord::Compound {
                operator: *operator,
                children: children.iter().map(|c| self.to_record(*c)).collect(),
                defs,
            },
        }
    }
}

/// Appends `clause`'s arena to `nodes` under `parent`; returns the new id of its root.
fn graft(nodes: &mut Vec<Node>, clause: Clause, parent: NodeId) -> NodeId {
    let offset = nodes.len();
    for mut node in clause.nodes {
        node.shift(offset);
        nodes.push(node);
    }
    let root = NodeId(clause.root.0 + offset);
    nodes[root.0].parent = Some(parent);
    root
}

impl From<&str> for Clause {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Clause {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<BTreeMap<String, Leaf>> for Clause {
    fn from(leaves: BTreeMap<String, Leaf>) -> Self {
        Self::base(leaves)
    }
}

/// Canonical wire form of a clause tree.
///
/// Base clauses encode as `{statesOrQueries}`, compound clauses as
/// `{operator, children}`, named references as a bare string. Definitions
/// appear under `defs` on the node that declares them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ClauseRecord {
    Named(String),
    ScopedName {
        name: String,
        defs: BTreeMap<String, ClauseRecord>,
    },
    Compound {
        operator: Operator,
        children: Vec<ClauseRecord>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        defs: BTreeMap<String, ClauseRecord>,
    },
    Base {
        #[serde(rename = "statesOrQueries")]
        states_or_queries: BTreeMap<String, Leaf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        defs: BTreeMap<String, ClauseRecord>,
    },
}

impl From<Clause> for ClauseRecord {
    fn from(clause: Clause) -> Self {
        clause.to_record(clause.root)
    }
}

impl TryFrom<ClauseRecord> for Clause {
    type Error = DeserializationError;

    fn try_from(record: ClauseRecord) -> Result<Self, Self::Error> {
        let (clause, defs) = match record {
            ClauseRecord::Named(name) => (Self::named(name), BTreeMap::new()),
            ClauseRecord::ScopedName { name, defs } => (Self::named(name), defs),
            ClauseRecord::Base {
                states_or_queries,
                defs,
            } => (Self::base(states_or_queries), defs),
            ClauseRecord::Compound {
                operator,
                children,
                defs,
            } => {
                let children = children
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                if operator == Operator::Not && children.len() != 1 {
                    return Err(DeserializationError::Malformed {
                        reason: format!("'not' clause with {} children", children.len()),
                    });
                }
                (Self::compound(operator, children), defs)
            }
        };

        let defs = defs
            .into_iter()
            .map(|(name, def)| Self::try_from(def).map(|c| (name, c)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clause.with_defs(defs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(p: f64) -> UnitState {
        UnitState::new(p).unwrap()
    }

    #[test]
    fn compound_parties_are_union_of_children() {
        let clause = Clause::and([
            Clause::single("alice", unit(0.7)),
            Clause::single("bob", unit(0.5)),
            Clause::named("later"),
        ]);
        let parties: Vec<&str> = clause.parties().iter().map(String::as_str).collect();
        assert_eq!(parties, vec!["alice", "bob"]);
        assert_eq!(clause.operator(), Some(Operator::And));
    }

    #[test]
    fn definitions_resolve_through_ancestors() {
        let inner = Clause::or(["x"]);
        let clause = Clause::not(inner).with_defs([("x", Clause::single("alice", unit(0.2)))]);

        // Find the named node and resolve from it.
        let named = clause
            .nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Named(_)))
            .map(NodeId)
            .unwrap();
        let def = clause.resolve(named, "x").unwrap();
        assert!(matches!(clause.node(def).kind, NodeKind::Base(_)));
        assert!(clause.resolve(named, "y").is_none());
    }

    #[test]
    fn nearest_definition_wins() {
        let inner = Clause::and(["x"]).with_defs([("x", Clause::single("inner", unit(0.1)))]);
        let outer = Clause::or([inner]).with_defs([("x", Clause::single("outer", unit(0.9)))]);

        let named = outer
            .nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Named(_)))
            .map(NodeId)
            .unwrap();
        let def = outer.resolve(named, "x").unwrap();
        assert!(outer.node(def).parties.contains("inner"));
    }

    #[test]
    fn single_party_setters() {
        let clause = Clause::party("bob").state(unit(0.4)).unwrap();
        assert_eq!(clause.parties().len(), 1);

        let clause = clause
            .query(Query::new("transferLedger", serde_json::json!({"amount": 8000})))
            .unwrap();
        assert_eq!(clause.queries().len(), 1);
    }

    #[test]
    fn setters_reject_multi_party_and_compound_clauses() {
        let multi = Clause::base([("a", Leaf::from(unit(0.1))), ("b", Leaf::from(unit(0.2)))]);
        let err = multi.state(unit(0.5)).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::AmbiguousClauseUsage { method: "state", parties: 2 }
        ));

        let empty = Clause::base(Vec::<(String, Leaf)>::new());
        assert!(matches!(
            empty.query(Query::new("o", serde_json::Value::Null)),
            Err(EvaluationError::AmbiguousClauseUsage { parties: 0, .. })
        ));

        let compound = Clause::and([Clause::party("a")]);
        let err = compound.state(unit(0.5)).unwrap_err();
        assert!(matches!(err, EvaluationError::NotABaseClause { method: "state" }));
        assert_eq!(err.to_string(), "Unclear usage of .state: not a base clause");

        assert!(matches!(
            Clause::named("later").query(Query::new("o", serde_json::Value::Null)),
            Err(EvaluationError::NotABaseClause { method: "query" })
        ));
    }

    #[test]
    fn canonical_encoding_shape() {
        let clause = Clause::not(Clause::or(["AdidX"]))
            .with_defs([("AdidX", Clause::single("alice", unit(0.7).with_source("Odin")))]);
        let json = serde_json::to_value(&clause).unwrap();

        assert_eq!(json["operator"], "not");
        assert_eq!(json["children"][0]["operator"], "or");
        assert_eq!(json["children"][0]["children"][0], "AdidX");
        assert_eq!(
            json["defs"]["AdidX"]["statesOrQueries"]["alice"]["source"],
            "Odin"
        );
    }

    #[test]
    fn decoding_rebuilds_equivalent_tree() {
        let clause = Clause::and([
            Clause::named("a"),
            Clause::single("bob", Query::new("ledger", serde_json::json!({"tag": "x"}))),
        ])
        .with_defs([("a", Clause::single("alice", UnitState::TRUE))]);

        let json = serde_json::to_string(&clause).unwrap();
        let back: Clause = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
        assert_eq!(back.queries().len(), 1);
    }

    #[test]
    fn decoding_rejects_not_with_two_children() {
        let json = serde_json::json!({"operator": "not", "children": ["a", "b"]});
        assert!(serde_json::from_value::<Clause>(json).is_err());
    }
}
