//! Clause evaluation.
//!
//! Children of `and`/`or` are evaluated left to right. After each child the
//! running per-party result is checked against the operator's absorbing
//! value (`0` for `and`, `1` for `or`); once every party has reached it the
//! remaining children are skipped, saving their oracle queries. Absorbing
//! values dominate unknowns, so skipping never changes the result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;

use super::{Clause, Leaf, NodeId, NodeKind};
use crate::config::EvaluationConfig;
use crate::error::EvaluationError;
use crate::joint::JointState;
use crate::oracle::Oracle;
use crate::query::QueryMemo;
use crate::state::{Operator, State};

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<JointState, EvaluationError>> + Send + 'a>>;

/// State of one evaluation pass: the oracle and the answers gathered so far.
///
/// Dropping the pass discards its memo, so the next pass re-queries.
pub struct EvalPass<'o> {
    oracle: &'o dyn Oracle,
    memo: QueryMemo,
    max_depth: usize,
    /// Parties reachable from a node of the clause being evaluated.
    declared: HashMap<NodeId, BTreeSet<String>>,
}

impl<'o> EvalPass<'o> {
    /// Starts a pass with an empty memo.
    #[must_use]
    pub fn new(oracle: &'o dyn Oracle, config: &EvaluationConfig) -> Self {
        Self {
            oracle,
            memo: QueryMemo::with_timeout(config.query_timeout),
            max_depth: config.max_depth,
            declared: HashMap::new(),
        }
    }

    /// Answers gathered so far.
    #[must_use]
    pub const fn memo(&self) -> &QueryMemo {
        &self.memo
    }

    /// Forgets gathered answers.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }
}

impl Clause {
    /// Evaluates the clause in a fresh pass.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UndefinedName` for an unresolvable named
    /// reference, `EvaluationError::DepthExceeded` for runaway nesting, or
    /// the oracle failure of any query that had to be run.
    pub async fn eval(
        &self,
        oracle: &dyn Oracle,
        config: &EvaluationConfig,
    ) -> Result<JointState, EvaluationError> {
        let mut pass = EvalPass::new(oracle, config);
        self.eval_in(&mut pass).await
    }

    /// Evaluates the clause within an existing pass, sharing its memo.
    ///
    /// # Errors
    ///
    /// See [`Clause::eval`].
    pub async fn eval_in(&self, pass: &mut EvalPass<'_>) -> Result<JointState, EvaluationError> {
        // Node ids are only meaningful within one clause.
        pass.declared.clear();
        self.eval_node(self.root, pass, 0).await
    }

    fn eval_node<'a>(
        &'a self,
        id: NodeId,
        pass: &'a mut EvalPass<'_>,
        depth: usize,
    ) -> EvalFuture<'a> {
        Box::pin(async move {
            if depth > pass.max_depth {
                return Err(EvaluationError::DepthExceeded {
                    max: pass.max_depth,
                });
            }

            match &self.node(id).kind {
                NodeKind::Base(leaves) => {
                    let oracle = pass.oracle;
                    let mut out = JointState::new();
                    for (party, leaf) in leaves {
                        let state = match leaf {
                            Leaf::State(state) => state.clone(),
                            Leaf::Query(query) => query.run(oracle, &mut pass.memo).await?,
                        };
                        out = out.with(party.clone(), state);
                    }
                    Ok(out)
                }
                NodeKind::Named(name) => {
                    let def = self
                        .resolve(id, name)
                        .ok_or_else(|| EvaluationError::UndefinedName { name: name.clone() })?;
                    self.eval_node(def, pass, depth + 1).await
                }
                NodeKind::Compound {
                    operator: Operator::Not,
                    children,
                } => {
                    let Some(child) = children.first().copied() else {
                        return Ok(JointState::new());
                    };
                    let state = self.eval_node(child, pass, depth + 1).await?;
                    Ok(JointState::not(&state))
                }
                NodeKind::Compound { operator, children } => {
                    self.eval_compound(*operator, id, children, pass, depth).await
                }
            }
        })
    }

    async fn eval_compound(
        &self,
        operator: Operator,
        id: NodeId,
        children: &[NodeId],
        pass: &mut EvalPass<'_>,
        depth: usize,
    ) -> Result<JointState, EvaluationError> {
        let declared = self.declared_parties(id, &mut pass.declared).clone();
        let absorbing = operator.absorbing();
        let identity = operator.identity();

        let mut running: BTreeMap<String, Option<f64>> = BTreeMap::new();
        let mut evaluated = Vec::with_capacity(children.len());

        for (index, child) in children.iter().enumerate() {
            let state = self.eval_node(*child, pass, depth + 1).await?;

            let seen: BTreeSet<String> = running
                .keys()
                .cloned()
                .chain(state.parties().map(str::to_string))
                .collect();
            for party in seen {
                let before = running.get(&party).copied().unwrap_or(identity);
                let after = state.get(&party).map_or(identity, State::p);
                running.insert(party, operator.combine([before, after]));
            }
            evaluated.push(state);

            let remaining = children.len() - index - 1;
            if remaining > 0
                && !running.is_empty()
                && declared
                    .iter()
                    .chain(running.keys())
                    .all(|party| running.get(party).copied().flatten() == absorbing)
            {
                tracing::debug!(%operator, skipped = remaining, "clause short-circuited");
                break;
            }
        }

        Ok(JointState::lift(operator, &evaluated))
    }

    /// Parties reachable from `id` through children and named references.
    ///
    /// Each node is visited at most once per call, so self-referencing
    /// definitions terminate. Unresolvable names contribute nothing here;
    /// they fail only if evaluation actually reaches them.
    fn declared_parties<'m>(
        &self,
        id: NodeId,
        memo: &'m mut HashMap<NodeId, BTreeSet<String>>,
    ) -> &'m BTreeSet<String> {
        if !memo.contains_key(&id) {
            let mut parties = BTreeSet::new();
            let mut visited = BTreeSet::from([id]);
            let mut stack = vec![id];

            while let Some(current) = stack.pop() {
                let node = self.node(current);
                if !node.has_names {
                    parties.extend(node.parties.iter().cloned());
                    continue;
                }
                if current != id {
                    if let Some(known) = memo.get(&current) {
                        parties.extend(known.iter().cloned());
                        continue;
                    }
                }
                let next: Vec<NodeId> = match &node.kind {
                    NodeKind::Base(leaves) => {
                        parties.extend(leaves.keys().cloned());
                        Vec::new()
                    }
                    NodeKind::Named(name) => self.resolve(current, name).into_iter().collect(),
                    NodeKind::Compound { children, .. } => children.clone(),
                };
                for child in next {
                    if visited.insert(child) {
                        stack.push(child);
                    }
                }
            }
            memo.insert(id, parties);
        }
        memo.entry(id).or_default()
    }
}
