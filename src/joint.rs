//! Per-party belief maps.
//!
//! A [`JointState`] is the unit of contract validity: one belief per party.
//! Operators are lifted point-wise across the union of parties present in
//! the operands. A party missing from an operand is replaced by that
//! operator's identity leaf (`TRUE` for `and`, `FALSE` for `or`), so it does
//! not affect that operand's contribution to the party's belief.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::state::{CompoundState, Operator, State, UnitState};

/// Mapping from party name to belief.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointState(BTreeMap<String, State>);

impl JointState {
    /// Creates an empty joint state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of `self` with `party` set to `state`.
    #[must_use]
    pub fn with(mut self, party: impl Into<String>, state: impl Into<State>) -> Self {
        self.0.insert(party.into(), state.into());
        self
    }

    /// Every party in `parties` gets the same state.
    pub fn uniform<I, S>(parties: I, state: &UnitState) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            parties
                .into_iter()
                .map(|party| (party.into(), State::Unit(state.clone())))
                .collect(),
        )
    }

    /// State for `party`, with its audit tree.
    #[must_use]
    pub fn get(&self, party: &str) -> Option<&State> {
        self.0.get(party)
    }

    /// Probability for `party`, `None` when the party is absent or undefined.
    #[must_use]
    pub fn p(&self, party: &str) -> Option<f64> {
        self.0.get(party).and_then(State::p)
    }

    /// Parties with a state, sorted.
    pub fn parties(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Party/state pairs, sorted by party.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &State)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parties with a state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no party has a state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flattens to party -> probability, dropping the audit tree.
    #[must_use]
    pub fn probabilities(&self) -> BTreeMap<String, Option<f64>> {
        self.0.iter().map(|(k, v)| (k.clone(), v.p())).collect()
    }

    /// Point-wise conjunction.
    #[must_use]
    pub fn and(children: &[JointState]) -> Self {
        Self::lift(Operator::And, children)
    }

    /// Point-wise disjunction.
    #[must_use]
    pub fn or(children: &[JointState]) -> Self {
        Self::lift(Operator::Or, children)
    }

    /// Point-wise complement.
    #[must_use]
    pub fn not(child: &JointState) -> Self {
        Self(
            child
                .0
                .iter()
                .map(|(party, state)| (party.clone(), State::not(state.clone()).into()))
                .collect(),
        )
    }

    /// Conjunction of `self` followed by `others`.
    #[must_use]
    pub fn and_with(&self, others: &[JointState]) -> Self {
        Self::and(&self.prepend(others))
    }

    /// Disjunction of `self` followed by `others`.
    #[must_use]
    pub fn or_with(&self, others: &[JointState]) -> Self {
        Self::or(&self.prepend(others))
    }

    /// Same as [`JointState::not`].
    #[must_use]
    pub fn negate(&self) -> Self {
        Self::not(self)
    }

    /// Applies `operator` per party across `children`.
    ///
    /// For `Operator::Not` only the first child is used.
    #[must_use]
    pub fn lift(operator: Operator, children: &[JointState]) -> Self {
        if operator == Operator::Not {
            return children.first().map(Self::not).unwrap_or_default();
        }

        let identity = State::Unit(operator.identity_state());
        let parties: BTreeSet<&String> = children.iter().flat_map(|c| c.0.keys()).collect();

        let combined = parties
            .into_iter()
            .map(|party| {
                let operands = children
                    .iter()
                    .map(|child| child.0.get(party).cloned().unwrap_or_else(|| identity.clone()))
                    .collect();
                (party.clone(), State::Compound(CompoundState::new(operator, operands)))
            })
            .collect();
        Self(combined)
    }

    fn prepend(&self, others: &[JointState]) -> Vec<JointState> {
        let mut all = Vec::with_capacity(others.len() + 1);
        all.push(self.clone());
        all.extend_from_slice(others);
        all
    }
}

impl FromIterator<(String, State)> for JointState {
    fn from_iter<T: IntoIterator<Item = (String, State)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a JointState {
    type Item = (&'a String, &'a State);
    type IntoIter = std::collections::btree_map::Iter<'a, String, State>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
