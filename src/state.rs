//! Belief states and their probability algebra.
//!
//! A [`UnitState`] is a leaf belief: a probability (or `None` for "no
//! evidence") plus an optional provenance tag. A [`CompoundState`] records
//! the result of combining children through `and` / `or` / `not` and keeps
//! the children verbatim for audit.
//!
//! The combination rules are Kleene-style: an operator's absorbing value
//! dominates unknowns, otherwise an unknown child makes the result unknown.
//!
//! | operator | absorbing | identity | result                    |
//! |----------|-----------|----------|---------------------------|
//! | `and`    | `0`       | `1`      | `Π p`                     |
//! | `or`     | `1`       | `0`      | `1 - Π (1 - p)`           |
//! | `not`    | -         | -        | `1 - p`                   |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::source::Provenance;

/// Boolean operator generalized to probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// Complement.
    Not,
}

impl Operator {
    /// Value substituted for a party that is absent from one operand.
    ///
    /// `not` is unary and has no identity; it reports `None`.
    #[must_use]
    pub const fn identity(self) -> Option<f64> {
        match self {
            Self::And => Some(1.0),
            Self::Or => Some(0.0),
            Self::Not => None,
        }
    }

    /// Value that fixes the result no matter what the other operands are.
    #[must_use]
    pub const fn absorbing(self) -> Option<f64> {
        match self {
            Self::And => Some(0.0),
            Self::Or => Some(1.0),
            Self::Not => None,
        }
    }

    /// Returns the identity leaf for this operator.
    #[must_use]
    pub const fn identity_state(self) -> UnitState {
        match self {
            Self::Or => UnitState::FALSE,
            Self::And | Self::Not => UnitState::TRUE,
        }
    }

    /// Combines child probabilities.
    ///
    /// For `not` only the first child is considered; an empty input gives
    /// `None`.
    pub fn combine<I>(self, probabilities: I) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        match self {
            Self::Not => probabilities.into_iter().next().flatten().map(|p| 1.0 - p),
            Self::And => {
                let mut product = Some(1.0);
                for p in probabilities {
                    match p {
                        Some(p) if p == 0.0 => return Some(0.0),
                        Some(p) => product = product.map(|acc| acc * p),
                        None => product = None,
                    }
                }
                product
            }
            Self::Or => {
                let mut complement = Some(1.0);
                for p in probabilities {
                    match p {
                        Some(p) if p == 1.0 => return Some(1.0),
                        Some(p) => complement = complement.map(|acc| acc * (1.0 - p)),
                        None => complement = None,
                    }
                }
                complement.map(|c| 1.0 - c)
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Not => write!(f, "not"),
        }
    }
}

#[derive(Deserialize)]
struct UnitStateRecord {
    p: Option<f64>,
    #[serde(default)]
    source: Option<Provenance>,
}

/// Leaf belief: probability plus provenance.
///
/// # Examples
///
/// ```
/// use oc_contracts::UnitState;
///
/// let x = UnitState::new(0.7).unwrap().with_source("Odin");
/// assert_eq!(x.p(), Some(0.7));
/// assert!(UnitState::new(1.2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UnitStateRecord")]
pub struct UnitState {
    p: Option<f64>,
    source: Option<Provenance>,
}

impl UnitState {
    /// Certainly true, no provenance.
    pub const TRUE: Self = Self {
        p: Some(1.0),
        source: None,
    };

    /// Certainly false, no provenance.
    pub const FALSE: Self = Self {
        p: Some(0.0),
        source: None,
    };

    /// No evidence either way.
    pub const UNDEFINED: Self = Self { p: None, source: None };

    /// Creates a leaf with a known probability.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ProbabilityOutOfRange` if `p` is NaN or
    /// outside `[0.0, 1.0]`.
    pub fn new(p: f64) -> Result<Self, ValidationError> {
        Self::from_option(Some(p))
    }

    /// Creates a leaf whose probability may be unknown.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ProbabilityOutOfRange` for an invalid value.
    pub fn from_option(p: Option<f64>) -> Result<Self, ValidationError> {
        if let Some(value) = p {
            validate_probability(value)?;
        }
        Ok(Self { p, source: None })
    }

    /// Attaches a provenance tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Provenance>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Probability, `None` when there is no evidence.
    pub const fn p(&self) -> Option<f64> {
        self.p
    }

    /// Provenance tag, if any.
    pub const fn source(&self) -> Option<&Provenance> {
        self.source.as_ref()
    }

    /// Returns true if there is no evidence for this leaf.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        self.p.is_none()
    }
}

impl TryFrom<UnitStateRecord> for UnitState {
    type Error = ValidationError;

    fn try_from(record: UnitStateRecord) -> Result<Self, Self::Error> {
        let state = Self::from_option(record.p)?;
        Ok(match record.source {
            Some(source) => state.with_source(source),
            None => state,
        })
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.p {
            Some(p) => write!(f, "{p:.3}")?,
            None => write!(f, "undefined")?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

fn validate_probability(value: f64) -> Result<(), ValidationError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ProbabilityOutOfRange { value });
    }
    Ok(())
}

/// Result of combining child states. `p` is derived, never set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundState {
    p: Option<f64>,
    operator: Operator,
    children: Vec<State>,
}

impl CompoundState {
    /// Combines `children` with `operator`, deriving `p`.
    #[must_use]
    pub fn new(operator: Operator, children: Vec<State>) -> Self {
        let p = operator.combine(children.iter().map(State::p));
        Self {
            p,
            operator,
            children,
        }
    }

    /// Derived probability.
    pub const fn p(&self) -> Option<f64> {
        self.p
    }

    /// Operator that combined the children.
    pub const fn operator(&self) -> Operator {
        self.operator
    }

    /// Combined children, in order.
    pub fn children(&self) -> &[State] {
        &self.children
    }
}

/// A leaf or compound belief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum State {
    /// Result of an operator.
    Compound(CompoundState),
    /// Leaf belief.
    Unit(UnitState),
}

impl State {
    /// Conjunction: product of child probabilities.
    #[must_use]
    pub fn and<I: IntoIterator<Item = State>>(children: I) -> CompoundState {
        CompoundState::new(Operator::And, children.into_iter().collect())
    }

    /// Disjunction: `1 - Π(1 - p)`.
    #[must_use]
    pub fn or<I: IntoIterator<Item = State>>(children: I) -> CompoundState {
        CompoundState::new(Operator::Or, children.into_iter().collect())
    }

    /// Complement: `1 - p`.
    #[must_use]
    pub fn not(child: State) -> CompoundState {
        CompoundState::new(Operator::Not, vec![child])
    }

    /// Conjunction of `self` followed by `others`.
    #[must_use]
    pub fn and_with<I: IntoIterator<Item = State>>(self, others: I) -> CompoundState {
        Self::and(std::iter::once(self).chain(others))
    }

    /// Disjunction of `self` followed by `others`.
    #[must_use]
    pub fn or_with<I: IntoIterator<Item = State>>(self, others: I) -> CompoundState {
        Self::or(std::iter::once(self).chain(others))
    }

    /// Same as [`State::not`].
    #[must_use]
    pub fn negate(self) -> CompoundState {
        Self::not(self)
    }

    /// Probability of the leaf or compound.
    pub const fn p(&self) -> Option<f64> {
        match self {
            Self::Compound(c) => c.p,
            Self::Unit(u) => u.p,
        }
    }

    /// Provenance of a leaf. Compound states carry provenance in their children.
    pub const fn source(&self) -> Option<&Provenance> {
        match self {
            Self::Compound(_) => None,
            Self::Unit(u) => u.source(),
        }
    }

    /// Operator of a compound state; `None` for a leaf.
    pub const fn operator(&self) -> Option<Operator> {
        match self {
            Self::Compound(c) => Some(c.operator),
            Self::Unit(_) => None,
        }
    }

    /// Children of a compound state; empty for a leaf.
    pub fn children(&self) -> &[State] {
        match self {
            Self::Compound(c) => &c.children,
            Self::Unit(_) => &[],
        }
    }

    /// Collects every provenance tag in this subtree, depth-first.
    #[must_use]
    pub fn provenance(&self) -> Vec<&Provenance> {
        let mut out = Vec::new();
        self.collect_provenance(&mut out);
        out
    }

    fn collect_provenance<'a>(&'a self, out: &mut Vec<&'a Provenance>) {
        match self {
            Self::Unit(u) => out.extend(u.source()),
            Self::Compound(c) => {
                for child in &c.children {
                    child.collect_provenance(out);
                }
            }
        }
    }
}

impl From<UnitState> for State {
    fn from(state: UnitState) -> Self {
        Self::Unit(state)
    }
}

impl From<CompoundState> for State {
    fn from(state: CompoundState) -> Self {
        Self::Compound(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(p: f64) -> State {
        UnitState::new(p).unwrap().into()
    }

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn test_unit_state_validation() {
        assert!(UnitState::new(0.0).is_ok());
        assert!(UnitState::new(1.0).is_ok());
        assert!(UnitState::new(-0.1).is_err());
        assert!(UnitState::new(1.1).is_err());
        assert!(UnitState::new(f64::NAN).is_err());
        assert!(UnitState::from_option(None).unwrap().is_undefined());
    }

    #[test]
    fn test_singletons_have_no_provenance() {
        assert_eq!(UnitState::TRUE.p(), Some(1.0));
        assert_eq!(UnitState::FALSE.p(), Some(0.0));
        assert!(UnitState::TRUE.source().is_none());
        assert!(UnitState::UNDEFINED.is_undefined());
    }

    #[test]
    fn test_and_is_product() {
        let s = State::and([unit(0.7), unit(0.5)]);
        assert!(approx(s.p(), 0.35));
        assert_eq!(s.operator(), Operator::And);
        assert_eq!(s.children().len(), 2);
    }

    #[test]
    fn test_or_is_complement_product() {
        let s = State::or([unit(0.7), unit(0.5)]);
        assert!(approx(s.p(), 1.0 - 0.3 * 0.5));
    }

    #[test]
    fn test_not_complements() {
        assert!(approx(State::not(unit(0.7)).p(), 0.3));
        assert_eq!(State::not(UnitState::UNDEFINED.into()).p(), None);
    }

    #[test]
    fn test_null_poisons_and_and_or() {
        assert_eq!(State::and([unit(0.5), UnitState::UNDEFINED.into()]).p(), None);
        assert_eq!(State::or([unit(0.5), UnitState::UNDEFINED.into()]).p(), None);
        assert_eq!(State::or([UnitState::UNDEFINED.into(), unit(0.5)]).p(), None);
    }

    #[test]
    fn test_absorbing_value_dominates_null() {
        assert_eq!(State::and([UnitState::UNDEFINED.into(), unit(0.0)]).p(), Some(0.0));
        assert_eq!(State::or([UnitState::UNDEFINED.into(), unit(1.0)]).p(), Some(1.0));
    }

    #[test]
    fn test_empty_operands_give_identity() {
        assert_eq!(State::and(Vec::<State>::new()).p(), Some(1.0));
        assert_eq!(State::or(Vec::<State>::new()).p(), Some(0.0));
    }

    #[test]
    fn test_children_retained_verbatim() {
        let x = UnitState::new(0.7).unwrap().with_source("Odin");
        let y = UnitState::new(0.5).unwrap().with_source("Vishnu");
        let s: State = State::and([x.clone().into(), y.clone().into()]).into();
        assert_eq!(s.children(), &[State::Unit(x), State::Unit(y)]);
        let tags: Vec<&str> = s.provenance().iter().map(|p| p.as_str()).collect();
        assert_eq!(tags, vec!["Odin", "Vishnu"]);
    }

    #[test]
    fn test_instance_combinators() {
        let s = unit(0.5).and_with([unit(0.5)]);
        assert!(approx(s.p(), 0.25));
        let n = State::from(s).negate();
        assert!(approx(n.p(), 0.75));
    }

    #[test]
    fn test_state_serde_shape() {
        let s: State = State::and([UnitState::new(0.5).unwrap().with_source("Odin").into()]).into();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["operator"], "and");
        assert_eq!(json["children"][0]["source"], "Odin");

        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        let res: Result<UnitState, _> = serde_json::from_str(r#"{"p": 2.0}"#);
        assert!(res.is_err());
    }
}
