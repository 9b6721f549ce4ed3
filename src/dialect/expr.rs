//! The built-in `expr` dialect.
//!
//! Bodies are assignment lists, one per line or separated by `;`:
//!
//! ```text
//! * = true
//! bob = 0.5 @ local/weather
//! carol = unknown
//! ```
//!
//! `*` stands for every bound party; later assignments override earlier
//! ones. Predicates are a single expression: `true`, `false`,
//! `after <rfc3339>`, `before <rfc3339>` (compared against the update
//! instant) or `assigned <right>` (the right has a holder).

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::body::{BodyFn, CallableError, PredicateFn};
use crate::contract::ContractContext;
use crate::error::DeserializationError;
use crate::joint::JointState;
use crate::state::UnitState;

use super::{Bindings, Dialect};

const NAME: &str = "expr";

const LIBRARY: &[&str] = &["true", "false", "unknown", "after", "before", "assigned", "*"];

static ASSIGNMENT: OnceLock<Regex> = OnceLock::new();
static TIME_BOUND: OnceLock<Regex> = OnceLock::new();
static ASSIGNED: OnceLock<Regex> = OnceLock::new();

fn grammar(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex, DeserializationError> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let compiled = Regex::new(pattern).map_err(|e| compile_error(format!("grammar: {e}")))?;
    Ok(cell.get_or_init(|| compiled))
}

fn predicate<F>(f: F) -> PredicateFn
where
    F: Fn(&mut ContractContext<'_>) -> Result<bool, CallableError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn compile_error(reason: impl Into<String>) -> DeserializationError {
    DeserializationError::Compile {
        dialect: NAME.to_string(),
        reason: reason.into(),
    }
}

/// Assignment-list dialect for bodies, time-bound predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprDialect;

impl ExprDialect {
    /// The dialect; it holds no state.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn parse_value(literal: &str) -> Result<UnitState, DeserializationError> {
        match literal {
            "true" => Ok(UnitState::TRUE),
            "false" => Ok(UnitState::FALSE),
            "unknown" => Ok(UnitState::UNDEFINED),
            number => {
                let p: f64 = number
                    .parse()
                    .map_err(|_| compile_error(format!("not a probability: '{number}'")))?;
                UnitState::new(p).map_err(|e| compile_error(e.to_string()))
            }
        }
    }

    fn parse_body(source: &str, bindings: &Bindings) -> Result<JointState, DeserializationError> {
        let assignment = grammar(
            &ASSIGNMENT,
            r"^(?P<party>\*|[A-Za-z_][A-Za-z0-9_.-]*)\s*=\s*(?P<value>true|false|unknown|[0-9]+(?:\.[0-9]+)?)\s*(?:@\s*(?P<source>\S+))?$",
        )?;

        let mut state = JointState::new();
        for statement in source.split(['\n', ';']) {
            let statement = statement.trim();
            if statement.is_empty() || statement.starts_with('#') {
                continue;
            }
            let caps = assignment
                .captures(statement)
                .ok_or_else(|| compile_error(format!("cannot parse '{statement}'")))?;

            let mut value = Self::parse_value(&caps["value"])?;
            if let Some(source) = caps.name("source") {
                value = value.with_source(source.as_str());
            }

            match &caps["party"] {
                "*" => {
                    for party in &bindings.parties {
                        state = state.with(party.clone(), value.clone());
                    }
                }
                party if bindings.parties.contains(party) => {
                    state = state.with(party, value);
                }
                party => return Err(compile_error(format!("unbound symbol '{party}'"))),
            }
        }
        Ok(state)
    }
}

impl Dialect for ExprDialect {
    fn name(&self) -> &str {
        NAME
    }

    fn library(&self) -> &[&'static str] {
        LIBRARY
    }

    fn compile_body(&self, source: &str, bindings: &Bindings) -> Result<BodyFn, DeserializationError> {
        let state = Self::parse_body(source, bindings)?;
        let body: BodyFn = Arc::new(move |_ctx: &mut ContractContext<'_>| -> Result<JointState, CallableError> {
            Ok(state.clone())
        });
        Ok(body)
    }

    fn compile_predicate(
        &self,
        source: &str,
        bindings: &Bindings,
    ) -> Result<PredicateFn, DeserializationError> {
        let source = source.trim();
        match source {
            "true" => return Ok(predicate(|_| Ok(true))),
            "false" => return Ok(predicate(|_| Ok(false))),
            _ => {}
        }

        let time_bound = grammar(&TIME_BOUND, r"^(?P<op>after|before)\s+(?P<at>\S+)$")?;
        if let Some(caps) = time_bound.captures(source) {
            let at: DateTime<Utc> = DateTime::parse_from_rfc3339(&caps["at"])
                .map_err(|e| compile_error(format!("bad timestamp '{}': {e}", &caps["at"])))?
                .with_timezone(&Utc);
            if &caps["op"] == "after" {
                return Ok(predicate(move |ctx| Ok(ctx.now() > at)));
            }
            return Ok(predicate(move |ctx| Ok(ctx.now() < at)));
        }

        let assigned = grammar(&ASSIGNED, r"^assigned\s+(?P<right>[A-Za-z_][A-Za-z0-9_.-]*)$")?;
        if let Some(caps) = assigned.captures(source) {
            let right = caps["right"].to_string();
            if !bindings.rights.contains(&right) {
                return Err(compile_error(format!("unbound symbol '{right}'")));
            }
            return Ok(predicate(move |ctx| {
                let held = ctx.right(&right).ok_or_else(|| format!("right '{right}' is not declared"))?;
                Ok(!held.valid().is_empty())
            }));
        }

        Err(compile_error(format!("cannot parse '{source}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::{Party, Right};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn bindings() -> Bindings {
        Bindings::new(["alice", "bob"], ["car"])
    }

    fn fixtures() -> (BTreeMap<String, Party>, BTreeMap<String, Right>) {
        let parties = ["alice", "bob"]
            .into_iter()
            .map(|n| (n.to_string(), Party::unkeyed(n).unwrap()))
            .collect();
        let mut rights = BTreeMap::new();
        rights.insert("car".to_string(), Right::new("car").unwrap());
        (parties, rights)
    }

    #[test]
    fn wildcard_then_override() {
        let state = ExprDialect::parse_body("* = true; bob = 0.25 @ local/weather", &bindings()).unwrap();
        assert_eq!(state.p("alice"), Some(1.0));
        assert_eq!(state.p("bob"), Some(0.25));
        assert_eq!(
            state.get("bob").and_then(|s| s.source()).map(|s| s.as_str()),
            Some("local/weather")
        );
    }

    #[test]
    fn comments_blank_lines_and_unknown() {
        let state = ExprDialect::parse_body("# header\n\nalice = unknown\n", &bindings()).unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.get("alice").unwrap().p().is_none());
    }

    #[test]
    fn rejects_unbound_and_out_of_range() {
        let err = ExprDialect::parse_body("mallory = 1", &bindings()).unwrap_err();
        assert!(err.to_string().contains("unbound symbol 'mallory'"));

        assert!(ExprDialect::parse_body("alice = 1.5", &bindings()).is_err());
        assert!(ExprDialect::parse_body("alice := 1", &bindings()).is_err());
    }

    #[test]
    fn time_bound_predicates() {
        let (parties, mut rights) = fixtures();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut ctx = ContractContext::new(&parties, &mut rights, None, now);

        let dialect = ExprDialect::new();
        let after = dialect.compile_predicate("after 2024-01-01T00:00:00Z", &bindings()).unwrap();
        let before = dialect.compile_predicate("before 2024-01-01T00:00:00Z", &bindings()).unwrap();
        assert!(after(&mut ctx).unwrap());
        assert!(!before(&mut ctx).unwrap());

        assert!(dialect.compile_predicate("after yesterday", &bindings()).is_err());
    }

    #[test]
    fn assigned_predicate_reads_rights() {
        let (parties, mut rights) = fixtures();
        let dialect = ExprDialect::new();
        let revoked = dialect.compile_predicate("assigned car", &bindings()).unwrap();
        assert!(dialect.compile_predicate("assigned boat", &bindings()).is_err());

        {
            let mut ctx = ContractContext::new(&parties, &mut rights, None, Utc::now());
            assert!(!revoked(&mut ctx).unwrap());
        }
        let bob = parties["bob"].clone();
        rights.get_mut("car").unwrap().assign(&bob, UnitState::TRUE);
        let mut ctx = ContractContext::new(&parties, &mut rights, None, Utc::now());
        assert!(revoked(&mut ctx).unwrap());
    }

    #[test]
    fn library_lists_keywords() {
        assert!(ExprDialect::new().library().contains(&"after"));
        assert_eq!(ExprDialect::new().name(), "expr");
    }
}
