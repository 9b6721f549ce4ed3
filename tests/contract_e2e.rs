use oc_contracts::{
    Clause, Contract, ContractBody, ContractError, EvaluationConfig, EvaluationError, ExecutionError,
    InMemoryRegistry, JointState, Operator, Oracle, OracleError, OracleSet, Predicate, Query, State,
    UnitState,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Oracle that answers from a fixed table and counts calls.
#[derive(Default)]
struct LedgerOracle {
    calls: AtomicUsize,
}

#[async_trait]
impl Oracle for LedgerOracle {
    async fn query(&self, query: &Query) -> Result<UnitState, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let p = query.params()["p"]
            .as_f64()
            .ok_or_else(|| OracleError::new("missing p"))?;
        UnitState::new(p)
            .map(|s| s.with_source(format!("local/{}", query.oracle())))
            .map_err(|e| OracleError::new(e.to_string()))
    }
}

struct SlowOracle;

#[async_trait]
impl Oracle for SlowOracle {
    async fn query(&self, _query: &Query) -> Result<UnitState, OracleError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(UnitState::TRUE)
    }
}

#[tokio::test]
async fn two_party_conjunction_keeps_audit_tree() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let (bob, _) = registry.issue_party("bob").unwrap();

    let paid = UnitState::new(0.7).unwrap().with_source("local/payments");
    let delivered = UnitState::new(0.5).unwrap().with_source("local/shipping");
    let mut contract = Contract::builder()
        .parties([alice, bob])
        .clause(Clause::and([
            Clause::single("alice", paid.clone()),
            Clause::single("alice", delivered.clone()),
            Clause::single("bob", UnitState::TRUE),
        ]))
        .build()
        .unwrap();

    contract.update(&OracleSet::new("local")).await.unwrap();
    let valid = contract.valid().unwrap();

    let alice = valid.get("alice").unwrap();
    assert!((alice.p().unwrap() - 0.35).abs() < 1e-12);
    assert_eq!(alice.operator(), Some(Operator::And));
    let leaves: Vec<&State> = alice
        .children()
        .iter()
        .filter(|c| c.source().is_some())
        .collect();
    assert_eq!(leaves, vec![&State::Unit(paid), &State::Unit(delivered)]);

    assert_eq!(valid.p("bob"), Some(1.0));
}

#[tokio::test]
async fn signed_map_tracks_each_party() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, alice_key) = registry.issue_party("alice").unwrap();
    let (bob, _) = registry.issue_party("bob").unwrap();

    let mut contract = Contract::builder().parties([alice, bob]).build().unwrap();
    contract.update(&OracleSet::new("local")).await.unwrap();
    let signed = contract.signed().unwrap();
    assert!(!signed["alice"]);
    assert!(!signed["bob"]);

    contract.sign([("alice", &alice_key)]).unwrap();
    let signed = contract.signed().unwrap();
    assert!(signed["alice"]);
    assert!(!signed["bob"]);

    let sha = *contract.sha_msg();
    let signature = contract.signatures()["alice"].clone();
    contract.sign([("alice", &alice_key)]).unwrap();
    assert_eq!(*contract.sha_msg(), sha);
    assert_eq!(contract.signatures()["alice"], signature);
}

#[tokio::test]
async fn oracle_queries_are_shared_within_one_update() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let (bob, _) = registry.issue_party("bob").unwrap();

    let paid = Query::new("payments", json!({"p": 0.8}));
    let clause = Clause::and(["AlicePaid", "BobPaid"]).with_defs([
        ("AlicePaid", Clause::single("alice", paid.clone())),
        ("BobPaid", Clause::single("bob", paid)),
    ]);
    let mut contract = Contract::builder()
        .parties([alice, bob])
        .clause(clause)
        .build()
        .unwrap();

    let oracle = LedgerOracle::default();
    contract.update(&oracle).await.unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert_eq!(contract.valid().unwrap().p("alice"), Some(0.8));
    assert_eq!(contract.valid().unwrap().p("bob"), Some(0.8));

    // A new update is a new pass: evidence is fetched again.
    contract.update(&oracle).await.unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn oracle_failure_is_retryable_and_leaves_state() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();

    let mut contract = Contract::builder()
        .party(alice)
        .clause(Clause::single("alice", Query::new("payments", json!({"p": 0.6}))))
        .build()
        .unwrap();
    contract.update(&LedgerOracle::default()).await.unwrap();

    let err = contract.update(&OracleSet::new("local")).await.unwrap_err();
    assert!(matches!(err, ContractError::Evaluation(EvaluationError::Oracle { .. })));
    assert!(err.is_retryable());
    assert_eq!(contract.valid().unwrap().p("alice"), Some(0.6));
}

#[tokio::test]
async fn slow_oracle_times_out() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();

    let mut contract = Contract::builder()
        .party(alice)
        .clause(Clause::single("alice", Query::new("slow", json!(null))))
        .config(EvaluationConfig::default().with_query_timeout(Duration::from_millis(20)))
        .build()
        .unwrap();

    let err = contract.update(&SlowOracle).await.unwrap_err();
    assert!(matches!(
        err,
        ContractError::Evaluation(EvaluationError::QueryTimedOut { timeout_ms: 20, .. })
    ));
    assert!(contract.valid().is_none());
}

#[tokio::test]
async fn undefined_name_is_fatal() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();

    let mut contract = Contract::builder()
        .party(alice)
        .clause(Clause::and(["AlicePaid", "Typo"]).with_defs([(
            "AlicePaid",
            Clause::single("alice", UnitState::TRUE),
        )]))
        .build()
        .unwrap();

    let err = contract.update(&OracleSet::new("local")).await.unwrap_err();
    assert!(matches!(
        err,
        ContractError::Evaluation(EvaluationError::UndefinedName { ref name }) if name == "Typo"
    ));
}

#[tokio::test]
async fn expr_contract_with_expiry() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let (bob, _) = registry.issue_party("bob").unwrap();

    let mut contract = Contract::builder()
        .parties([alice, bob])
        .source("expr", "* = true\nbob = 0.9 @ local/escrow")
        .is_expired_source("expr", "after 2000-01-01T00:00:00Z")
        .build()
        .unwrap();

    contract.update(&OracleSet::new("local")).await.unwrap();
    assert_eq!(contract.valid().unwrap().p("alice"), Some(1.0));
    assert_eq!(contract.valid().unwrap().p("bob"), Some(0.9));
    assert_eq!(contract.expired(), Some(true));
    assert_eq!(contract.revoked(), Some(false));
}

#[tokio::test]
async fn callables_assign_rights_on_successful_update() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let (bob, _) = registry.issue_party("bob").unwrap();
    let porsche = registry.issue_right("alicesPorsche").unwrap();

    let transfer = ContractBody::native("transfer_porsche", |ctx| {
        let bob = ctx.party("bob").cloned().ok_or("bob missing")?;
        let right = ctx.right_mut("alicesPorsche").ok_or("right missing")?;
        right.assign(&bob, UnitState::TRUE.with_source("local/dmv"));
        Ok(JointState::uniform(ctx.party_names(), &UnitState::TRUE))
    });

    let mut contract = Contract::builder()
        .parties([alice, bob])
        .body(transfer)
        .right(porsche)
        .is_revoked_source("expr", "assigned alicesPorsche")
        .registry("local")
        .build()
        .unwrap();
    assert!(contract.right("alicesPorsche").unwrap().valid().is_empty());

    contract.update(&OracleSet::new("local")).await.unwrap();
    let held = contract.right("alicesPorsche").unwrap().valid();
    assert_eq!(held.p("bob"), Some(1.0));
    assert_eq!(contract.revoked(), Some(true));
}

#[tokio::test]
async fn failing_callable_rolls_back_rights() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let porsche = registry.issue_right("alicesPorsche").unwrap();

    let body = ContractBody::native("grab_then_fail", |ctx| {
        let alice = ctx.party("alice").cloned().ok_or("alice missing")?;
        if let Some(right) = ctx.right_mut("alicesPorsche") {
            right.assign(&alice, UnitState::TRUE);
        }
        Err("ledger unavailable".into())
    });

    let mut contract = Contract::builder()
        .party(alice)
        .body(body)
        .right(porsche)
        .build()
        .unwrap();

    let err = contract.update(&OracleSet::new("local")).await.unwrap_err();
    assert!(matches!(err, ContractError::Execution(ExecutionError::Sandbox { .. })));
    assert!(contract.right("alicesPorsche").unwrap().valid().is_empty());
    assert!(contract.valid().is_none());
}

#[tokio::test]
async fn predicate_sees_update_instant() {
    let registry = InMemoryRegistry::new("local").unwrap();
    let (alice, _) = registry.issue_party("alice").unwrap();
    let deadline = chrono::DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let mut contract = Contract::builder()
        .party(alice)
        .is_expired(Predicate::native("past_deadline", move |ctx| Ok(ctx.now() >= deadline)))
        .build()
        .unwrap();

    let oracle: Arc<dyn Oracle> = Arc::new(OracleSet::new("local"));
    contract
        .update_at(&oracle, deadline - chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(contract.expired(), Some(false));
    contract.update_at(&oracle, deadline).await.unwrap();
    assert_eq!(contract.expired(), Some(true));
}
