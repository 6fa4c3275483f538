//! Flow-rule automaton and centroid routing as seen through the public API.

use dualsub_engine::flow_rule::{ALLOWED_DIRECT, transition_allowed};
use dualsub_engine::types::{CentroidDigit, FlowRuleViolation, Node};
use dualsub_engine::{
    CycleAutomorphismService, EdgeKind, FixedCentroid, traverse, validate_prime_sequence,
};

use crate::common::memory_ledger;

#[test]
fn self_transitions_are_always_legal() {
    for node in Node::ALL {
        assert!(transition_allowed(node, node), "{node}");
    }
}

#[test]
fn two_then_three_needs_exactly_one_flip() {
    assert!(!ALLOWED_DIRECT.contains(&(Node::S0, Node::S1)));
    assert_ne!(Node::S0.parity(), Node::S1.parity());
    assert!(!transition_allowed(Node::S0, Node::S1));

    let service = CycleAutomorphismService::new(FixedCentroid(CentroidDigit::Zero));
    let flags = service.derive_via_flags(&[2, 3]).expect("base primes");
    let cycle = service.plan(&[2, 3], &flags).expect("plan");
    assert!(cycle.steps[1].via_centroid);
    assert_eq!(cycle.flips, 1);
    assert_eq!(cycle.final_centroid, CentroidDigit::One);
}

#[test]
fn ledger_anchor_routes_and_reports() {
    let ledger = memory_ledger();
    let report = ledger.anchor("e", &[(2, 1), (3, 1)], true).expect("anchor");
    assert_eq!(report.cycle.flips, 1);
    assert_eq!(
        report.violations,
        vec![FlowRuleViolation {
            src: Node::S0,
            dst: Node::S1
        }]
    );
    let events = ledger.events().events_for("e").expect("events");
    assert!(!events[0].via_centroid);
    assert!(events[1].via_centroid);
    assert_eq!(events[1].centroid_digit, CentroidDigit::One);
}

#[test]
fn lawful_sequence_reports_no_violations() {
    let ledger = memory_ledger();
    // S1 -> S2 is whitelisted, S2 -> S4 stays even.
    let report = ledger
        .anchor("e", &[(3, 1), (5, 1), (11, 1)], true)
        .expect("anchor");
    assert!(report.violations.is_empty());
    assert!(validate_prime_sequence(&[3, 5, 11]).expect("check").is_lawful());
}

#[test]
fn traversal_from_an_odd_node_ends_in_persistence() {
    let walk = traverse(Node::S7, 4, CentroidDigit::Zero);
    let kinds: Vec<EdgeKind> = walk.edges.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EdgeKind::Mediated,
            EdgeKind::ElectricDissipation,
            EdgeKind::Persistence,
            EdgeKind::Persistence
        ]
    );
    assert_eq!(walk.edges[0].dst, Node::S1);
    assert_eq!(walk.centroid_flips, 0);
}
