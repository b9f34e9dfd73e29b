use hse_synth::boolean::{Cover, Cube};
use hse_synth::{
    Artifact, Design, ElaborateConfig, Elaborated, Elaboration, EncodeConfig, Encoder, Error,
    Graph, NodeRef, Pipeline, Registry, Sense, Stage, State, Transition, VariableKind,
    VariableSet, find_conflicts, synthesize,
};

const HANDSHAKE: &str = "
    process buf @0 { *[ [a]; x+; [~a]; x- ] }
    process env @1 { *[ a+; [x]; a-; [~x] ] }
    reset a-, x-;
";

/// `x+` then two unconditional branches that merge before `x-`.
fn merge_loop() -> (Design<Elaborated>, Elaboration) {
    let mut vars = VariableSet::new();
    let x = vars.define("x", 0, VariableKind::Boolean);

    let mut graph = Graph::new();
    let p: Vec<usize> = (0..3).map(|_| graph.create_place()).collect();
    let rise = graph.create_transition(Transition::new(
        Cover::tautology(),
        Cover::from(Cube::literal(x, true)),
        0,
    ));
    let left = graph.create_transition(Transition::skip(0));
    let right = graph.create_transition(Transition::skip(0));
    let fall = graph.create_transition(Transition::new(
        Cover::tautology(),
        Cover::from(Cube::literal(x, false)),
        0,
    ));
    for (from, to) in [
        (NodeRef::Place(p[0]), NodeRef::Transition(rise)),
        (NodeRef::Transition(rise), NodeRef::Place(p[1])),
        (NodeRef::Place(p[1]), NodeRef::Transition(left)),
        (NodeRef::Place(p[1]), NodeRef::Transition(right)),
        (NodeRef::Transition(left), NodeRef::Place(p[2])),
        (NodeRef::Transition(right), NodeRef::Place(p[2])),
        (NodeRef::Place(p[2]), NodeRef::Transition(fall)),
        (NodeRef::Transition(fall), NodeRef::Place(p[0])),
    ] {
        graph.connect(from, to).unwrap();
    }
    graph.reset.push(State::new(vec![p[0]], Cube::literal(x, false)));

    Design::new(graph, vars)
        .validate(false)
        .unwrap()
        .elaborate(&ElaborateConfig::default())
        .unwrap()
}

fn parse(source: &str) -> Design<hse_synth::Raw> {
    Registry::with_defaults().import("hse", source).unwrap()
}

#[test]
fn test_single_assignment() {
    let mut vars = VariableSet::new();
    let x = vars.define("x", 0, VariableKind::Boolean);
    let mut graph = Graph::assignment(Cube::literal(x, true), 0);
    graph.reset.push(State::new(vec![0], Cube::literal(x, false)));

    let (design, elaboration) = Design::new(graph, vars)
        .validate(false)
        .unwrap()
        .elaborate(&ElaborateConfig::default())
        .unwrap();

    assert_eq!(elaboration.states.len(), 2);
    assert!(elaboration.deadlocks.is_empty());
    assert!(find_conflicts(design.graph(), design.variables(), true).is_empty());
}

#[test]
fn test_merge_conflict_is_sound() {
    let (design, elaboration) = merge_loop();
    let conflicts = find_conflicts(design.graph(), design.variables(), false);
    assert_eq!(conflicts.len(), 1);

    let conflict = &conflicts[0];
    assert_eq!(conflict.sense, Sense::Down);

    // Some reachable state marks the colliding place, and some reachable
    // state enables the transition, both inside the reported encoding.
    let inputs = design.graph().inputs(conflict.transition);
    for place in &conflict.region {
        assert!(elaboration.states.iter().any(|s| s.tokens.contains(place)
            && conflict.encoding.intersects_cube(&s.encoding)));
    }
    assert!(elaboration.states.iter().any(|s| inputs
        .iter()
        .all(|i| s.tokens.contains(i))
        && conflict.encoding.intersects_cube(&s.encoding)));
}

#[test]
fn test_merge_conflict_resolved_and_stays_resolved() {
    let (design, elaboration) = merge_loop();
    let mut encoder = Encoder::new(design, elaboration, ElaborateConfig::default());
    let config = EncodeConfig::default();

    assert!(encoder.run(&config));
    assert_eq!(encoder.inserted().len(), 1);
    assert!(encoder.elaboration().deadlocks.is_empty());
    assert!(encoder.elaboration().unsafe_places.is_empty());

    // A second pass has nothing to do.
    assert!(encoder.run(&config));
    assert_eq!(encoder.inserted().len(), 1);
    assert!(encoder.check(false, false).is_empty());

    let x = encoder.variables().find("x", 0).unwrap();
    let rules = synthesize(&encoder.into_design(), false).unwrap();
    assert!(rules.rule(x, true).is_some());
    assert!(rules.rule(x, false).is_some());
}

#[test]
fn test_handshake_through_pipeline() {
    let outcome = Pipeline::default().run(parse(HANDSHAKE)).unwrap();

    assert_eq!(outcome.reached, Stage::Rules);
    assert!(outcome.converged);
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.elaboration.deadlocks.is_empty());
    assert!(matches!(
        outcome.artifact(Stage::Rules),
        Some(Artifact::Rules(rules)) if rules.len() == 4
    ));
}

#[test]
fn test_elaboration_is_deterministic() {
    let config = ElaborateConfig::default();
    let run = || {
        let (design, elaboration) = parse(HANDSHAKE)
            .validate(false)
            .unwrap()
            .elaborate(&config)
            .unwrap();
        (design.to_string(), elaboration.states)
    };

    let (first, first_states) = run();
    let (second, second_states) = run();
    assert_eq!(first, second);
    assert_eq!(first_states, second_states);
}

#[test]
fn test_state_budget_truncates() {
    let config = ElaborateConfig {
        max_states: 2,
        ..Default::default()
    };
    let (_, elaboration) = parse(HANDSHAKE)
        .validate(false)
        .unwrap()
        .elaborate(&config)
        .unwrap();

    assert!(elaboration.truncated);
    assert!(elaboration.states.len() <= 2);
}

#[test]
fn test_unknown_dialect() {
    assert!(matches!(
        Registry::with_defaults().import("vhdl", HANDSHAKE),
        Err(Error::InvalidType(_))
    ));
}

#[test]
fn test_imported_handshake_is_safe() {
    let (design, elaboration) = parse(HANDSHAKE)
        .validate(false)
        .unwrap()
        .elaborate(&ElaborateConfig::default())
        .unwrap();

    assert!(elaboration.unsafe_places.is_empty());
    assert!(elaboration.deadlocks.is_empty());
    assert!(!elaboration.truncated);
    // Every visited marking holds one token per process.
    assert!(elaboration.states.iter().all(|s| s.tokens.len() == 2));
    assert!(design.graph().places.iter().all(|p| !p.predicate.is_null()));
}

#[test]
fn test_rules_respect_unsigned_mode() {
    let mut vars = VariableSet::new();
    let x = vars.define("x", 0, VariableKind::Boolean);
    let mut graph = Graph::assignment(Cube::literal(x, true), 0);
    graph.merge(
        hse_synth::Composition::Sequence,
        Graph::assignment(Cube::literal(x, true), 0),
    );
    let tokens = graph.source[0].tokens.clone();
    graph.reset.push(State::new(tokens, Cube::literal(x, false)));

    let (design, elaboration) = Design::new(graph, vars)
        .validate(false)
        .unwrap()
        .elaborate(&ElaborateConfig::default())
        .unwrap();
    let design = Encoder::new(design, elaboration, ElaborateConfig::default()).into_design();

    assert!(synthesize(&design, false).is_ok());
    assert!(matches!(
        synthesize(&design, true),
        Err(Error::Unresolved(conflicts)) if conflicts.len() == 1
            && conflicts[0].sense == Sense::Unsigned
    ));
}
