use apnsim::{
    evaluate_expr, find_satisfying_assignment, parse_arithmetic, parse_guard, parse_pattern,
    run_to_completion, AlgebraicSimulator, BindingCache, ConflictResolver, Environment, PetriNet,
    RunConfig, RunHooks, SimOptions, SimulationMode, Token,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn net_from(json: &str) -> PetriNet {
    serde_json::from_str(json).unwrap()
}

fn seeded(seed: u64) -> SimOptions {
    SimOptions {
        rng_seed: Some(seed),
        ..SimOptions::default()
    }
}

#[test]
fn guarded_transition_moves_exactly_one_token() {
    init_logging();
    let mut sim = AlgebraicSimulator::from_json(
        r#"{
            "places": [
                {"id": "p1", "label": "P1", "tokens": [2, 5]},
                {"id": "p2", "label": "P2", "tokens": []}
            ],
            "transitions": [{"id": "t1", "label": "T1", "guard": "x >= 2"}],
            "arcs": [
                {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                {"id": "a2", "source": "t1", "target": "p2", "bindings": ["x"]}
            ]
        }"#,
        seeded(11),
    )
    .unwrap();

    sim.fire_transition("t1").unwrap();

    let p1 = sim.state().find_place("p1").unwrap();
    let p2 = sim.state().find_place("p2").unwrap();
    assert_eq!(p1.tokens.count(), 1);
    let produced = p2.tokens.values().unwrap();
    assert_eq!(produced.len(), 1);
    // The consumed token reappears unchanged in p2.
    assert!(matches!(produced[0], Token::Int(2) | Token::Int(5)));
    let remaining = p1.tokens.values().unwrap();
    assert_ne!(remaining[0], produced[0]);
}

#[test]
fn pair_pattern_destructures_matching_tokens_only() {
    init_logging();
    let pattern = parse_pattern("(F, x:Int)").unwrap();

    let mut env = Environment::new();
    let matching = Token::pair(Token::Bool(false), Token::Int(1));
    assert!(apnsim::match_pattern(&pattern, &matching, &mut env));
    assert_eq!(env.get("x"), Some(&Token::Int(1)));

    let mut env = Environment::new();
    let wrong_flag = Token::pair(Token::Bool(true), Token::Int(1));
    assert!(!apnsim::match_pattern(&pattern, &wrong_flag, &mut env));
}

#[test]
fn int_and_bool_demands_on_one_place_do_not_conflict() {
    init_logging();
    let net = net_from(
        r#"{
            "places": [{"id": "p1", "tokens": [1, 2, true]}],
            "transitions": [{"id": "t1"}, {"id": "t2"}, {"id": "t3"}],
            "arcs": [
                {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                {"id": "a2", "source": "p1", "target": "t2", "bindings": ["y"]},
                {"id": "a3", "source": "p1", "target": "t3", "bindings": ["flag:boolean"]}
            ]
        }"#,
    );
    let mut resolver = ConflictResolver::new();
    assert!(resolver.in_conflict("t1", "t2", &net));
    assert!(!resolver.in_conflict("t1", "t3", &net));
    assert!(!resolver.in_conflict("t2", "t3", &net));

    let enabled = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
    let sets = resolver.find_non_conflicting_transitions(&enabled, &net);
    assert!(sets.iter().all(|s| s.len() == 2));
    assert!(sets
        .iter()
        .all(|s| s.contains(&"t3".to_string()) && !s.contains(&"t1".to_string())
            || s.contains(&"t3".to_string()) && !s.contains(&"t2".to_string())));

    // Every returned set is pairwise conflict-free.
    for set in &sets {
        let ids: Vec<&str> = set.iter().map(|s| s.as_str()).collect();
        assert!(resolver.is_non_conflicting_set(&ids, &net));
    }
}

#[test]
fn list_builtins_match_their_documented_examples() {
    init_logging();
    let mut env = Environment::new();
    env.bind(
        "xs",
        Token::List(vec![
            Token::Int(1),
            Token::Int(2),
            Token::Int(3),
            Token::Int(4),
        ]),
    );
    let sub = evaluate_expr(&parse_arithmetic("sublist(xs, 1, 2)").unwrap(), &env).unwrap();
    assert_eq!(sub, Token::List(vec![Token::Int(2), Token::Int(3)]));

    env.bind("sub", sub);
    let contained =
        evaluate_expr(&parse_arithmetic("isSublistOf(sub, xs)").unwrap(), &env).unwrap();
    assert_eq!(contained, Token::Bool(true));
}

#[test]
fn token_count_changes_by_production_minus_consumption() {
    init_logging();
    let mut sim = AlgebraicSimulator::from_json(
        r#"{
            "places": [
                {"id": "p1", "tokens": [1, 1, 1]},
                {"id": "p2", "tokens": []}
            ],
            "transitions": [{"id": "t1"}],
            "arcs": [
                {"id": "a1", "source": "p1", "target": "t1", "weight": 2},
                {"id": "a2", "source": "t1", "target": "p2", "weight": 3}
            ]
        }"#,
        seeded(5),
    )
    .unwrap();

    let before: u64 = sim.state().places.iter().map(|p| p.tokens.count()).sum();
    sim.fire_transition("t1").unwrap();
    let after: u64 = sim.state().places.iter().map(|p| p.tokens.count()).sum();
    assert_eq!(after as i64 - before as i64, 3 - 2);
}

#[test]
fn assignment_search_is_deterministic() {
    init_logging();
    let net = net_from(
        r#"{
            "places": [{"id": "p1", "tokens": [4, 2, 9]}],
            "transitions": [{"id": "t1", "guard": "x >= 2 && x < 5"}],
            "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
        }"#,
    );
    let cache = BindingCache::build(&net);
    let transition = net.find_transition("t1").unwrap();
    let input_arcs = net.input_arcs("t1");

    let first = find_satisfying_assignment(&net, transition, &input_arcs, &cache, None, 20);
    let second = find_satisfying_assignment(&net, transition, &input_arcs, &cache, None, 20);
    assert_eq!(first, second);
    assert_eq!(first.unwrap().env.get("x"), Some(&Token::Int(4)));
}

#[test]
fn grammar_round_trips_are_stable() {
    init_logging();
    let arithmetic = [
        "1 + 2 * 3",
        "(1 + 2) * 3",
        "x:int",
        "'it\\'s'",
        "[1, x, [2, 3]]",
        "(x, y + 1)",
        "concat(substring(s, 0, 2), 'ab')",
        "fst(p) + snd(p)",
    ];
    for text in arithmetic {
        let ast = parse_arithmetic(text).unwrap();
        let printed = ast.to_string();
        assert_eq!(parse_arithmetic(&printed).unwrap(), ast, "via '{}'", printed);
    }

    let patterns = ["T", "42", "(F, x:Int)", "(a, b, c)", "[x:Int, 2]", "p:Pair"];
    for text in patterns {
        let ast = parse_pattern(text).unwrap();
        let printed = ast.to_string();
        assert_eq!(parse_pattern(&printed).unwrap(), ast, "via '{}'", printed);
    }

    let guards = [
        "x >= 2",
        "x + 1 == y * 2",
        "a && (b || !c)",
        "a ^ b -> c <-> d",
        "p == (T, 1)",
        "isSubstringOf(s, t) && x > 0",
    ];
    for text in guards {
        let ast = parse_guard(text).unwrap();
        let printed = ast.to_string();
        assert_eq!(parse_guard(&printed).unwrap(), ast, "via '{}'", printed);
    }
}

#[test]
fn full_run_drains_a_pipeline() {
    init_logging();
    // p1 feeds t1 which tags values, t2 consumes tagged pairs back apart.
    let mut sim = AlgebraicSimulator::from_json(
        r#"{
            "places": [
                {"id": "p1", "tokens": [1, 2, 3]},
                {"id": "p2", "tokens": []},
                {"id": "p3", "tokens": []}
            ],
            "transitions": [
                {"id": "t1"},
                {"id": "t2"}
            ],
            "arcs": [
                {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                {"id": "a2", "source": "t1", "target": "p2", "bindings": ["(F, x)"]},
                {"id": "a3", "source": "p2", "target": "t2", "bindings": ["(F, y:Int)"]},
                {"id": "a4", "source": "t2", "target": "p3", "bindings": ["y + 10"]}
            ]
        }"#,
        seeded(21),
    )
    .unwrap();

    let report =
        run_to_completion(&mut sim, &RunConfig::default(), &mut RunHooks::default()).unwrap();
    assert_eq!(report.steps, 6);
    assert_eq!(sim.state().find_place("p1").unwrap().tokens.count(), 0);
    assert_eq!(sim.state().find_place("p2").unwrap().tokens.count(), 0);

    let mut drained: Vec<i64> = sim
        .state()
        .find_place("p3")
        .unwrap()
        .tokens
        .values()
        .unwrap()
        .iter()
        .map(|t| t.as_int().unwrap())
        .collect();
    drained.sort_unstable();
    assert_eq!(drained, vec![11, 12, 13]);
}

#[test]
fn maximal_run_with_progress_reporting() {
    init_logging();
    let mut sim = AlgebraicSimulator::from_json(
        r#"{
            "places": [
                {"id": "p1", "tokens": [1, 1]},
                {"id": "p2", "tokens": [true, true]},
                {"id": "sink", "tokens": []}
            ],
            "transitions": [{"id": "t1"}, {"id": "t2"}],
            "arcs": [
                {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                {"id": "a2", "source": "p2", "target": "t2", "bindings": ["b:bool"]},
                {"id": "a3", "source": "t1", "target": "sink", "bindings": ["x"]},
                {"id": "a4", "source": "t2", "target": "sink", "bindings": ["b"]}
            ]
        }"#,
        seeded(2),
    )
    .unwrap();

    let mut progress_steps: Vec<u64> = Vec::new();
    {
        let mut hooks = RunHooks {
            on_progress: Some(Box::new(|p| progress_steps.push(p.steps))),
            should_cancel: None,
            yield_point: None,
        };
        let config = RunConfig {
            mode: SimulationMode::Maximal,
            ..RunConfig::default()
        };
        let report = run_to_completion(&mut sim, &config, &mut hooks).unwrap();
        assert_eq!(report.steps, 4);
    }
    assert_eq!(progress_steps.last(), Some(&4));
    assert_eq!(sim.state().find_place("sink").unwrap().tokens.count(), 4);
}
