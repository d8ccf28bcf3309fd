//! Property tests for the Plan Validator

use planex::dag::{check_plan, validate_plan, StepGraph, ValidationIssue};
use planex::{Plan, Step};
use proptest::prelude::*;
use serde_json::json;

/// Random well-formed plan: each step depends on a subset of earlier steps
/// and references a subset of those dependencies
fn arb_plan() -> impl Strategy<Value = Plan> {
    (1usize..12)
        .prop_flat_map(|len| {
            let steps: Vec<_> = (0..len)
                .map(|i| {
                    (
                        proptest::collection::vec(any::<bool>(), i),
                        any::<bool>(),
                        any::<bool>(),
                    )
                })
                .collect();
            steps
        })
        .prop_map(|steps| {
            Plan::new(
                steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, (picks, parallel, reference))| {
                        let deps: Vec<usize> = picks
                            .iter()
                            .enumerate()
                            .filter(|(_, picked)| **picked)
                            .map(|(d, _)| d)
                            .collect();
                        let mut step = Step::new(format!("tool_{}", i));
                        if let (true, Some(&first)) = (reference, deps.first()) {
                            step = step.with_params(json!({
                                "input": format!("${{step_{}.result}}", first),
                                "label": format!("from ${{step_{}.result.name}}", first),
                            }));
                        }
                        if parallel {
                            step = step.parallel();
                        }
                        step.depends_on(deps)
                    })
                    .collect(),
            )
        })
}

proptest! {
    #[test]
    fn generated_plans_are_valid(plan in arb_plan()) {
        let report = validate_plan(&plan).unwrap();
        prop_assert!(report.is_valid());
    }

    #[test]
    fn graph_edges_only_point_backwards(plan in arb_plan()) {
        let graph = StepGraph::from_plan(&plan);
        for step in 0..graph.len() {
            for &dep in graph.dependencies(step) {
                prop_assert!(dep < step);
                prop_assert!(graph.successors(dep).contains(&step));
            }
        }
    }

    #[test]
    fn forward_dependency_is_rejected(plan in arb_plan(), pick in any::<prop::sample::Index>(), ahead in 1usize..4) {
        let mut plan = plan;
        let step = pick.index(plan.len());
        let dep = step + ahead;
        plan.steps[step].depends_on.push(dep);

        let report = check_plan(&plan);
        let expected = ValidationIssue::ForwardDependency { step, dep };
        prop_assert!(report.errors.contains(&expected));
        prop_assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn self_dependency_is_rejected(plan in arb_plan(), pick in any::<prop::sample::Index>()) {
        let mut plan = plan;
        let step = pick.index(plan.len());
        plan.steps[step].depends_on.push(step);

        let expected = ValidationIssue::SelfDependency { step };
        prop_assert!(check_plan(&plan).errors.contains(&expected));
    }

    #[test]
    fn reference_outside_depends_on_is_rejected(plan in arb_plan(), pick in any::<prop::sample::Index>()) {
        let mut plan = plan;
        plan.steps.push(Step::new("late"));
        let last = plan.len() - 1;
        let referenced = pick.index(last);
        plan.steps[last]
            .params
            .insert("x".to_string(), json!(format!("${{step_{}.result}}", referenced)));

        prop_assert_eq!(
            check_plan(&plan).errors,
            vec![ValidationIssue::UndeclaredReference { step: last, referenced }]
        );
    }
}
