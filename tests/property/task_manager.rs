// tests/property/task_manager.rs

use std::collections::BTreeSet;

use proptest::prelude::*;
use tickdag::config::ManagerConfig;
use tickdag::dag::{JobNode, JobState, TaskManager};
use tickdag_test_utils::fake_job::{FakeJob, Recorder};
use tickdag_test_utils::settle;
use tokio::runtime::Handle;

#[derive(Debug, Clone)]
struct NodeShape {
    deps: BTreeSet<usize>,
    uses_slot: bool,
}

// Acyclic by construction: node N may only depend on nodes 0..N-1.
fn plan_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<NodeShape>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(
            (proptest::collection::vec(any::<usize>(), 0..3), any::<bool>()),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (deps, uses_slot))| NodeShape {
                    deps: if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    },
                    uses_slot,
                })
                .collect()
        })
    })
}

fn build_nodes(shapes: &[NodeShape], recorder: &Recorder) -> Vec<JobNode> {
    let mut nodes: Vec<JobNode> = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.iter().enumerate() {
        let node = JobNode::builder(FakeJob::new(&format!("job{i}"), recorder))
            .after_all(shape.deps.iter().map(|&d| &nodes[d]))
            .uses_slot(shape.uses_slot)
            .build();
        nodes.push(node);
    }
    nodes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn orchestrator_invariants_hold_every_iteration(
        shapes in plan_strategy(8),
        worker_limit in 1usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let outcome: Result<(), TestCaseError> = rt.block_on(async {
            let recorder = Recorder::new();
            let manager = TaskManager::new(
                ManagerConfig::with_worker_limit(worker_limit),
                Handle::current(),
            );
            let nodes = build_nodes(&shapes, &recorder);
            manager.add_tasks(nodes.clone());

            let mut started_before = 0;
            for _ in 0..(shapes.len() * 20 + 20) {
                manager.iterate().unwrap();

                let started = nodes.iter().filter(|n| n.started_at().is_some()).count();
                prop_assert!(
                    started <= started_before + 1,
                    "{} jobs started in one iteration",
                    started - started_before
                );
                started_before = started;

                let busy = manager
                    .running_tasks()
                    .iter()
                    .filter(|n| n.uses_slot())
                    .count();
                prop_assert!(busy <= worker_limit, "{} busy slots > {}", busy, worker_limit);

                for node in nodes.iter().filter(|n| n.state() != JobState::Pending) {
                    for dep in node.requires() {
                        prop_assert!(
                            dep.branch_finished(),
                            "{} started before {} finished",
                            node.name(),
                            dep.name()
                        );
                    }
                }

                if manager.is_idle() {
                    break;
                }
                settle().await;
            }

            prop_assert!(manager.is_idle(), "plan did not finish: {}", manager.progress());
            prop_assert_eq!(recorder.started().len(), shapes.len());
            for node in &nodes {
                prop_assert_eq!(node.state(), JobState::Finalized);
            }
            Ok(())
        });
        outcome?;
    }
}
