//! Property tests for nearest-upload resolution over random commit DAGs.
//!
//! Each case builds a random DAG (commit `i` may only have parents `< i`) and
//! a random set of uploads, then checks the traversal and the persisted graph
//! against a brute-force breadth-first search from every commit.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use codenav::{
    CommitGraph, CommitGraphView, Envelope, NewUpload, RepositoryId, Store, Token, UploadId,
    UploadMeta, VisibilityGraph,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

const PROPTEST_CASES: u32 = 64;
const ROOTS: [&str; 2] = ["", "lib/"];

#[derive(Clone, Debug)]
struct Scenario {
    /// Parents of commit `i`, all `< i`, first parent first.
    parents: Vec<Vec<usize>>,
    /// `(commit, root index)` per upload; upload ids are positions + 1.
    uploads: Vec<(usize, usize)>,
}

impl Scenario {
    fn commit(i: usize) -> String {
        format!("c{i:02}")
    }

    fn commit_graph(&self) -> CommitGraph {
        // Newest first, like git log.
        let entries = self.parents.iter().enumerate().rev().map(|(i, parents)| {
            (
                Self::commit(i),
                parents.iter().map(|&p| Self::commit(p)).collect::<Vec<_>>(),
            )
        });
        CommitGraph::from_parents(entries).expect("generated graph is a DAG")
    }

    fn view(&self) -> CommitGraphView {
        let mut view = CommitGraphView::new();
        for (pos, &(commit, root)) in self.uploads.iter().enumerate() {
            view.add(
                UploadMeta::new(upload_id(pos), 0),
                &Self::commit(commit),
                Token::new(ROOTS[root], "scip-go"),
            );
        }
        view
    }

    /// Nearest upload per root at `start`, by exhaustive BFS over ancestors.
    fn brute_force(&self, start: usize) -> Vec<UploadMeta> {
        let mut distance = vec![None; self.parents.len()];
        distance[start] = Some(0u32);
        let mut queue = VecDeque::from([start]);
        while let Some(commit) = queue.pop_front() {
            let next = distance[commit].map(|d| d + 1);
            for &parent in &self.parents[commit] {
                if distance[parent].is_none() {
                    distance[parent] = next;
                    queue.push_back(parent);
                }
            }
        }

        let mut best: HashMap<usize, UploadMeta> = HashMap::new();
        for (pos, &(commit, root)) in self.uploads.iter().enumerate() {
            let Some(d) = distance[commit] else { continue };
            let candidate = UploadMeta::new(upload_id(pos), d);
            let better = best.get(&root).is_none_or(|current| {
                (candidate.distance, candidate.upload_id) < (current.distance, current.upload_id)
            });
            if better {
                best.insert(root, candidate);
            }
        }

        let mut visible: Vec<UploadMeta> = best.into_values().collect();
        visible.sort_by_key(|meta| meta.upload_id);
        visible
    }
}

fn upload_id(pos: usize) -> UploadId {
    UploadId(i64::try_from(pos).expect("small index") + 1)
}

fn arb_scenario() -> impl Strategy<Value = Scenario> {
    (1usize..14).prop_flat_map(|n| {
        let parents = prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), n)
            .prop_map(|raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let mut parents: Vec<usize> = Vec::new();
                        if i > 0 {
                            for pick in picks {
                                let parent = pick.index(i);
                                if !parents.contains(&parent) {
                                    parents.push(parent);
                                }
                            }
                        }
                        parents
                    })
                    .collect::<Vec<_>>()
            });
        let uploads = prop::collection::vec((0..n, 0..ROOTS.len()), 0..6);
        (parents, uploads).prop_map(|(parents, uploads)| Scenario { parents, uploads })
    })
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn traversal_selects_nearest_upload_per_token(scenario in arb_scenario()) {
        let graph = scenario.commit_graph();
        let view = scenario.view();
        let visibility = VisibilityGraph::new(&graph, &view);

        for i in 0..scenario.parents.len() {
            prop_assert_eq!(
                visibility.uploads_visible_at_commit(&Scenario::commit(i)),
                scenario.brute_force(i),
                "commit {}", i
            );
        }
    }

    #[test]
    fn traversal_is_deterministic(scenario in arb_scenario()) {
        let graph = scenario.commit_graph();
        let view = scenario.view();

        let first: Vec<Envelope<'_>> = VisibilityGraph::new(&graph, &view).stream().collect();
        let second: Vec<Envelope<'_>> = VisibilityGraph::new(&graph, &view).stream().collect();

        prop_assert_eq!(first.len(), graph.len());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn links_always_point_at_direct_nodes(scenario in arb_scenario()) {
        let graph = scenario.commit_graph();
        let view = scenario.view();
        let envelopes: Vec<Envelope<'_>> = VisibilityGraph::new(&graph, &view).stream().collect();

        let direct: Vec<&str> = envelopes
            .iter()
            .filter(|e| matches!(e, Envelope::Direct { .. }))
            .map(Envelope::commit)
            .collect();
        for envelope in &envelopes {
            if let Envelope::Link { ancestor, distance, .. } = envelope {
                prop_assert!(direct.contains(ancestor));
                prop_assert!(*distance >= 1);
            }
        }
    }

    #[test]
    fn persisted_graph_reads_back_in_one_hop(scenario in arb_scenario()) {
        let store = Store::open_in_memory().expect("open");
        let repo = RepositoryId(1);
        for &(commit, root) in &scenario.uploads {
            store
                .insert_upload(&NewUpload::completed(repo, &Scenario::commit(commit), ROOTS[root], "scip-go"))
                .expect("insert upload");
        }
        let graph = scenario.commit_graph();
        let tip = Scenario::commit(scenario.parents.len() - 1);

        store
            .calculate_visible_uploads(repo, &graph, &tip, 0, now(), &CancellationToken::new())
            .expect("recompute");
        let again = store
            .calculate_visible_uploads(repo, &graph, &tip, 0, now(), &CancellationToken::new())
            .expect("recompute again");
        prop_assert_eq!(again.rows_changed(), 0);

        for i in 0..scenario.parents.len() {
            let persisted = store
                .visible_uploads_for_commit(repo, &Scenario::commit(i))
                .expect("no chained or dangling links");
            prop_assert_eq!(persisted, scenario.brute_force(i));
        }
    }
}
