//! Integration tests for criteria matching.
//!
//! Covers:
//! 1. Superset containment for clusters and commands
//! 2. Fallback ordering across cluster criterias
//! 3. Eligibility by status
//! 4. Command priority order and reordering
//! 5. Matching by the automatic id/name tags

use std::sync::Arc;

use prometheus_job_runner::core::{
    satisfies, tag_set, Cluster, ClusterStatus, Command, CriteriaMatcher, FirstFound, MatchResult,
    RandomSelection, ResourceStatus, TagSet,
};
use prometheus_job_runner::infra::InMemoryTagStore;

fn matcher(store: &Arc<InMemoryTagStore>) -> CriteriaMatcher {
    CriteriaMatcher::new(store.clone())
}

fn yarn_store() -> Arc<InMemoryTagStore> {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(Cluster::new(
        "sla",
        "sla",
        ["sched:sla", "type:yarn", "ver:2.7", "ver:2.7.0"],
    ));
    store.register_cluster(Cluster::new(
        "test",
        "test",
        ["sched:test", "type:yarn", "ver:2.7", "ver:2.7.1"],
    ));
    store.register_command(Command::new("spark", "spark", "spark-submit", ["type:spark"]));
    store.link_commands("sla", &["spark"]).unwrap();
    store.link_commands("test", &["spark"]).unwrap();
    store
}

#[test]
fn test_exact_version_selects_single_cluster() {
    let store = yarn_store();
    let result = matcher(&store).find(&[tag_set(["type:yarn", "ver:2.7.1"])], &tag_set(["type:spark"]));
    let MatchResult::Unique(pair) = result else {
        panic!("expected a unique match");
    };
    assert_eq!(pair.cluster.id, "test");
    assert_eq!(pair.command.id, "spark");
    assert_eq!(pair.criteria_index, 0);
}

#[test]
fn test_shared_tags_are_ambiguous() {
    let store = yarn_store();
    let result = matcher(&store).find(&[tag_set(["type:yarn", "ver:2.7"])], &TagSet::new());
    let MatchResult::Ambiguous(pairs) = result else {
        panic!("expected an ambiguous match");
    };
    assert_eq!(pairs.len(), 2);

    let criteria = tag_set(["type:yarn", "ver:2.7"]);
    for _ in 0..20 {
        let pair = matcher(&store)
            .find_one(&[criteria.clone()], &TagSet::new(), &RandomSelection)
            .unwrap();
        assert!(satisfies(&pair.cluster.tags, &criteria));
    }
}

#[test]
fn test_fallback_to_less_restrictive_criteria() {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(Cluster::new("presto", "presto", ["type:presto", "ver:0.149"]));
    store.register_command(Command::new("cli", "cli", "presto", ["type:presto-cli"]));
    store.link_commands("presto", &["cli"]).unwrap();

    let criterias = [tag_set(["type:presto", "ver:0.150"]), tag_set(["type:presto"])];
    let pair = matcher(&store)
        .find_one(&criterias, &tag_set(["type:presto-cli"]), &FirstFound)
        .unwrap();
    assert_eq!(pair.cluster.id, "presto");
    assert_eq!(pair.criteria_index, 1);
}

#[test]
fn test_fallback_when_matched_cluster_has_no_command() {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(Cluster::new("bare", "bare", ["type:yarn", "tier:gold"]));
    store.register_cluster(Cluster::new("full", "full", ["type:yarn"]));
    store.register_command(Command::new("hive", "hive", "hive", ["type:hive"]));
    store.link_commands("full", &["hive"]).unwrap();

    let criterias = [tag_set(["tier:gold"]), tag_set(["type:yarn"])];
    let pair = matcher(&store)
        .find_one(&criterias, &tag_set(["type:hive"]), &FirstFound)
        .unwrap();
    assert_eq!(pair.cluster.id, "full");
    assert_eq!(pair.criteria_index, 1);
}

#[test]
fn test_no_match_anywhere() {
    let store = yarn_store();
    let result = matcher(&store).find(
        &[tag_set(["type:mesos"]), tag_set(["type:k8s"])],
        &tag_set(["type:spark"]),
    );
    assert_eq!(result, MatchResult::None);
    assert!(result.resolve(&FirstFound).is_none());
}

#[test]
fn test_ineligible_resources_are_skipped() {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(
        Cluster::new("down", "down", ["type:yarn"]).with_status(ClusterStatus::OutOfService),
    );
    store.register_cluster(
        Cluster::new("gone", "gone", ["type:yarn"]).with_status(ClusterStatus::Terminated),
    );
    store.register_cluster(Cluster::new("up", "up", ["type:yarn"]));
    store.register_command(
        Command::new("old", "old", "x", ["type:spark"]).with_status(ResourceStatus::Inactive),
    );
    store.register_command(
        Command::new("legacy", "legacy", "x", ["type:spark"]).with_status(ResourceStatus::Deprecated),
    );
    for cluster in ["down", "gone", "up"] {
        store.link_commands(cluster, &["old", "legacy"]).unwrap();
    }

    let pair = matcher(&store)
        .find_one(&[tag_set(["type:yarn"])], &tag_set(["type:spark"]), &FirstFound)
        .unwrap();
    assert_eq!(pair.cluster.id, "up");
    assert_eq!(pair.command.id, "legacy");
}

#[test]
fn test_empty_criteria_matches_everything_eligible() {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(Cluster::new("only", "only", ["anything"]));
    store.register_command(Command::new("cmd", "cmd", "x", ["whatever"]));
    store.link_commands("only", &["cmd"]).unwrap();

    let pair = matcher(&store)
        .find_one(&[TagSet::new()], &TagSet::new(), &FirstFound)
        .unwrap();
    assert_eq!(pair.cluster.id, "only");
}

#[test]
fn test_priority_order_and_reorder() {
    let store = Arc::new(InMemoryTagStore::new());
    store.register_cluster(Cluster::new("c", "c", ["type:yarn"]));
    for id in ["spark-2", "spark-3"] {
        store.register_command(Command::new(id, "spark", "spark-submit", ["type:spark"]));
    }
    store.link_commands("c", &["spark-3", "spark-2"]).unwrap();

    let pick = || {
        matcher(&store)
            .find_one(&[tag_set(["type:yarn"])], &tag_set(["type:spark"]), &FirstFound)
            .unwrap()
            .command
            .id
    };
    assert_eq!(pick(), "spark-3");

    store.reorder_commands("c", &["spark-2", "spark-3"]).unwrap();
    assert_eq!(pick(), "spark-2");
    assert_eq!(store.command_order("c"), vec!["spark-2", "spark-3"]);

    assert!(store.reorder_commands("c", &["spark-2"]).is_err());
    assert!(store.reorder_commands("c", &["spark-2", "spark-9"]).is_err());
}

#[test]
fn test_match_by_system_tags() {
    let store = yarn_store();
    let pair = matcher(&store)
        .find_one(
            &[tag_set(["runner.id:sla"])],
            &tag_set(["runner.name:spark"]),
            &FirstFound,
        )
        .unwrap();
    assert_eq!(pair.cluster.id, "sla");
    assert_eq!(pair.command.id, "spark");
}
