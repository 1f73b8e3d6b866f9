//! Image operations end to end, with in-process nodes and index.

use std::sync::Arc;

use imgfleet_id::{ImageName, NodeAddress};
use imgfleet_index::{InMemoryLocationIndex, LocationIndex};
use imgfleet_orchestrator::node::{
    BuildImageOptions, ImportImageOptions, MockCall, MockConnector, MockNodeClient, MockOp,
    NodeError, PullImageOptions, PushImageOptions, RegistryAuth,
};
use imgfleet_orchestrator::{Cluster, ClusterError, CompletionPolicy, StaticMembership};
use rstest::rstest;

fn image(s: &str) -> ImageName {
    ImageName::parse(s).unwrap()
}

fn node(s: &str) -> NodeAddress {
    NodeAddress::parse(s).unwrap()
}

struct Harness {
    cluster: Cluster,
    index: Arc<InMemoryLocationIndex>,
    connector: Arc<MockConnector>,
}

impl Harness {
    fn new(index: InMemoryLocationIndex, members: Vec<NodeAddress>, connector: MockConnector) -> Self {
        let index = Arc::new(index);
        let connector = Arc::new(connector);
        let cluster = Cluster::new(
            index.clone(),
            Arc::new(StaticMembership::new(members)),
            connector.clone(),
        );
        Self {
            cluster,
            index,
            connector,
        }
    }

    async fn holders(&self, name: &str) -> Vec<NodeAddress> {
        self.index.retrieve_holders(&image(name)).await.unwrap()
    }
}

fn build_opts(name: &str) -> BuildImageOptions {
    BuildImageOptions {
        name: image(name),
        remote: "https://git.example.com/team/api.git".into(),
        dockerfile: None,
        no_cache: false,
        pull: false,
    }
}

fn import_opts() -> ImportImageOptions {
    ImportImageOptions {
        repository: "imported/rootfs".into(),
        tag: None,
        source: "https://files.example.com/rootfs.tar".into(),
    }
}

// -- remove --

#[rstest]
#[case(CompletionPolicy::WaitForAll)]
#[case(CompletionPolicy::FirstCompletion)]
#[tokio::test]
async fn test_remove_tolerates_missing_image_and_forgets(#[case] policy: CompletionPolicy) {
    let connector = MockConnector::new().with_node(
        node("n2"),
        MockNodeClient::new().failing(MockOp::Remove, NodeError::ImageNotFound("busybox".into())),
    );
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("n1"), node("n2")])]);
    let h = Harness::new(index, vec![], connector);

    h.cluster.remove_image(&image("busybox"), policy).await.unwrap();

    let err = h.index.retrieve_holders(&image("busybox")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_remove_hard_failure_keeps_record() {
    let connector = MockConnector::new().with_node(
        node("n1"),
        MockNodeClient::new().failing(
            MockOp::Remove,
            NodeError::Api {
                status: 409,
                message: "image is in use".into(),
            },
        ),
    );
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("n1"), node("n2")])]);
    let h = Harness::new(index, vec![], connector);

    let err = h.cluster.remove_image_wait(&image("busybox")).await.unwrap_err();

    assert_eq!(err.node_address(), Some(&node("n1")));
    assert_eq!(h.holders("busybox").await, vec![node("n1"), node("n2")]);
    // The healthy node was still asked.
    assert_eq!(h.connector.node(&node("n2")).call_count(MockOp::Remove), 1);
}

#[tokio::test]
async fn test_remove_unknown_image_is_not_found() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![node("n1")], MockConnector::new());

    let err = h.cluster.remove_image_wait(&image("busybox")).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.connector.total_calls(), 0);
}

#[tokio::test]
async fn test_remove_first_completion_returns_before_slow_holder() {
    let connector = MockConnector::new().with_node(node("slow"), MockNodeClient::gated());
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("slow"), node("fast")])]);
    let h = Harness::new(index, vec![], connector);

    h.cluster
        .remove_image(&image("busybox"), CompletionPolicy::FirstCompletion)
        .await
        .unwrap();

    assert!(h.index.is_empty().await);

    let slow = h.connector.node(&node("slow"));
    slow.wait_started(1).await;
    assert_eq!(slow.completed(), 0);
    slow.release(1);
    slow.wait_completed(1).await;
}

#[tokio::test]
async fn test_remove_first_completion_hard_failure_keeps_record() {
    let connector = MockConnector::new()
        .with_node(
            node("broken"),
            MockNodeClient::new().failing(
                MockOp::Remove,
                NodeError::Api {
                    status: 500,
                    message: "engine down".into(),
                },
            ),
        )
        .with_node(node("slow"), MockNodeClient::gated());
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("slow"), node("broken")])]);
    let h = Harness::new(index, vec![], connector);

    let err = h
        .cluster
        .remove_image(&image("busybox"), CompletionPolicy::FirstCompletion)
        .await
        .unwrap_err();

    assert_eq!(err.node_address(), Some(&node("broken")));
    assert_eq!(h.holders("busybox").await, vec![node("slow"), node("broken")]);

    h.connector.node(&node("slow")).release(1);
    assert_eq!(h.cluster.wait_for_background().await, 1);
    assert_eq!(h.connector.node(&node("slow")).completed(), 1);
}

#[rstest]
#[case(CompletionPolicy::WaitForAll)]
#[case(CompletionPolicy::FirstCompletion)]
#[tokio::test]
async fn test_remove_where_no_holder_has_image_forgets(#[case] policy: CompletionPolicy) {
    let missing = || {
        MockNodeClient::new().failing(MockOp::Remove, NodeError::ImageNotFound("busybox".into()))
    };
    let connector = MockConnector::new()
        .with_node(node("n1"), missing())
        .with_node(node("n2"), missing());
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("n1"), node("n2")])]);
    let h = Harness::new(index, vec![], connector);

    h.cluster.remove_image(&image("busybox"), policy).await.unwrap();

    assert!(h.index.is_empty().await);
    h.cluster.wait_for_background().await;
    assert_eq!(h.connector.total_calls(), 2);
}

#[tokio::test]
async fn test_first_completion_remove_leaves_rest_for_background_wait() {
    let connector = MockConnector::new().with_node(node("slow"), MockNodeClient::gated());
    let index = InMemoryLocationIndex::with_records([(image("busybox"), vec![node("slow"), node("fast")])]);
    let h = Harness::new(index, vec![], connector);

    h.cluster
        .remove_image(&image("busybox"), CompletionPolicy::FirstCompletion)
        .await
        .unwrap();

    let slow = h.connector.node(&node("slow"));
    slow.release(1);
    assert_eq!(h.cluster.wait_for_background().await, 1);
    assert_eq!(slow.completed(), 1);
    assert_eq!(h.cluster.wait_for_background().await, 0);
}

// -- pull --

#[tokio::test]
async fn test_pull_records_every_node() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], MockConnector::new());

    h.cluster
        .pull_image(
            PullImageOptions::new(image("alpine")),
            RegistryAuth::default(),
            &[node("n1"), node("n2")],
        )
        .await
        .unwrap();

    let mut holders = h.holders("alpine").await;
    holders.sort();
    assert_eq!(holders, vec![node("n1"), node("n2")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pull_records_holders_before_pulls_finish() {
    let connector = MockConnector::new()
        .with_node(node("a"), MockNodeClient::gated())
        .with_node(
            node("b"),
            MockNodeClient::gated().failing(MockOp::Pull, NodeError::Engine("manifest unknown".into())),
        );
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], connector);

    let pull = tokio::spawn({
        let cluster = h.cluster.clone();
        async move {
            cluster
                .pull_image(
                    PullImageOptions::new(image("alpine")),
                    RegistryAuth::default(),
                    &[node("a"), node("b")],
                )
                .await
        }
    });

    let a = h.connector.node(&node("a"));
    let b = h.connector.node(&node("b"));
    a.wait_started(1).await;
    b.wait_started(1).await;

    let mut holders = h.holders("alpine").await;
    holders.sort();
    assert_eq!(holders, vec![node("a"), node("b")]);

    a.release(1);
    b.release(1);
    let err = pull.await.unwrap().unwrap_err();

    assert_eq!(err.node_address(), Some(&node("b")));
    // The failed node stays recorded.
    let mut holders = h.holders("alpine").await;
    holders.sort();
    assert_eq!(holders, vec![node("a"), node("b")]);
}

#[tokio::test]
async fn test_pull_missing_image_is_tolerated() {
    let connector = MockConnector::new().with_node(
        node("n1"),
        MockNodeClient::new().failing(MockOp::Pull, NodeError::ImageNotFound("no-such-image".into())),
    );
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], connector);

    h.cluster
        .pull_image(
            PullImageOptions::new(image("no-such-image")),
            RegistryAuth::default(),
            &[node("n1")],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pull_with_no_nodes_is_noop() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![node("n1")], MockConnector::new());

    h.cluster
        .pull_image(PullImageOptions::new(image("alpine")), RegistryAuth::default(), &[])
        .await
        .unwrap();

    assert!(h.index.is_empty().await);
    assert_eq!(h.connector.total_calls(), 0);
}

#[tokio::test]
async fn test_pull_and_remove_use_the_same_full_reference() {
    let reference = "registry.example.com/team/api";
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], MockConnector::new());

    h.cluster
        .pull_image(
            PullImageOptions::new(image(reference)),
            RegistryAuth::default(),
            &[node("n1")],
        )
        .await
        .unwrap();
    assert_eq!(h.holders(reference).await, vec![node("n1")]);

    h.cluster.remove_image_wait(&image(reference)).await.unwrap();

    assert_eq!(
        h.connector.node(&node("n1")).calls(),
        vec![
            MockCall::Pull {
                repository: reference.into()
            },
            MockCall::Remove {
                name: reference.into()
            },
        ]
    );
    assert!(h.index.is_empty().await);
}

// -- push --

#[tokio::test]
async fn test_push_uses_only_first_holder() {
    let index = InMemoryLocationIndex::with_records([(image("team/api"), vec![node("n2"), node("n1")])]);
    let h = Harness::new(index, vec![], MockConnector::new());

    h.cluster
        .push_image(PushImageOptions::new(image("team/api")), RegistryAuth::default())
        .await
        .unwrap();

    assert_eq!(h.connector.node(&node("n2")).call_count(MockOp::Push), 1);
    assert_eq!(h.connector.node(&node("n1")).call_count(MockOp::Push), 0);
}

#[tokio::test]
async fn test_push_with_zero_holders_is_noop() {
    let index = InMemoryLocationIndex::with_records([(image("team/api"), vec![])]);
    let h = Harness::new(index, vec![node("n1")], MockConnector::new());

    h.cluster
        .push_image(PushImageOptions::new(image("team/api")), RegistryAuth::default())
        .await
        .unwrap();

    assert_eq!(h.connector.total_calls(), 0);
}

#[tokio::test]
async fn test_push_unknown_image_is_not_found() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![node("n1")], MockConnector::new());

    let err = h
        .cluster
        .push_image(PushImageOptions::new(image("team/api")), RegistryAuth::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.connector.total_calls(), 0);
}

#[tokio::test]
async fn test_push_failure_names_the_node() {
    let connector = MockConnector::new().with_node(
        node("n1"),
        MockNodeClient::new().failing(MockOp::Push, NodeError::Engine("denied".into())),
    );
    let index = InMemoryLocationIndex::with_records([(image("team/api"), vec![node("n1")])]);
    let h = Harness::new(index, vec![], connector);

    let err = h
        .cluster
        .push_image(PushImageOptions::new(image("team/api")), RegistryAuth::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClusterError::Node { ref address, .. } if *address == node("n1")));
}

// -- import --

#[tokio::test]
async fn test_import_with_no_members_is_noop() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], MockConnector::new());

    h.cluster.import_image(import_opts()).await.unwrap();

    assert_eq!(h.connector.total_calls(), 0);
}

#[tokio::test]
async fn test_import_returns_after_first_node() {
    let connector = MockConnector::new().with_node(node("n1"), MockNodeClient::gated());
    let h = Harness::new(
        InMemoryLocationIndex::new(),
        vec![node("n1"), node("n2")],
        connector,
    );

    h.cluster.import_image(import_opts()).await.unwrap();

    assert_eq!(h.connector.node(&node("n2")).completed(), 1);
    assert!(h.index.is_empty().await);

    let gated = h.connector.node(&node("n1"));
    gated.wait_started(1).await;
    gated.release(1);
    gated.wait_completed(1).await;
}

// -- build --

#[tokio::test]
async fn test_build_runs_on_first_member_and_overwrites_holders() {
    let index = InMemoryLocationIndex::with_records([(image("team/api"), vec![node("old1"), node("old2")])]);
    let h = Harness::new(index, vec![node("n1"), node("n2")], MockConnector::new());

    h.cluster.build_image(build_opts("team/api")).await.unwrap();

    assert_eq!(h.holders("team/api").await, vec![node("n1")]);
    assert_eq!(h.connector.node(&node("n1")).call_count(MockOp::Build), 1);
    assert_eq!(h.connector.node(&node("n2")).calls().len(), 0);
}

#[tokio::test]
async fn test_build_with_no_members_fails() {
    let h = Harness::new(InMemoryLocationIndex::new(), vec![], MockConnector::new());

    let err = h.cluster.build_image(build_opts("team/api")).await.unwrap_err();

    assert!(matches!(err, ClusterError::Resolution(_)));
    assert!(h.index.is_empty().await);
}

#[tokio::test]
async fn test_build_failure_leaves_index_alone() {
    let connector = MockConnector::new().with_node(
        node("n1"),
        MockNodeClient::new().failing(MockOp::Build, NodeError::Engine("no such file".into())),
    );
    let h = Harness::new(InMemoryLocationIndex::new(), vec![node("n1")], connector);

    let err = h.cluster.build_image(build_opts("team/api")).await.unwrap_err();

    assert_eq!(err.node_address(), Some(&node("n1")));
    assert!(h.index.is_empty().await);
}

// -- queries --

#[tokio::test]
async fn test_holders_and_images() {
    let index = InMemoryLocationIndex::with_records([
        (image("alpine"), vec![node("n1")]),
        (image("busybox"), vec![node("n2"), node("n1")]),
    ]);
    let h = Harness::new(index, vec![], MockConnector::new());

    assert_eq!(
        h.cluster.holders(&image("busybox")).await.unwrap(),
        vec![node("n2"), node("n1")]
    );

    let mut images = h.cluster.images().await.unwrap();
    images.sort();
    assert_eq!(images, vec![image("alpine"), image("busybox")]);
}
