//! Session lifecycle: bootstrap, deadlines, member departure, isolation.

use std::sync::Arc;
use std::time::Duration;

use gridlink::proxy::codec::set_op;
use gridlink::{ClientError, ConnectionError, GridClient, InvocationError};

use super::fake::{address, member_id, wait_until, FakeCluster, PARTITION_COUNT};

#[tokio::test]
async fn test_bootstrap_rejects_wrong_cluster_name() {
    let cluster = FakeCluster::named("prod", 1);
    let config = cluster.config().build().expect("config");

    match GridClient::connect_with(config, Arc::new(cluster.clone())).await {
        Err(ClientError::Bootstrap(ConnectionError::AuthenticationFailed { reason, .. })) => {
            assert!(reason.contains("AuthenticationException"));
        }
        other => panic!("expected an authentication failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bootstrap_fails_when_no_address_answers() {
    let cluster = FakeCluster::new(1);
    let config = cluster
        .config()
        .addresses([address(8), address(9)])
        .build()
        .expect("config");

    let result = GridClient::connect_with(config, Arc::new(cluster.clone())).await;
    assert!(matches!(result, Err(ClientError::Bootstrap(_))));
}

#[tokio::test]
async fn test_bootstrap_tries_addresses_in_order() {
    let cluster = FakeCluster::new(2);
    let config = cluster
        .config()
        .addresses([address(9), address(2), address(1)])
        .build()
        .expect("config");

    let client = GridClient::connect_with(config, Arc::new(cluster.clone()))
        .await
        .expect("connect");
    assert_eq!(client.runtime().connections().connected_members(), vec![member_id(2)]);
    assert_eq!(client.members().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_member_times_out_at_deadline() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let set = client.get_set::<i64>("silent");
    cluster.silence(member_id(1));

    let start = tokio::time::Instant::now();
    let result = set.size().await;
    let elapsed = start.elapsed();

    match result {
        Err(InvocationError::InvocationTimeout { op_code, timeout }) => {
            assert_eq!(op_code, set_op::SIZE);
            assert_eq!(timeout, Duration::from_secs(5));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_millis(5100));
    assert_eq!(client.runtime().invocations().pending_count(), 0);
}

#[tokio::test]
async fn test_departed_member_fails_pending_invocation() {
    let cluster = FakeCluster::new(2);
    let client = cluster.client().await;
    let departed = member_id(2);

    cluster.set_owners(vec![Some(departed); PARTITION_COUNT as usize]);
    let router = client.runtime().router().clone();
    wait_until(|| router.route(b"leaving") == Ok(departed)).await;
    cluster.silence(departed);

    let set = client.get_set::<i64>("leaving");
    let (result, ()) = tokio::join!(set.size(), async {
        wait_until(|| cluster.served_by(set_op::SIZE) == vec![departed]).await;
        cluster.remove_member(departed);
    });

    match result {
        Err(InvocationError::MemberLeft { member }) => assert_eq!(member, departed),
        other => panic!("expected MemberLeft, got {:?}", other),
    }
    assert_eq!(client.members().len(), 1);

    // Partitions moved to the survivor.
    wait_until(|| router.route(b"leaving") == Ok(member_id(1))).await;
    assert_eq!(set.size().await.expect("size"), 0);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let cluster = FakeCluster::new(1);
    let a = cluster.client().await;
    let b = cluster.client().await;

    let set_a = a.get_set::<i64>("shared");
    let set_b = b.get_set::<i64>("shared");
    assert!(!Arc::ptr_eq(set_a.core(), set_b.core()));

    let (ra, rb) = tokio::join!(set_a.add(&1), set_b.add(&2));
    assert!(ra.expect("add a"));
    assert!(rb.expect("add b"));
    assert_eq!(set_a.size().await.expect("size"), 2);

    a.shutdown();
    assert!(matches!(
        set_a.contains(&1).await,
        Err(InvocationError::ClientShutdown)
    ));
    assert!(set_b.contains(&1).await.expect("b still works"));
    assert_eq!(b.runtime().invocations().pending_count(), 0);
}

#[tokio::test]
async fn test_dropping_client_shuts_it_down() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let set = client.get_set::<i64>("orphaned");
    set.add(&1).await.expect("add");

    drop(client);
    assert!(matches!(
        set.add(&2).await,
        Err(InvocationError::ClientShutdown)
    ));
}
