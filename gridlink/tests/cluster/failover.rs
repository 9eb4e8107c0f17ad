//! Connection loss: failed and resent invocations, background reconnect.

use std::sync::Arc;
use std::time::Duration;

use gridlink::proxy::codec::set_op;
use gridlink::{ConnectionConfig, GridClient, InvocationError};

use super::fake::{member_id, wait_until, FakeCluster};

#[tokio::test]
async fn test_connection_loss_fails_non_retryable_invocation() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let member = member_id(1);
    let set = client.get_set::<i64>("dropped");
    cluster.silence(member);

    let (result, ()) = tokio::join!(set.add(&1), async {
        wait_until(|| cluster.served_by(set_op::ADD).len() == 1).await;
        cluster.disconnect(member);
    });

    match result {
        Err(InvocationError::TargetDisconnected { member: target }) => {
            assert_eq!(target, member)
        }
        other => panic!("expected TargetDisconnected, got {:?}", other),
    }
    // Not resent: the add may have been applied.
    assert_eq!(cluster.served_by(set_op::ADD), vec![member]);
    assert_eq!(client.runtime().invocations().pending_count(), 0);
}

#[tokio::test]
async fn test_retryable_invocation_resent_on_new_connection() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let member = member_id(1);
    let set = client.get_set::<i64>("resent");
    cluster.silence(member);

    let (result, ()) = tokio::join!(set.size(), async {
        wait_until(|| cluster.served_by(set_op::SIZE).len() == 1).await;
        cluster.resume(member);
        cluster.disconnect(member);
    });

    assert_eq!(result.expect("size after reconnect"), 0);
    assert_eq!(cluster.served_by(set_op::SIZE), vec![member, member]);
    let correlations = cluster.correlations(set_op::SIZE);
    assert_ne!(correlations[0], correlations[1]);
    assert_eq!(cluster.authentications(member), 2);
}

#[tokio::test]
async fn test_dropped_connection_reconnects_in_background() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let member = member_id(1);
    assert_eq!(cluster.authentications(member), 1);

    cluster.disconnect(member);
    wait_until(|| cluster.authentications(member) == 2).await;
    let connections = client.runtime().connections().clone();
    wait_until(|| connections.is_connected(member)).await;

    let set = client.get_set::<i64>("after-reconnect");
    assert!(set.add(&1).await.expect("add"));
    assert_eq!(cluster.authentications(member), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backs_off_while_member_refuses() {
    let cluster = FakeCluster::new(1);
    let config = cluster
        .config()
        .connection(ConnectionConfig {
            max_connection_failures: 10,
            ..ConnectionConfig::local_network()
        })
        .build()
        .expect("config");
    let client = GridClient::connect_with(config, Arc::new(cluster.clone()))
        .await
        .expect("connect");
    let member = member_id(1);

    cluster.refuse_connections(member, true);
    cluster.disconnect(member);
    // Bootstrap dial plus four refused reconnects.
    wait_until(|| cluster.dial_times(member).len() >= 5).await;

    let dials = cluster.dial_times(member);
    let gaps: Vec<Duration> = dials[1..].windows(2).map(|w| w[1] - w[0]).collect();
    assert!(
        gaps.windows(2).all(|pair| pair[1] > pair[0]),
        "reconnect gaps do not grow: {:?}",
        gaps
    );

    cluster.refuse_connections(member, false);
    let connections = client.runtime().connections().clone();
    wait_until(|| connections.is_connected(member)).await;
    assert!(!connections.is_unreachable(member));
}
