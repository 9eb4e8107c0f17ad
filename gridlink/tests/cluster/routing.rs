//! Partition-aware routing.

use std::time::Duration;

use gridlink::proxy::codec::map_op;
use gridlink::{InvocationError, Serializer};
use gridlink_transport::partition::partition_id;

use super::fake::{member_id, wait_until, FakeCluster, PARTITION_COUNT};

fn routing_key(key: &str) -> Vec<u8> {
    let serializer: Serializer = Serializer::default();
    serializer
        .to_data(key)
        .expect("encode key")
        .bytes()
        .to_vec()
}

#[tokio::test]
async fn test_partition_update_moves_key_to_new_owner() {
    let cluster = FakeCluster::new(2);
    let client = cluster.client().await;
    let (first, second) = (member_id(1), member_id(2));
    let map = client.get_map::<String, i64>("routed");
    let key = "k".to_string();
    let bytes = routing_key(&key);
    let partition = partition_id(&bytes, PARTITION_COUNT) as usize;

    let mut owners = vec![Some(first); PARTITION_COUNT as usize];
    cluster.set_owners(owners.clone());
    let router = client.runtime().router().clone();
    wait_until(|| router.route(&bytes) == Ok(first)).await;

    assert_eq!(map.put(&key, &1).await.expect("put"), None);
    assert_eq!(cluster.served_by(map_op::PUT), vec![first]);

    owners[partition] = Some(second);
    cluster.set_owners(owners);
    wait_until(|| router.route(&bytes) == Ok(second)).await;

    assert_eq!(map.get(&key).await.expect("get"), Some(1));
    assert_eq!(cluster.served_by(map_op::GET), vec![second]);
}

#[tokio::test]
async fn test_bulk_map_ops_go_to_oldest_member() {
    let cluster = FakeCluster::new(3);
    let client = cluster.client().await;
    let map = client.get_map::<String, String>("bulk");

    for i in 0..6 {
        map.put(&format!("key-{}", i), &"v".to_string())
            .await
            .expect("put");
    }
    assert_eq!(map.size().await.expect("size"), 6);
    map.clear().await.expect("clear");
    assert!(map.is_empty().await.expect("is_empty"));

    assert_eq!(cluster.served_by(map_op::SIZE), vec![member_id(1); 2]);
    assert_eq!(cluster.served_by(map_op::CLEAR), vec![member_id(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_owner_exhausts_attempts() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    cluster.set_owners(vec![None; PARTITION_COUNT as usize]);
    let router = client.runtime().router().clone();
    wait_until(|| router.route(b"orphan").is_err()).await;

    let set = client.get_set::<i64>("orphan");
    match set.size().await {
        Err(InvocationError::NoOwnerYet { partition }) => assert!(partition.is_some()),
        other => panic!("expected NoOwnerYet, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_owner_times_out() {
    let cluster = FakeCluster::new(1);
    let config = cluster
        .config()
        .invocation_timeout(Duration::from_secs(1))
        .max_invocation_attempts(u32::MAX)
        .build()
        .expect("config");
    let client = gridlink::GridClient::connect_with(config, std::sync::Arc::new(cluster.clone()))
        .await
        .expect("connect");
    cluster.set_owners(vec![None; PARTITION_COUNT as usize]);
    let router = client.runtime().router().clone();
    wait_until(|| router.route(b"orphan").is_err()).await;

    let start = tokio::time::Instant::now();
    let result = client.get_set::<i64>("orphan").size().await;
    let elapsed = start.elapsed();

    assert!(matches!(
        result,
        Err(InvocationError::InvocationTimeout { .. })
    ));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1100));
}
