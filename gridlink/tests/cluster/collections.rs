//! Queue and map proxies, and remote errors.

use gridlink::{InvocationError, InvocationRequest, Target};

use super::fake::FakeCluster;

#[tokio::test]
async fn test_queue_is_fifo() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;
    let queue = client.get_queue::<String>("fifo");

    assert!(queue.is_empty().await.expect("is_empty"));
    for item in ["a", "b", "c"] {
        assert!(queue.offer(&item.to_string()).await.expect("offer"));
    }
    assert_eq!(queue.peek().await.expect("peek"), Some("a".to_string()));
    assert_eq!(queue.size().await.expect("size"), 3);
    assert_eq!(queue.poll().await.expect("poll"), Some("a".to_string()));
    assert_eq!(queue.poll().await.expect("poll"), Some("b".to_string()));

    queue.clear().await.expect("clear");
    assert_eq!(queue.poll().await.expect("poll"), None);
    assert_eq!(queue.peek().await.expect("peek"), None);
    queue.destroy().await.expect("destroy");
}

#[tokio::test]
async fn test_map_operations() {
    let cluster = FakeCluster::new(2);
    let client = cluster.client().await;
    let map = client.get_map::<String, u32>("ages");
    let ada = "ada".to_string();

    assert_eq!(map.put(&ada, &36).await.expect("put"), None);
    assert_eq!(map.put(&ada, &37).await.expect("put"), Some(36));
    assert_eq!(map.get(&ada).await.expect("get"), Some(37));
    assert!(map.contains_key(&ada).await.expect("contains_key"));
    assert!(!map
        .contains_key(&"grace".to_string())
        .await
        .expect("contains_key"));
    assert_eq!(map.size().await.expect("size"), 1);

    assert_eq!(map.remove(&ada).await.expect("remove"), Some(37));
    assert_eq!(map.get(&ada).await.expect("get"), None);

    map.put(&ada, &1).await.expect("put");
    map.clear().await.expect("clear");
    assert!(map.is_empty().await.expect("is_empty"));
    map.destroy().await.expect("destroy");
}

#[tokio::test]
async fn test_remote_error_surfaces_verbatim() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;

    let request = InvocationRequest::new(Target::Coordinator, 0x7F01, b"{}".to_vec());
    match client.runtime().invocations().invoke(request).await {
        Err(InvocationError::Remote(error)) => {
            assert_eq!(error.class_name, "UnsupportedOperationException");
            assert_eq!(error.message, "op 0x7f01");
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_decode_failure_is_a_codec_error() {
    let cluster = FakeCluster::new(1);
    let client = cluster.client().await;

    client
        .get_set::<String>("mixed")
        .add(&"text".to_string())
        .await
        .expect("add");
    let numbers = client.get_set::<i64>("mixed");
    assert!(matches!(
        numbers.get_all().await,
        Err(InvocationError::Codec(_))
    ));
}
