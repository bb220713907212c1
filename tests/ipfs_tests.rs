use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use minnow::config::StorageDaemonConfig;
use minnow::error::NodeError;
use minnow::ipfs::{multiaddr_to_host_port, IpfsClient};

#[test]
fn test_multiaddr_parsing() {
    assert_eq!(
        multiaddr_to_host_port("/ip4/127.0.0.1/tcp/5001").unwrap(),
        ("127.0.0.1".to_string(), 5001)
    );
    assert_eq!(
        multiaddr_to_host_port("/dns4/daemon.local/tcp/80").unwrap(),
        ("daemon.local".to_string(), 80)
    );
    assert_eq!(
        multiaddr_to_host_port("/ip6/::1/tcp/5001").unwrap(),
        ("::1".to_string(), 5001)
    );
    // Trailing protocol segments do not disturb dialing.
    assert_eq!(
        multiaddr_to_host_port("/ip4/10.0.0.1/tcp/5001/p2p/QmPeer").unwrap(),
        ("10.0.0.1".to_string(), 5001)
    );
}

#[test]
fn test_multiaddr_parsing_rejects_undialable() {
    for address in ["garbage", "/ip4/127.0.0.1", "/tcp/5001", "/ip4/1.2.3.4/tcp/notaport", ""] {
        let result = multiaddr_to_host_port(address);
        assert!(
            matches!(result, Err(NodeError::InvalidConfiguration(_))),
            "expected failure for {:?}, got {:?}",
            address,
            result
        );
    }
}

/// Stand up a minimal daemon API answering the endpoints the client uses.
async fn start_daemon() -> String {
    let app = Router::new()
        .route("/api/v0/id", post(|| async { Json(json!({ "ID": "QmSelf" })) }))
        .route(
            "/api/v0/swarm/addrs/local",
            post(|| async {
                Json(json!({ "Strings": ["/ip4/127.0.0.1/tcp/4001", "/ip4/10.0.0.5/tcp/4001"] }))
            }),
        )
        .route(
            "/api/v0/swarm/peers",
            post(|| async {
                Json(json!({ "Peers": [
                    { "Peer": "QmOther", "Addr": "/ip4/10.0.0.9/tcp/4001" }
                ] }))
            }),
        )
        .route(
            "/api/v0/dht/findprovs",
            post(|| async {
                // Newline-delimited provider events, the way the daemon
                // streams them.
                concat!(
                    r#"{"Type":4,"Responses":[{"ID":"QmSelf"}]}"#,
                    "\n",
                    r#"{"Type":4,"Responses":[{"ID":"QmOther"}]}"#,
                    "\n",
                )
            }),
        )
        .route(
            "/api/v0/get",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("/ip4/127.0.0.1/tcp/{}", addr.port())
}

fn client_for(api_address: String) -> IpfsClient {
    IpfsClient::new(StorageDaemonConfig {
        api_address,
        ..Default::default()
    })
    .expect("test multiaddr should parse")
}

#[tokio::test]
async fn test_peer_id_and_local_addrs() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();

    assert_eq!(client.peer_id(&ctx).await.unwrap(), "QmSelf");
    let addrs = client.local_addrs(&ctx).await.unwrap();
    assert_eq!(addrs.len(), 2);
    assert_eq!(addrs[0], "/ip4/127.0.0.1/tcp/4001");
}

#[tokio::test]
async fn test_swarm_addresses_append_peer_id() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();

    let addrs = client.swarm_addresses(&ctx).await.unwrap();
    assert_eq!(
        addrs,
        vec![
            "/ip4/127.0.0.1/tcp/4001/p2p/QmSelf".to_string(),
            "/ip4/10.0.0.5/tcp/4001/p2p/QmSelf".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_find_providers_and_local_check() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();

    let providers = client.find_providers(&ctx, "bafysomething").await.unwrap();
    assert_eq!(providers, vec!["QmSelf".to_string(), "QmOther".to_string()]);
    assert!(client.has_cid_locally(&ctx, "bafysomething").await.unwrap());
}

#[tokio::test]
async fn test_peers() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();

    let peers = client.peers(&ctx).await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].peer, "QmOther");
}

#[tokio::test]
async fn test_download_surfaces_daemon_errors() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();
    let target = tempfile::tempdir().unwrap();

    let result = client.download_tar(&ctx, target.path(), "bafybroken").await;
    assert!(matches!(result, Err(NodeError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_cancelled_context_aborts_requests() {
    let client = client_for(start_daemon().await);
    let ctx = CancellationToken::new();
    ctx.cancel();

    let result = client.peer_id(&ctx).await;
    assert!(matches!(result, Err(NodeError::Cancelled)));
}

#[test]
fn test_client_base_url_derives_from_multiaddr() {
    let client = client_for("/ip4/127.0.0.1/tcp/5001".to_string());
    assert_eq!(client.base_url(), "http://127.0.0.1:5001");
}

#[test]
fn test_client_rejects_bad_multiaddr() {
    let result = IpfsClient::new(StorageDaemonConfig {
        api_address: "not-a-multiaddr".to_string(),
        ..Default::default()
    });
    assert!(result.is_err());
}
