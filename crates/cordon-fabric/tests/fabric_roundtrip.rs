//! End-to-end fabric tests: two real nodes over loopback TCP exchanging
//! requests, responses, failures, and notifies.

use async_trait::async_trait;
use cordon_core::{CordonError, CordonResult, FabricConfig, FabricTimeouts, NodeId, NodeIdentity, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler, LINK_RESTORED_INTENT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn identity(id: &str, role: NodeRole, port: u16) -> NodeIdentity {
    NodeIdentity {
        id: NodeId::new(id),
        role,
        host: "127.0.0.1".to_string(),
        port,
    }
}

/// Build a two-node fabric (access proxy and data center) on ephemeral
/// ports, start both, and patch the resolved addresses into each table.
async fn start_pair() -> (FabricNode, FabricNode) {
    let config = FabricConfig {
        nodes: vec![
            identity("ap", NodeRole::AccessProxy, 0),
            identity("dc", NodeRole::DataCenter, 0),
        ],
        timeouts: FabricTimeouts {
            connect_wait_secs: 1,
            request_secs: 2,
        },
    };

    let ap = FabricNode::new(identity("ap", NodeRole::AccessProxy, 0), &config);
    let dc = FabricNode::new(identity("dc", NodeRole::DataCenter, 0), &config);

    let ap_addr = ap.start().await.unwrap();
    let dc_addr = dc.start().await.unwrap();

    for node in [&ap, &dc] {
        node.update_peer(identity("ap", NodeRole::AccessProxy, ap_addr.port()))
            .await;
        node.update_peer(identity("dc", NodeRole::DataCenter, dc_addr.port()))
            .await;
    }

    (ap, dc)
}

struct Echo;

#[async_trait]
impl IntentHandler for Echo {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        Ok(Some(envelope.payload))
    }
}

/// Sleeps for `delay_ms` from the payload, then answers with its `tag`.
struct DelayedTag;

#[async_trait]
impl IntentHandler for DelayedTag {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let delay = envelope
            .payload
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Some(envelope.payload["tag"].clone()))
    }
}

struct Failing;

#[async_trait]
impl IntentHandler for Failing {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        _envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        Err(CordonError::not_found("user record"))
    }
}

struct Recorder(mpsc::UnboundedSender<serde_json::Value>);

#[async_trait]
impl IntentHandler for Recorder {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let _ = self.0.send(envelope.payload);
        Ok(None)
    }
}

#[tokio::test]
async fn request_gets_a_correlated_response() {
    let (ap, dc) = start_pair().await;
    dc.register_handler(NodeRole::AccessProxy, "fetch", Arc::new(Echo))
        .await;

    let answer = ap
        .request(&NodeId::new("dc"), "fetch", json!({"user_id": "u1"}))
        .await
        .unwrap();
    assert_eq!(answer, json!({"user_id": "u1"}));

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_do_not_cross_deliver() {
    let (ap, dc) = start_pair().await;
    dc.register_handler(NodeRole::AccessProxy, "fetch", Arc::new(DelayedTag))
        .await;

    let slow = {
        let ap = ap.clone();
        tokio::spawn(async move {
            ap.request(
                &NodeId::new("dc"),
                "fetch",
                json!({"tag": "slow", "delay_ms": 300}),
            )
            .await
        })
    };
    // Give the slow request a head start so both are in flight at once.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast = ap
        .request(&NodeId::new("dc"), "fetch", json!({"tag": "fast", "delay_ms": 0}))
        .await
        .unwrap();

    assert_eq!(fast, json!("fast"));
    assert_eq!(slow.await.unwrap().unwrap(), json!("slow"));

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn handler_error_surfaces_as_remote_failure() {
    let (ap, dc) = start_pair().await;
    dc.register_handler(NodeRole::AccessProxy, "fetch", Arc::new(Failing))
        .await;

    let err = ap
        .request(&NodeId::new("dc"), "fetch", json!({}))
        .await
        .unwrap_err();
    match err {
        CordonError::Remote(message) => assert!(message.contains("user record")),
        other => panic!("expected remote failure, got {other}"),
    }

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn request_to_unconfigured_peer_fails() {
    let (ap, dc) = start_pair().await;

    let err = ap
        .request(&NodeId::new("ghost"), "fetch", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CordonError::UnknownPeer { .. }));

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn notify_is_delivered_without_a_reply() {
    let (ap, dc) = start_pair().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    dc.register_handler(NodeRole::AccessProxy, "heartbeat", Arc::new(Recorder(tx)))
        .await;

    ap.send(&NodeId::new("dc"), "heartbeat", json!({"seq": 1}))
        .await
        .unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, json!({"seq": 1}));

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn always_on_peer_is_redialed_after_unexpected_drop() {
    let (ap, dc) = start_pair().await;
    ap.connect(&NodeId::new("dc")).await.unwrap();

    // A stand-in carrying the same identity, listening before the drop so
    // the survivor's single redial has somewhere to land.
    let config = FabricConfig {
        nodes: vec![
            identity("ap", NodeRole::AccessProxy, 0),
            identity("dc", NodeRole::DataCenter, 0),
        ],
        timeouts: FabricTimeouts {
            connect_wait_secs: 1,
            request_secs: 2,
        },
    };
    let replacement = FabricNode::new(identity("ap", NodeRole::AccessProxy, 0), &config);
    let new_addr = replacement.start().await.unwrap();
    dc.update_peer(identity("ap", NodeRole::AccessProxy, new_addr.port()))
        .await;

    ap.shutdown().await;

    // The access proxy is always-on, so the data center redials as soon as
    // it observes the dropped link.
    let mut restored = false;
    for _ in 0..40 {
        if dc.is_reachable(&NodeId::new("ap")).await
            && replacement.is_reachable(&NodeId::new("dc")).await
        {
            restored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(restored, "data center never redialed the dropped access proxy");

    replacement.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn returning_web_front_gets_a_link_restored_notice() {
    let config = FabricConfig {
        nodes: vec![
            identity("dc", NodeRole::DataCenter, 0),
            identity("web", NodeRole::WebFront, 0),
        ],
        timeouts: FabricTimeouts {
            connect_wait_secs: 1,
            request_secs: 2,
        },
    };
    let dc = FabricNode::new(identity("dc", NodeRole::DataCenter, 0), &config);
    let web = FabricNode::new(identity("web", NodeRole::WebFront, 0), &config);
    let dc_addr = dc.start().await.unwrap();
    let web_addr = web.start().await.unwrap();
    for node in [&dc, &web] {
        node.update_peer(identity("dc", NodeRole::DataCenter, dc_addr.port()))
            .await;
        node.update_peer(identity("web", NodeRole::WebFront, web_addr.port()))
            .await;
    }

    web.connect(&NodeId::new("dc")).await.unwrap();
    let mut linked = false;
    for _ in 0..40 {
        if dc.is_reachable(&NodeId::new("web")).await {
            linked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(linked);

    // The web front is a dependent peer: the data center records the drop
    // instead of redialing.
    web.shutdown().await;
    let mut dropped = false;
    for _ in 0..40 {
        if !dc.is_reachable(&NodeId::new("web")).await {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(dropped);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let returning = FabricNode::new(identity("web", NodeRole::WebFront, 0), &config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    returning
        .register_handler(NodeRole::DataCenter, LINK_RESTORED_INTENT, Arc::new(Recorder(tx)))
        .await;
    returning.start().await.unwrap();
    returning
        .update_peer(identity("dc", NodeRole::DataCenter, dc_addr.port()))
        .await;
    returning.connect(&NodeId::new("dc")).await.unwrap();

    let notice = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice, json!({"peer": "dc"}));

    returning.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn concurrent_dials_keep_one_usable_outbound_link() {
    let (ap, dc) = start_pair().await;
    dc.register_handler(NodeRole::AccessProxy, "fetch", Arc::new(Echo))
        .await;

    let dc_id = NodeId::new("dc");
    let (first, second) = tokio::join!(ap.connect(&dc_id), ap.connect(&dc_id));
    first.unwrap();
    second.unwrap();
    assert!(ap.is_reachable(&NodeId::new("dc")).await);

    // The losing dial's socket is discarded at registration time; the
    // surviving link still serves requests after the loser has closed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let answer = ap
        .request(&NodeId::new("dc"), "fetch", json!({"seq": 1}))
        .await
        .unwrap();
    assert_eq!(answer, json!({"seq": 1}));

    ap.shutdown().await;
    dc.shutdown().await;
}

#[tokio::test]
async fn wait_for_connection_returns_immediately_when_reachable() {
    let (ap, dc) = start_pair().await;
    ap.connect(&NodeId::new("dc")).await.unwrap();

    let started = std::time::Instant::now();
    ap.wait_for_connection(&NodeId::new("dc")).await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(ap.is_reachable(&NodeId::new("dc")).await);

    ap.shutdown().await;
    dc.shutdown().await;
}
