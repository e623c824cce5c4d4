#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mycelia_core::error::Result;
use mycelia_core::message::{Message, Payload};
use mycelia_kernel::config::KernelSection;
use mycelia_kernel::kernel::{Kernel, KernelCtx, QoS};
use mycelia_kernel::obs::KernelMetrics;
use mycelia_kernel::queue::OverflowPolicy;
use mycelia_kernel::routing::MessageHandler;
use mycelia_kernel::services::{CountingHandler, EchoService};

fn kernel(capacity: usize, overflow: OverflowPolicy) -> Kernel {
    let cfg = KernelSection {
        inbox_capacity: capacity,
        overflow,
        reliable_timeout_ms: 50,
    };
    Kernel::new(cfg, Arc::new(KernelMetrics::default()))
}

/// Publishes `{id}` back to `replies/{id}`.
struct Replier;

#[async_trait]
impl MessageHandler for Replier {
    async fn handle(&self, ctx: KernelCtx, msg: Message) -> Result<()> {
        let id = ctx.param("id").unwrap().to_string();
        let reply = Message::new(&format!("replies/{id}"), msg.payload)?;
        ctx.publish(reply, QoS::Lossy).await?;
        Ok(())
    }
}

#[tokio::test]
async fn send_routes_to_one_handler_with_params() {
    let k = kernel(16, OverflowPolicy::Reject);
    k.route("orders/{id}", Arc::new(Replier)).unwrap();
    let (_, inbox) = k.subscribe("client", "replies/*").unwrap();

    let msg = k.message("orders/42", Payload::Json(json!({ "qty": 1 }))).unwrap();
    k.send(msg).await.unwrap();

    let got = inbox.dequeue().unwrap();
    assert_eq!(got.path, "replies/42");
    assert_ne!(got.id.0, 0);
    assert_eq!(k.metrics().messages_sent.get(&[("outcome", "ok")]), 1);
}

#[tokio::test]
async fn send_errors_are_counted() {
    let k = kernel(16, OverflowPolicy::Reject);
    let sink = Arc::new(CountingHandler::new());
    k.route_scoped("admin/{cmd}", "admin:write", sink.clone()).unwrap();

    let err = k.send(k.message("nowhere", Payload::Empty).unwrap()).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NO_ROUTE");

    let denied = k.message("admin/reset", Payload::Empty).unwrap();
    let err = k.send(denied).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_ALLOWED");

    let allowed = k
        .message("admin/reset", Payload::Empty)
        .unwrap()
        .with_scopes(["admin:*"]);
    k.send(allowed).await.unwrap();
    assert_eq!(sink.messages(), 1);

    let m = k.metrics();
    assert_eq!(m.routing_errors.get(&[("code", "NO_ROUTE")]), 1);
    assert_eq!(m.routing_errors.get(&[("code", "NOT_ALLOWED")]), 1);
    assert_eq!(m.messages_sent.get(&[("outcome", "ok")]), 1);
}

#[tokio::test]
async fn publish_fans_out_once_per_subscriber() {
    let k = kernel(16, OverflowPolicy::Reject);
    let (_, a) = k.subscribe("a", "events/**").unwrap();
    k.subscribe("a", "events/user/created").unwrap();
    let (_, b) = k.subscribe("b", "events/user/{kind}").unwrap();
    k.subscribe("c", "other/*").unwrap();

    let msg = k.message("events/user/created", Payload::Empty).unwrap();
    let report = k.publish(msg, QoS::Lossy).await.unwrap();

    assert_eq!(report.matched, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
}

#[tokio::test]
async fn lossy_overflow_follows_inbox_policy() {
    let k = kernel(2, OverflowPolicy::DropNewest);
    let (_, inbox) = k.subscribe("slow", "ticks").unwrap();

    let mut dropped = 0;
    for _ in 0..5 {
        let r = k.publish(k.message("ticks", Payload::Empty).unwrap(), QoS::Lossy).await.unwrap();
        dropped += r.dropped;
    }
    assert_eq!(dropped, 3);
    assert_eq!(inbox.len(), 2);
    assert_eq!(k.metrics().deliveries.get(&[("outcome", "dropped")]), 3);
}

#[tokio::test]
async fn reliable_publish_times_out_on_full_inbox() {
    let k = kernel(1, OverflowPolicy::Reject);
    let (_, inbox) = k.subscribe("slow", "ticks").unwrap();

    k.publish(k.message("ticks", Payload::Empty).unwrap(), QoS::Lossy).await.unwrap();
    let r = k
        .publish(k.message("ticks", Payload::Empty).unwrap(), QoS::Reliable { timeout_ms: 20 })
        .await
        .unwrap();
    assert_eq!((r.delivered, r.failed), (0, 1));

    // a consumer frees space while the reliable publish waits
    let consumer = {
        let inbox = Arc::clone(&inbox);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            inbox.dequeue()
        })
    };
    let r = k.publish_reliable(k.message("ticks", Payload::Empty).unwrap()).await.unwrap();
    assert_eq!(r.delivered, 1);
    assert!(consumer.await.unwrap().is_some());
}

#[tokio::test]
async fn echo_service_republishes() {
    let k = kernel(8, OverflowPolicy::Reject);
    let echo = Arc::new(EchoService::new());
    k.route(echo.pattern(), echo).unwrap();
    let (_, inbox) = k.subscribe("listener", "echoed/{topic}").unwrap();

    let msg = k.message("echo/greetings", Payload::Json(json!("hi"))).unwrap();
    k.send(msg).await.unwrap();

    let got = inbox.dequeue().unwrap();
    assert_eq!(got.path, "echoed/greetings");
    match got.payload {
        Payload::Json(v) => assert_eq!(v, json!("hi")),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn drain_rejects_traffic_and_closes_inboxes() {
    let k = kernel(8, OverflowPolicy::Reject);
    let (_, inbox) = k.subscribe("a", "x").unwrap();
    k.publish(k.message("x", Payload::Empty).unwrap(), QoS::Lossy).await.unwrap();

    k.drain();
    assert!(k.is_draining());
    assert!(k.metrics().is_draining());

    let err = k.publish(k.message("x", Payload::Empty).unwrap(), QoS::Lossy).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_ALLOWED");
    assert!(k.subscribe("b", "y").is_err());

    // backlog stays readable, then the inbox reports end of stream
    assert!(inbox.recv().await.is_some());
    assert!(inbox.recv().await.is_none());
}

#[tokio::test]
async fn subscription_gauge_tracks_unsubscribe() {
    let k = kernel(8, OverflowPolicy::Reject);
    let (s1, _) = k.subscribe("a", "x").unwrap();
    k.subscribe("a", "y").unwrap();
    k.subscribe("b", "y").unwrap();
    assert_eq!(k.metrics().subscriptions_active.get(&[]), 3);

    assert!(k.unsubscribe(s1));
    assert_eq!(k.remove_subscriber("a"), 1);
    assert_eq!(k.metrics().subscriptions_active.get(&[]), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribe_racing_drain_never_hands_out_open_inbox() {
    let k = kernel(4, OverflowPolicy::Reject);

    let tasks: Vec<_> = (0..3)
        .map(|t| {
            let k = k.clone();
            tokio::spawn(async move {
                let mut granted = Vec::new();
                for i in 0..100_000 {
                    match k.subscribe(&format!("s{t}-{i}"), "race/**") {
                        Ok((_, inbox)) => granted.push(inbox),
                        Err(e) => {
                            assert_eq!(e.code().as_str(), "NOT_ALLOWED");
                            break;
                        }
                    }
                    tokio::task::yield_now().await;
                }
                granted
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(5)).await;
    k.drain();

    for t in tasks {
        for inbox in t.await.unwrap() {
            assert!(inbox.is_closed());
        }
    }
    let active = k.metrics().subscriptions_active.get(&[]);
    assert_eq!(active, k.subscriptions().subscription_count() as i64);
}
