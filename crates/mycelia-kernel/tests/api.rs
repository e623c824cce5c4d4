#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use mycelia_core::report::BenchReport;
use mycelia_kernel::app_state::AppState;
use mycelia_kernel::config::{self, MyceliaConfig};
use mycelia_kernel::kernel::SubscriptionId;
use mycelia_kernel::ops::{self, api};

fn state() -> AppState {
    AppState::new(MyceliaConfig::default()).unwrap()
}

fn status_of<T: IntoResponse>(r: T) -> StatusCode {
    r.into_response().status()
}

async fn body_text(r: Response) -> String {
    let bytes = axum::body::to_bytes(r.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn error_code<T: IntoResponse>(r: T) -> String {
    let body: Value = serde_json::from_str(&body_text(r.into_response()).await).unwrap();
    body["code"].as_str().unwrap().to_string()
}

fn subscribe_req(subscriber: &str, pattern: &str) -> Json<api::SubscribeReq> {
    Json(api::SubscribeReq {
        subscriber: subscriber.into(),
        pattern: pattern.into(),
    })
}

#[tokio::test]
async fn publish_subscribe_poll_roundtrip() {
    let st = state();

    let req = api::SubscribeReq {
        subscriber: "web".into(),
        pattern: "chat/{room}".into(),
    };
    let (code, _) = api::subscribe(State(st.clone()), Json(req)).await.unwrap();
    assert_eq!(code, StatusCode::CREATED);

    let body = r#"{"v":1,"path":"chat/lobby","data":{"msg":"hello"}}"#.to_string();
    let Json(report) = api::publish(State(st.clone()), body).await.unwrap();
    assert_eq!(report.delivered, 1);

    let Json(msgs) = api::poll(
        State(st.clone()),
        Path("web".into()),
        Query(api::PollQuery { max: 10 }),
    )
    .await
    .unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].path, "chat/lobby");
    assert_eq!(msgs[0].data["msg"], "hello");
}

#[tokio::test]
async fn send_through_builtin_echo() {
    let st = state();
    let req = api::SubscribeReq {
        subscriber: "echo-listener".into(),
        pattern: "echoed/**".into(),
    };
    api::subscribe(State(st.clone()), Json(req)).await.unwrap();

    let body = r#"{"v":1,"path":"echo/ping","data":"pong"}"#.to_string();
    let code = api::send(State(st.clone()), body).await.unwrap();
    assert_eq!(code, StatusCode::ACCEPTED);

    let inbox = st.kernel().subscriptions().inbox("echo-listener").unwrap();
    assert_eq!(inbox.dequeue().unwrap().path, "echoed/ping");
}

#[tokio::test]
async fn errors_map_to_http_status() {
    let st = state();

    let bad = api::publish(State(st.clone()), "{not json".into()).await;
    assert_eq!(status_of(bad), StatusCode::BAD_REQUEST);

    for v in ["9", "300", "-1"] {
        let body = format!(r#"{{"v":{v},"path":"a"}}"#);
        let version = api::publish(State(st.clone()), body).await.into_response();
        assert_eq!(version.status(), StatusCode::BAD_REQUEST, "v={v}");
        assert_eq!(error_code(version).await, "UNSUPPORTED_VERSION", "v={v}");
    }

    let no_route = api::send(State(st.clone()), r#"{"v":1,"path":"nowhere"}"#.into()).await;
    assert_eq!(status_of(no_route), StatusCode::NOT_FOUND);

    let unknown = api::poll(
        State(st.clone()),
        Path("ghost".into()),
        Query(api::PollQuery { max: 1 }),
    )
    .await;
    assert_eq!(status_of(unknown), StatusCode::NOT_FOUND);

    st.drain();
    let draining = api::publish(State(st.clone()), r#"{"v":1,"path":"a"}"#.into()).await;
    assert_eq!(status_of(draining), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_of(ops::readyz(State(st.clone())).await), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn report_endpoint_and_metrics() {
    let st = state();
    assert_eq!(status_of(api::report(State(st.clone())).await), StatusCode::NOT_FOUND);

    st.set_report("# Mycelia Kernel Benchmark Results\n".into());
    assert_eq!(status_of(api::report(State(st.clone())).await), StatusCode::OK);

    assert_eq!(status_of(ops::healthz().await), StatusCode::OK);
    let metrics = ops::metrics(State(st.clone())).await;
    assert_eq!(metrics.status(), StatusCode::OK);

    let extra = st.metrics_extra();
    assert!(extra.contains(&("mycelia_routes", 1)));
}

#[tokio::test]
async fn delete_subscriber_closes_inbox() {
    let st = state();
    api::subscribe(State(st.clone()), subscribe_req("web", "chat/{room}")).await.unwrap();
    api::subscribe(State(st.clone()), subscribe_req("web", "news/**")).await.unwrap();
    api::subscribe(State(st.clone()), subscribe_req("other", "chat/{room}")).await.unwrap();
    let inbox = st.kernel().subscriptions().inbox("web").unwrap();

    let Json(body) = api::remove_subscriber(State(st.clone()), Path("web".into())).await;
    assert_eq!(body["removed"], 2);
    assert!(inbox.is_closed());
    assert!(st.kernel().subscriptions().inbox("web").is_none());
    assert_eq!(st.metrics().subscriptions_active.get(&[]), 1);

    let gone = api::poll(State(st.clone()), Path("web".into()), Query(api::PollQuery { max: 1 })).await;
    assert_eq!(status_of(gone), StatusCode::NOT_FOUND);

    let Json(again) = api::remove_subscriber(State(st.clone()), Path("web".into())).await;
    assert_eq!(again["removed"], 0);

    let body = r#"{"v":1,"path":"chat/lobby"}"#.to_string();
    let Json(report) = api::publish(State(st.clone()), body).await.unwrap();
    assert_eq!(report.matched, 1);
}

#[tokio::test]
async fn bench_endpoint_stores_report() {
    let cfg = config::load_from_str(
        r#"
version: 1
bench:
  iterations: 200
  subscribers: 2
  routes: 2
  payload_bytes: 8
  latency_samples: 100
"#,
    )
    .unwrap();
    let st = AppState::new(cfg).unwrap();

    let ran = api::bench(State(st.clone())).await.unwrap();
    assert_eq!(ran.status(), StatusCode::OK);
    let ran_text = body_text(ran).await;

    let stored = api::report(State(st.clone())).await;
    assert_eq!(stored.status(), StatusCode::OK);
    let text = body_text(stored).await;
    assert_eq!(text, ran_text);

    let parsed = BenchReport::parse(&text).unwrap();
    assert_eq!(parsed.sections.len(), 5);
    assert!(parsed.metric("Queue Operations", "Enqueue").unwrap().value > 0.0);
    assert!(parsed.metric("Latency Percentiles", "p99").is_some());

    // the private bench kernel leaves the served one untouched
    assert_eq!(st.kernel().subscriptions().subscriber_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribe_and_unsubscribe() {
    let st = state();

    let tasks: Vec<_> = (0..4)
        .map(|t| {
            let st = st.clone();
            tokio::spawn(async move {
                let mut broken = 0u32;
                for _ in 0..2_000 {
                    let (_, Json(body)) = api::subscribe(
                        State(st.clone()),
                        subscribe_req("shared", &format!("t{t}/{{id}}")),
                    )
                    .await
                    .unwrap();
                    let id = SubscriptionId(body["id"].as_u64().unwrap());

                    match st.kernel().subscriptions().inbox("shared") {
                        Some(inbox) if !inbox.is_closed() => {}
                        _ => broken += 1,
                    }
                    assert!(st.kernel().unsubscribe(id));
                }
                broken
            })
        })
        .collect();

    for t in tasks {
        assert_eq!(t.await.unwrap(), 0);
    }
    assert_eq!(st.kernel().subscriptions().subscription_count(), 0);
    assert!(st.kernel().subscriptions().inbox("shared").is_none());
    assert_eq!(st.metrics().subscriptions_active.get(&[]), 0);
}
