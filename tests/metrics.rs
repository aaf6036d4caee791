// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file holds a single test.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use tower::ServiceExt;

use blog_announcer::api::{self, AppState, WEBHOOK_PATH};
use blog_announcer::cms::MicroCmsClient;
use blog_announcer::compose::Composer;
use blog_announcer::executor::{ExecutorConfig, JobExecutor};
use blog_announcer::jobs::JobTable;
use blog_announcer::metrics::Metrics;
use blog_announcer::publish::DryRunSink;
use blog_announcer::trigger::TriggerValidator;

#[tokio::test]
async fn metrics_endpoint_contains_trigger_series() {
    let metrics = Metrics::init().expect("install recorder");

    let source = MicroCmsClient::new("http://127.0.0.1:9/api/v1", None, Duration::from_secs(1))
        .expect("client");
    let state = AppState {
        executor: JobExecutor::new(
            Arc::new(JobTable::new(Duration::from_secs(3600))),
            Arc::new(source),
            Arc::new(DryRunSink),
            Composer::new("New post: ", "https://blog.example.com/blogs/{id}"),
            ExecutorConfig::default(),
        ),
        validator: Arc::new(TriggerValidator::default()),
        debug_routes: true,
    };
    let app = api::router(state).merge(metrics.router());

    let ok = Request::post(WEBHOOK_PATH)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"service":"blog","api":"blogs","id":"m1","type":"new"}"#,
        ))
        .unwrap();
    let resp = app.clone().oneshot(ok).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let bad = Request::post(WEBHOOK_PATH)
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("nope"))
        .unwrap();
    let resp = app.clone().oneshot(bad).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("announcer_triggers_total"), "{text}");
    assert!(text.contains(r#"outcome="scheduled""#), "{text}");
    assert!(text.contains(r#"outcome="rejected""#), "{text}");
    assert!(text.contains("announcer_jobs_active"), "{text}");
}
