//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port (std listener handed
//! to a tokio runtime on a background thread), then drives `RestClient` from
//! plain test threads, the way blocking callers use it. Client-side models
//! are declared here independently of the server's types, and they leave out
//! the server's `revision` field on purpose.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rest_facade::{
    list_of, single, CalendarDate, ClientConfig, DateFormat, NamingConvention, RequestHeaders,
    RestClient, RestError, SerializationPolicy, UnknownFields,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Widget {
    widget_id: u64,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateWidget {
    name: String,
    tags: Vec<String>,
}

impl CreateWidget {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
        }
    }
}

/// Start a mock server whose first widget gets `first_id` and return its
/// base URL.
fn start_server(first_id: u64) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, mock_server::app_starting_at(first_id)).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn client_for(base_url: &str) -> RestClient {
    RestClient::builder()
        .base_url(base_url)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[test_log::test]
fn crud_lifecycle() {
    let client = client_for(&start_server(1));

    // Step 1: list, which starts empty.
    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert!(widgets.is_empty(), "expected empty list");

    // Step 2: create two widgets.
    let alpha = client
        .post("/widgets", &CreateWidget::named("alpha"), None, single::<Widget>())
        .unwrap();
    let beta = client
        .post("/widgets", &CreateWidget::named("beta"), None, single::<Widget>())
        .unwrap();
    assert_eq!((alpha.widget_id, beta.widget_id), (1, 2));

    // Step 3: get one by id.
    let fetched = client.get("/widgets/1", None, single::<Widget>()).unwrap();
    assert_eq!(fetched, alpha);

    // Step 4: replace with PUT.
    let replacement = CreateWidget {
        name: "alpha v2".to_string(),
        tags: vec!["x".to_string()],
    };
    let updated = client
        .put("/widgets/1", &replacement, None, single::<Widget>())
        .unwrap();
    assert_eq!(updated.name, "alpha v2");
    assert_eq!(updated.tags, vec!["x"]);

    // Step 5: partial update with PATCH.
    let patched = client
        .patch("/widgets/2", &json!({ "name": "beta v2" }), None, single::<Widget>())
        .unwrap();
    assert_eq!(patched.name, "beta v2");
    assert!(patched.tags.is_empty());

    // Step 6: collection variants of POST and PATCH.
    let found = client
        .post_list("/widgets/search", &json!({ "name_prefix": "alpha" }), None, list_of::<Widget>())
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].widget_id, 1);

    let tagged = client
        .patch_list("/widgets", &json!({ "tag": "bulk" }), None, list_of::<Widget>())
        .unwrap();
    assert_eq!(tagged.iter().map(|w| w.widget_id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(tagged.iter().all(|w| w.tags.contains(&"bulk".to_string())));

    // Step 7: delete, once decoding the removed widget and once discarding it.
    let removed = client
        .delete_for("/widgets/1", None, single::<Widget>())
        .unwrap();
    assert_eq!(removed.name, "alpha v2");
    client.delete("/widgets/2", None).unwrap();

    // Step 8: deleted widgets are gone.
    let err = client.get("/widgets/2", None, single::<Widget>()).unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    // Step 9: collection PUT replaces everything.
    let replaced = client
        .put_list(
            "/widgets",
            &[CreateWidget::named("gamma"), CreateWidget::named("delta")],
            None,
            list_of::<Widget>(),
        )
        .unwrap();
    assert_eq!(replaced.iter().map(|w| w.widget_id).collect::<Vec<_>>(), vec![3, 4]);

    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert_eq!(widgets, replaced);
}

#[test_log::test]
fn snake_case_tolerant_client_creates_widget_with_trace_header() {
    let base_url = start_server(7);
    let client = RestClient::with_naming(NamingConvention::SnakeCase, Duration::from_millis(2000))
        .unwrap();
    assert_eq!(client.policy().unknown_fields(), UnknownFields::Ignore);

    let headers = RequestHeaders::from_pairs([("X-Trace", "abc")]).unwrap();
    let widget = client
        .post(
            &format!("{base_url}/widgets"),
            &json!({ "name": "A" }),
            Some(&headers),
            single::<Widget>(),
        )
        .unwrap();
    assert_eq!(widget.widget_id, 7);
    assert_eq!(widget.name, "A");
}

#[test_log::test]
fn custom_headers_reach_the_server() {
    let client = client_for(&start_server(1));
    let headers = RequestHeaders::new()
        .with("X-Trace", "abc")
        .unwrap()
        .with("Authorization", "Bearer t0k3n")
        .unwrap();

    let seen = client
        .get("/headers", Some(&headers), single::<HashMap<String, String>>())
        .unwrap();
    assert_eq!(seen.get("x-trace").map(String::as_str), Some("abc"));
    assert_eq!(seen.get("authorization").map(String::as_str), Some("Bearer t0k3n"));
}

#[test_log::test]
fn empty_and_absent_headers_send_the_same_request() {
    let client = client_for(&start_server(1));
    let empty = RequestHeaders::new();

    let with_empty = client
        .get("/headers", Some(&empty), single::<HashMap<String, String>>())
        .unwrap();
    let with_none = client
        .get("/headers", None, single::<HashMap<String, String>>())
        .unwrap();
    assert_eq!(with_empty, with_none);
    assert!(!with_none.contains_key("x-trace"));
}

#[test_log::test]
fn slow_response_times_out_and_releases_the_caller() {
    let base_url = start_server(1);
    let client = RestClient::builder()
        .base_url(&base_url)
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let started = Instant::now();
    let err = client
        .get("/slow/2000", None, single::<serde_json::Value>())
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "{err:?}");
    assert!(elapsed >= Duration::from_millis(200), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "returned after {elapsed:?}");

    // The abandoned exchange does not poison the client.
    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert!(widgets.is_empty());
}

#[test_log::test]
fn non_success_status_is_reported_with_body() {
    let client = client_for(&start_server(1));

    let err = client.get("/widgets/99", None, single::<Widget>()).unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let err = client.get("/status/503", None, single::<Widget>()).unwrap_err();
    match err {
        RestError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "status 503");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test_log::test]
fn malformed_body_is_a_decode_error() {
    let client = client_for(&start_server(1));
    let err = client.get("/not-json", None, single::<Widget>()).unwrap_err();
    assert!(matches!(err, RestError::Decode { .. }), "{err:?}");
}

#[test_log::test]
fn strict_policy_rejects_unmodeled_server_fields() {
    let base_url = start_server(1);
    let policy = SerializationPolicy::builder()
        .unknown_fields(UnknownFields::Fail)
        .build()
        .unwrap();
    let client = RestClient::builder()
        .base_url(&base_url)
        .policy(policy)
        .build()
        .unwrap();

    let err = client
        .post("/widgets", &CreateWidget::named("strict"), None, single::<Widget>())
        .unwrap_err();
    assert!(err.to_string().contains("unknown field `revision`"), "{err}");
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Delivery {
    widget_id: u64,
    ship_date: CalendarDate,
    carrier_name: Option<String>,
}

#[test_log::test]
fn camel_case_policy_round_trips_through_echo() {
    let base_url = start_server(1);
    let policy = SerializationPolicy::builder()
        .naming(NamingConvention::CamelCase)
        .date_format(DateFormat::custom("%d/%m/%Y").unwrap())
        .build()
        .unwrap();
    let client = RestClient::builder()
        .base_url(&base_url)
        .policy(policy)
        .build()
        .unwrap();

    let delivery = Delivery {
        widget_id: 5,
        ship_date: CalendarDate::from_ymd(2024, 2, 29).unwrap(),
        carrier_name: None,
    };

    // What the server saw, decoded without any policy.
    let raw = client
        .put("/echo", &delivery, None, single::<serde_json::Value>())
        .unwrap();
    assert_eq!(
        raw,
        json!({ "widgetId": 5, "shipDate": "29/02/2024", "carrierName": null })
    );

    let echoed = client
        .post("/echo", &delivery, None, single::<Delivery>())
        .unwrap();
    assert_eq!(echoed, delivery);
}

#[test_log::test]
fn client_from_config_uses_base_url_and_naming() {
    let config = ClientConfig {
        base_url: Some(start_server(1)),
        naming: "snake_case".to_string(),
        timeout_ms: 2000,
        ..ClientConfig::default()
    };
    let client = RestClient::from_config(&config).unwrap();
    let created = client
        .post("widgets", &CreateWidget::named("configured"), None, single::<Widget>())
        .unwrap();
    assert_eq!(created.widget_id, 1);
}

#[test_log::test]
fn concurrent_calls_share_one_client() {
    let client = Arc::new(client_for(&start_server(1)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || {
                client
                    .post(
                        "/widgets",
                        &CreateWidget::named(&format!("w{i}")),
                        None,
                        single::<Widget>(),
                    )
                    .unwrap()
                    .widget_id
            })
        })
        .collect();
    let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids, (1..=8).collect::<HashSet<u64>>());

    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert_eq!(widgets.len(), 8);
}

#[test_log::test]
fn connection_refused_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = client_for(&format!("http://127.0.0.1:{port}"));
    let err = client.get("/widgets", None, single::<Widget>()).unwrap_err();
    assert!(matches!(err, RestError::Transport(_)), "{err:?}");
    assert!(!err.is_timeout());
}

#[test_log::test]
fn call_from_spawn_blocking_completes() {
    let client = Arc::new(client_for(&start_server(1)));
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    let widgets = rt
        .block_on(rt.spawn_blocking(move || {
            client.post("/widgets", &CreateWidget::named("gear"), None, single::<Widget>())?;
            client.get_list("/widgets", None, list_of::<Widget>())
        }))
        .unwrap()
        .unwrap();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].name, "gear");
}

#[test_log::test]
fn call_under_entered_runtime_handle_completes() {
    let client = client_for(&start_server(1));
    let other = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let _guard = other.enter();
    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert!(widgets.is_empty());
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn call_from_async_worker_completes() {
    let client = client_for(&start_server(1));
    let widgets = client.get_list("/widgets", None, list_of::<Widget>()).unwrap();
    assert!(widgets.is_empty());
    drop(client);
}
