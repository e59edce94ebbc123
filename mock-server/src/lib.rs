//! In-memory widget service used to exercise the REST facade over real HTTP.
//!
//! Besides widget CRUD it exposes a few diagnostic endpoints: `/headers`
//! echoes the request headers, `/echo` returns the posted JSON untouched,
//! `/slow/{delay_ms}` answers late and `/status/{code}` answers with an
//! arbitrary status.
//!
//! Server-side widgets carry a `revision` field that clients usually do not
//! model, which makes every widget response a payload with an unknown field.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Widget {
    pub widget_id: u64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub revision: u64,
}

#[derive(Deserialize)]
pub struct CreateWidget {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct PatchWidget {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct SearchWidgets {
    pub name_prefix: String,
}

#[derive(Deserialize)]
pub struct TagAll {
    pub tag: String,
}

pub struct Store {
    widgets: RwLock<BTreeMap<u64, Widget>>,
    next_id: AtomicU64,
}

pub type Db = Arc<Store>;

/// Router whose first created widget gets id 1.
pub fn app() -> Router {
    app_starting_at(1)
}

/// Router whose first created widget gets `first_id`.
pub fn app_starting_at(first_id: u64) -> Router {
    let db: Db = Arc::new(Store {
        widgets: RwLock::new(BTreeMap::new()),
        next_id: AtomicU64::new(first_id),
    });
    Router::new()
        .route(
            "/widgets",
            get(list_widgets)
                .post(create_widget)
                .put(replace_widgets)
                .patch(tag_all_widgets),
        )
        .route("/widgets/search", post(search_widgets))
        .route(
            "/widgets/{id}",
            get(get_widget)
                .put(update_widget)
                .patch(patch_widget)
                .delete(delete_widget),
        )
        .route("/headers", get(echo_headers))
        .route("/echo", post(echo_body).put(echo_body).patch(echo_body))
        .route("/slow/{delay_ms}", get(slow))
        .route("/status/{code}", get(status))
        .route("/not-json", get(not_json))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

async fn list_widgets(State(db): State<Db>) -> Json<Vec<Widget>> {
    let widgets = db.widgets.read().await;
    Json(widgets.values().cloned().collect())
}

async fn create_widget(
    State(db): State<Db>,
    Json(input): Json<CreateWidget>,
) -> (StatusCode, Json<Widget>) {
    let widget = Widget {
        widget_id: db.next_id.fetch_add(1, Ordering::SeqCst),
        name: input.name,
        tags: input.tags,
        revision: 1,
    };
    db.widgets
        .write()
        .await
        .insert(widget.widget_id, widget.clone());
    (StatusCode::CREATED, Json(widget))
}

async fn replace_widgets(
    State(db): State<Db>,
    Json(inputs): Json<Vec<CreateWidget>>,
) -> Json<Vec<Widget>> {
    let mut widgets = db.widgets.write().await;
    widgets.clear();
    for input in inputs {
        let widget = Widget {
            widget_id: db.next_id.fetch_add(1, Ordering::SeqCst),
            name: input.name,
            tags: input.tags,
            revision: 1,
        };
        widgets.insert(widget.widget_id, widget);
    }
    Json(widgets.values().cloned().collect())
}

async fn tag_all_widgets(State(db): State<Db>, Json(input): Json<TagAll>) -> Json<Vec<Widget>> {
    let mut widgets = db.widgets.write().await;
    for widget in widgets.values_mut() {
        widget.tags.push(input.tag.clone());
        widget.revision += 1;
    }
    Json(widgets.values().cloned().collect())
}

async fn search_widgets(
    State(db): State<Db>,
    Json(input): Json<SearchWidgets>,
) -> Json<Vec<Widget>> {
    let widgets = db.widgets.read().await;
    Json(
        widgets
            .values()
            .filter(|w| w.name.starts_with(&input.name_prefix))
            .cloned()
            .collect(),
    )
}

async fn get_widget(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<Widget>, StatusCode> {
    let widgets = db.widgets.read().await;
    widgets.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_widget(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<CreateWidget>,
) -> Result<Json<Widget>, StatusCode> {
    let mut widgets = db.widgets.write().await;
    let widget = widgets.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    widget.name = input.name;
    widget.tags = input.tags;
    widget.revision += 1;
    Ok(Json(widget.clone()))
}

async fn patch_widget(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<PatchWidget>,
) -> Result<Json<Widget>, StatusCode> {
    let mut widgets = db.widgets.write().await;
    let widget = widgets.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        widget.name = name;
    }
    if let Some(tags) = input.tags {
        widget.tags = tags;
    }
    widget.revision += 1;
    Ok(Json(widget.clone()))
}

async fn delete_widget(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Widget>, StatusCode> {
    let mut widgets = db.widgets.write().await;
    widgets.remove(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn echo_headers(headers: HeaderMap) -> Json<HashMap<String, String>> {
    Json(
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
    )
}

async fn echo_body(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn slow(Path(delay_ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    Json(serde_json::json!({ "delayed_ms": delay_ms }))
}

async fn status(Path(code): Path<u16>) -> (StatusCode, String) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {code}"))
}

async fn not_json() -> &'static str {
    "this is not json"
}
