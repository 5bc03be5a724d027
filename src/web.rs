use crate::{
    errors::AppError,
    recommend::{RecommendationResult, RecommendationService},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

const GENERIC_FAILURE: &str =
    "Something went wrong while generating your recommendation. Please try again.";

#[derive(Clone)]
struct SharedState {
    service: Arc<RecommendationService>,
    listings: usize,
}

pub fn router(service: Arc<RecommendationService>, listings: usize) -> Router {
    let shared_state = Arc::new(SharedState { service, listings });

    Router::new()
        .route("/", get(form_page).post(form_submit))
        .route("/api/recommend", post(recommend))
        .route("/api/health", get(health))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(
    service: Arc<RecommendationService>,
    listings: usize,
    addr: &str,
) -> anyhow::Result<()> {
    let app = router(service, listings);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Serve until Ctrl+C / SIGTERM.
///
/// The caller keeps its own handle on `service` so the blocking HTTP clients
/// inside it are dropped outside the runtime.
pub fn start_daemon(
    service: Arc<RecommendationService>,
    listings: usize,
    addr: &str,
) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(service, listings, addr))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        log::error!("{:?}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": GENERIC_FAILURE})),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecommendRequest {
    /// Free-text buyer preference; may be empty
    #[serde(default)]
    pub preference: String,
}

/// Run the blocking pipeline on this worker without stalling the runtime.
fn run_recommendation(
    service: Arc<RecommendationService>,
    preference: String,
) -> Result<RecommendationResult, AppError> {
    tokio::task::block_in_place(move || service.recommend(&preference))
}

async fn recommend(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendationResult>, HttpError> {
    log::debug!("payload: {payload:?}");

    let result = run_recommendation(state.service.clone(), payload.preference)?;
    Ok(Json(result))
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "listings": state.listings}))
}

async fn form_page() -> Html<String> {
    Html(render_page(&PageState::default()))
}

async fn form_submit(
    State(state): State<Arc<SharedState>>,
    Form(payload): Form<RecommendRequest>,
) -> (StatusCode, Html<String>) {
    log::debug!("form payload: {payload:?}");

    let preference = payload.preference.clone();
    match run_recommendation(state.service.clone(), payload.preference) {
        Ok(result) => (
            StatusCode::OK,
            Html(render_page(&PageState {
                preference,
                listing: result.listing,
                description: result.description,
                error: None,
            })),
        ),
        Err(err) => {
            log::error!("{err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_page(&PageState {
                    preference,
                    error: Some(GENERIC_FAILURE.to_string()),
                    ..Default::default()
                })),
            )
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    preference: String,
    listing: String,
    description: String,
    error: Option<String>,
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Real Estate Recommendation</title>
<style>
body { font-family: sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; }
label { display: block; font-weight: bold; margin-top: 1rem; }
textarea { width: 100%; box-sizing: border-box; }
.error { color: #b00020; }
</style>
</head>
<body>
<h1>Real Estate Recommendation</h1>
<p>Enter your buyer preference to find the closest matching listing and receive a personalized description.</p>
{{error}}<form method="post" action="/">
<label for="preference">Buyer Preference</label>
<textarea id="preference" name="preference" rows="5" placeholder="Enter your buyer preference...">{{preference}}</textarea>
<button type="submit">Submit</button>
</form>
<label for="listing">Closest Match Listing</label>
<textarea id="listing" rows="8" readonly>{{listing}}</textarea>
<label for="description">Personalized Description</label>
<textarea id="description" rows="10" readonly>{{description}}</textarea>
</body>
</html>
"#;

fn render_page(state: &PageState) -> String {
    let error = state
        .error
        .as_deref()
        .map(|e| format!("<p class=\"error\">{}</p>\n", escape_html(e)))
        .unwrap_or_default();

    PAGE_TEMPLATE
        .replace("{{error}}", &error)
        .replace("{{preference}}", &escape_html(&state.preference))
        .replace("{{listing}}", &escape_html(&state.listing))
        .replace("{{description}}", &escape_html(&state.description))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            // keeps user text from forming template placeholders
            '{' => out.push_str("&#123;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom & Jerry's"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&#39;s&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_render_empty_page() {
        let page = render_page(&PageState::default());
        assert!(page.contains("<title>Real Estate Recommendation</title>"));
        assert!(page.contains("name=\"preference\""));
        assert!(page.contains("Closest Match Listing"));
        assert!(page.contains("Personalized Description"));
        assert!(!page.contains("{{"));
        assert!(!page.contains("class=\"error\""));
    }

    #[test]
    fn test_render_escapes_user_text() {
        let page = render_page(&PageState {
            preference: "<script>alert(1)</script>".to_string(),
            ..Default::default()
        });
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_render_error_notice() {
        let page = render_page(&PageState {
            error: Some(GENERIC_FAILURE.to_string()),
            ..Default::default()
        });
        assert!(page.contains("class=\"error\""));
    }
}
