//! HTTP route handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::error::ApiError;
use super::types::*;
use crate::accounts::AccountAccessor;
use crate::agents::types::{model_max_tokens, LlmModel, LoopStep, ModelSettings, UserBase};
use crate::agents::{create_agent_service, AgentService};
use crate::config::Config;
use crate::llm::TextStream;
use crate::store::RunStore;
use crate::tokenizer::TokenService;
use crate::tools::get_external_tools;

const SSE_KEEPALIVE: Duration = Duration::from_secs(15);

/// Shared application state.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RunStore>,
    pub accounts: Arc<dyn AccountAccessor>,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RunStore>,
        accounts: Arc<dyn AccountAccessor>,
        tokens: TokenService,
    ) -> Self {
        Self {
            config,
            store,
            accounts,
            tokens,
        }
    }

    /// Agent for one request, after checking the caller's settings.
    fn agent(
        &self,
        user: &UserBase,
        settings: &ModelSettings,
        streaming: bool,
    ) -> Result<Arc<dyn AgentService>, ApiError> {
        settings.validate()?;
        Ok(create_agent_service(
            Arc::clone(&self.config),
            settings,
            user,
            streaming,
            Arc::clone(&self.accounts),
            self.tokens.clone(),
        ))
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/models", get(models));

    let protected_routes = Router::new()
        .route("/api/agent/tools", get(tools))
        .route("/api/agent/start", post(start))
        .route("/api/agent/analyze", post(analyze))
        .route("/api/agent/execute", post(execute))
        .route("/api/agent/create", post(create))
        .route("/api/agent/summarize", post(summarize))
        .route("/api/agent/chat", post(chat))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}

/// Forward a text stream as server-sent events, one event per chunk.
///
/// A failure mid-stream is sent as an `error` event and ends the stream.
/// A client disconnect drops the stream, which aborts the backend request.
fn sse_response(stream: TextStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = async_stream::stream! {
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => yield Ok(Event::default().data(text)),
                Err(e) => {
                    tracing::error!("Stream failed: {}", e);
                    yield Ok(Event::default().event("error").data(e.to_string()));
                    break;
                }
            }
        }
    };
    Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEPALIVE).text("keepalive"))
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        mock_mode: state.config.mock_mode,
        persistent_store: state.store.is_persistent(),
        max_loops: state.config.max_loops,
    })
}

/// Supported models with their context sizes.
async fn models() -> Json<std::collections::HashMap<LlmModel, u32>> {
    Json(model_max_tokens())
}

/// Optional tools and whether the caller can use them.
async fn tools(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
) -> Json<ToolsResponse> {
    let mut tools = Vec::new();
    for tool in get_external_tools() {
        let available = tool.available(&state.config)
            && tool.dynamic_available(&user, state.accounts.as_ref()).await;
        tools.push(ToolInfo {
            name: tool.name().to_string(),
            description: tool.public_description().to_string(),
            image_url: tool.image_url().to_string(),
            available,
        });
    }
    Json(ToolsResponse { tools })
}

async fn start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentRunCreate>,
) -> Result<Json<NewTasksResponse>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, false)?;
    let run = state
        .store
        .create_run(&user, &req.goal, &req.model_settings)
        .await?;
    state
        .store
        .create_task(&user.id, run.run_id, LoopStep::Start)
        .await?;
    tracing::info!(run_id = %run.run_id, "Started run");

    let new_tasks = agent.start_goal(&req.goal).await?;
    Ok(Json(NewTasksResponse {
        run_id: run.run_id,
        new_tasks,
    }))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentTaskAnalyze>,
) -> Result<Json<crate::agents::types::Analysis>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, false)?;
    state
        .store
        .create_task(&user.id, req.run_id, LoopStep::Analyze)
        .await?;

    let analysis = agent
        .analyze_task(&req.goal, &req.task, &req.tool_names)
        .await?;
    Ok(Json(analysis))
}

async fn execute(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentTaskExecute>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, true)?;
    state
        .store
        .create_task(&user.id, req.run_id, LoopStep::Execute)
        .await?;

    let stream = agent
        .execute_task(&req.goal, &req.task, &req.analysis)
        .await?;
    Ok(sse_response(stream))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentTaskCreate>,
) -> Result<Json<NewTasksResponse>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, false)?;
    state
        .store
        .create_task(&user.id, req.run_id, LoopStep::Create)
        .await?;

    let new_tasks = agent
        .create_tasks(
            &req.goal,
            &req.tasks,
            &req.last_task,
            &req.result,
            &req.completed_tasks,
        )
        .await?;
    Ok(Json(NewTasksResponse {
        run_id: req.run_id,
        new_tasks,
    }))
}

async fn summarize(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentSummarize>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, true)?;
    state
        .store
        .create_task(&user.id, req.run_id, LoopStep::Summarize)
        .await?;

    let stream = agent.summarize_task(&req.goal, &req.results).await?;
    state.store.finish_run(&user.id, req.run_id).await?;
    Ok(sse_response(stream))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserBase>,
    Json(req): Json<AgentChat>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let agent = state.agent(&user, &req.model_settings, true)?;
    state
        .store
        .create_task(&user.id, req.run_id, LoopStep::Chat)
        .await?;

    let stream = agent.chat(&req.message, &req.results).await?;
    Ok(sse_response(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccounts;
    use crate::store::InMemoryRunStore;
    use serde_json::{json, Value};

    /// Serve a mock-mode app on a free port and return its base URL.
    async fn spawn_app(mut config: Config) -> (String, Arc<AppState>) {
        config.mock_mode = true;
        let max_loops = config.max_loops;
        let state = Arc::new(AppState::new(
            Arc::new(config),
            Arc::new(InMemoryRunStore::new(max_loops)),
            Arc::new(InMemoryAccounts::new()),
            TokenService::cl100k().unwrap(),
        ));
        let app = router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    fn config() -> Config {
        Config::new("sk", "https://api.openai.com/v1")
    }

    async fn start_run(client: &reqwest::Client, base: &str) -> String {
        let response: NewTasksResponse = client
            .post(format!("{}/api/agent/start", base))
            .json(&json!({"goal": "Plan a trip"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response.new_tasks.len(), 2);
        response.run_id.to_string()
    }

    #[tokio::test]
    async fn test_health_and_models() {
        let (base, _) = spawn_app(config()).await;
        let health: Value = reqwest::get(format!("{}/api/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["persistent_store"], false);

        let models: Value = reqwest::get(format!("{}/api/models", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(models["gpt-4"], 8000);
        assert_eq!(models["gpt-3.5-turbo-16k"], 16000);
    }

    #[tokio::test]
    async fn test_agent_loop_round_trip() {
        let (base, state) = spawn_app(config()).await;
        let client = reqwest::Client::new();
        let run_id = start_run(&client, &base).await;

        let analysis: Value = client
            .post(format!("{}/api/agent/analyze", base))
            .json(&json!({"runId": run_id, "goal": "Plan a trip", "task": "Book flights"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(analysis["action"], "reason");

        let body = client
            .post(format!("{}/api/agent/execute", base))
            .json(&json!({
                "runId": run_id,
                "goal": "Plan a trip",
                "task": "Book flights",
                "analysis": analysis,
            }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("data: "));
        assert!(body.contains("Book"));

        let created: NewTasksResponse = client
            .post(format!("{}/api/agent/create", base))
            .json(&json!({
                "runId": run_id,
                "goal": "Plan a trip",
                "tasks": [],
                "lastTask": "Book flights",
                "result": "Booked",
                "completedTasks": ["Book flights"],
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created.new_tasks.len(), 1);

        let response = client
            .post(format!("{}/api/agent/summarize", base))
            .json(&json!({"runId": run_id, "goal": "Plan a trip", "results": ["Booked"]}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let _ = response.text().await.unwrap();

        let run = state
            .store
            .get_run("dev-user", run_id.parse().unwrap())
            .await
            .unwrap();
        assert!(run.end_time.is_some());

        let second = client
            .post(format!("{}/api/agent/summarize", base))
            .json(&json!({"runId": run_id, "goal": "Plan a trip", "results": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), reqwest::StatusCode::CONFLICT);
        let error: ErrorResponse = second.json().await.unwrap();
        assert_eq!(error.code, "multiple_summary");
    }

    #[tokio::test]
    async fn test_loop_limit_is_rejected() {
        let mut config = config();
        config.max_loops = 1;
        let (base, _) = spawn_app(config).await;
        let client = reqwest::Client::new();
        let run_id = start_run(&client, &base).await;

        let chat = |client: reqwest::Client| {
            let url = format!("{}/api/agent/chat", base);
            let run_id = run_id.clone();
            async move {
                client
                    .post(url)
                    .json(&json!({"runId": run_id, "message": "hi", "results": []}))
                    .send()
                    .await
                    .unwrap()
            }
        };
        let first = chat(client.clone()).await;
        assert!(first.status().is_success());
        let _ = first.text().await.unwrap();

        let second = chat(client.clone()).await;
        assert_eq!(second.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
        let error: ErrorResponse = second.json().await.unwrap();
        assert_eq!(error.code, "max_loops");
    }

    #[tokio::test]
    async fn test_invalid_settings_and_unknown_run() {
        let (base, _) = spawn_app(config()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/agent/start", base))
            .json(&json!({"goal": "g", "modelSettings": {"temperature": 3.0}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        let response = client
            .post(format!("{}/api/agent/analyze", base))
            .json(&json!({
                "runId": uuid::Uuid::new_v4(),
                "goal": "g",
                "task": "t",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let mut config = config();
        config.dev_mode = false;
        config.jwt_secret = Some("s3cret".to_string());
        let (base, _) = spawn_app(config).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{}/api/agent/tools", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

        let token = auth::issue_jwt("s3cret", &UserBase::new("u1"), 1).unwrap();
        let tools: Value = client
            .get(format!("{}/api/agent/tools", base))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = tools["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["search", "wikipedia", "sid"]);
        assert_eq!(tools["tools"][1]["available"], true);
        assert_eq!(tools["tools"][0]["available"], false);
    }
}
