//! The agent loop steps, backed by the remote model service.
//!
//! One service instance serves one caller request. The caller drives the loop
//! explicitly (start, analyze, execute, create, summarize, chat) and passes
//! the outputs of one step into the next, so nothing is kept between calls
//! except the rate limiter.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AgentError;
use super::model_factory::ChatModel;
use super::parser;
use super::prompts;
use super::rate_limit::RateLimiter;
use super::types::{Analysis, AnalysisArguments, LlmModel, ModelSettings, UserBase};
use crate::accounts::AccountAccessor;
use crate::config::Config;
use crate::llm::{ChatMessage, FunctionCall, FunctionDefinition, TextStream};
use crate::tokenizer::TokenService;
use crate::tools::{get_tool_from_name, get_user_tools, summarize::summarize, Tool, ToolContext};

/// Completion budget for summaries on the large-context model.
const SUMMARY_MAX_TOKENS: u32 = 8000;

/// Result text kept for a summary, leaving room for the prompt around it.
const SUMMARY_TEXT_TOKENS: usize = 7000;

/// Model used where prior results are fed back in.
const LARGE_CONTEXT_MODEL: LlmModel = LlmModel::Gpt35Turbo16k;

/// The six steps of the agent loop.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Break a goal into an initial ordered task list.
    async fn start_goal(&self, goal: &str) -> Result<Vec<String>, AgentError>;

    /// Choose a tool for `task` among `tool_names` plus the defaults.
    async fn analyze_task(
        &self,
        goal: &str,
        task: &str,
        tool_names: &[String],
    ) -> Result<Analysis, AgentError>;

    async fn execute_task(
        &self,
        goal: &str,
        task: &str,
        analysis: &Analysis,
    ) -> Result<TextStream, AgentError>;

    /// At most one follow-up task, never one already pending or completed.
    async fn create_tasks(
        &self,
        goal: &str,
        tasks: &[String],
        last_task: &str,
        result: &str,
        completed_tasks: &[String],
    ) -> Result<Vec<String>, AgentError>;

    async fn summarize_task(&self, goal: &str, results: &[String])
        -> Result<TextStream, AgentError>;

    /// Answer a free-form message using prior results as the only context.
    async fn chat(&self, message: &str, results: &[String]) -> Result<TextStream, AgentError>;
}

pub struct OpenAiAgentService {
    model: ChatModel,
    settings: ModelSettings,
    tokens: TokenService,
    user: UserBase,
    accounts: Arc<dyn AccountAccessor>,
    config: Arc<Config>,
    rate_limiter: RateLimiter,
}

impl OpenAiAgentService {
    pub fn new(
        model: ChatModel,
        settings: ModelSettings,
        tokens: TokenService,
        user: UserBase,
        accounts: Arc<dyn AccountAccessor>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            model,
            settings,
            tokens,
            user,
            accounts,
            config,
            rate_limiter: RateLimiter::default(),
        }
    }

    fn language(&self) -> &str {
        &self.settings.language
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext::new(
            self.model.clone(),
            self.tokens.clone(),
            self.language(),
            self.user.clone(),
            self.accounts.clone(),
            self.config.clone(),
        )
    }
}

#[async_trait]
impl AgentService for OpenAiAgentService {
    async fn start_goal(&self, goal: &str) -> Result<Vec<String>, AgentError> {
        let prompt = prompts::start_goal(goal, self.language());
        let model = self.model.budgeted(&self.tokens, &[&prompt]);

        self.rate_limiter.acquire().await;
        let response = model.complete(vec![ChatMessage::system(prompt)], None).await?;
        let completion = response.content.unwrap_or_default();

        let tasks = parser::parse(&completion, &[])?;
        tracing::info!("Created {} initial tasks for goal", tasks.len());
        Ok(tasks)
    }

    async fn analyze_task(
        &self,
        goal: &str,
        task: &str,
        tool_names: &[String],
    ) -> Result<Analysis, AgentError> {
        let tools = get_user_tools(tool_names, &self.user, self.accounts.as_ref(), &self.config).await;
        let functions: Vec<FunctionDefinition> =
            tools.iter().map(Tool::function_definition).collect();
        let functions_json = serde_json::to_string(&functions).unwrap_or_default();

        let prompt = prompts::analyze_task(goal, task, self.language());
        let model = self
            .model
            .budgeted(&self.tokens, &[&prompt, &functions_json]);

        self.rate_limiter.acquire().await;
        let response = model
            .complete(vec![ChatMessage::user(prompt)], Some(functions))
            .await?;
        Ok(read_analysis(task, &tools, response.function_call))
    }

    async fn execute_task(
        &self,
        goal: &str,
        task: &str,
        analysis: &Analysis,
    ) -> Result<TextStream, AgentError> {
        let tool = get_tool_from_name(&analysis.action);
        self.rate_limiter.acquire().await;
        Ok(tool
            .call(&self.tool_context(), goal, task, &analysis.arg)
            .await?)
    }

    async fn create_tasks(
        &self,
        goal: &str,
        tasks: &[String],
        last_task: &str,
        result: &str,
        completed_tasks: &[String],
    ) -> Result<Vec<String>, AgentError> {
        let prompt = prompts::create_tasks(goal, self.language(), tasks, last_task, result);
        let model = self.model.budgeted(&self.tokens, &[&prompt]);

        self.rate_limiter.acquire().await;
        let response = model.complete(vec![ChatMessage::system(prompt)], None).await?;
        let completion = response.content.unwrap_or_default();
        Ok(new_task(&completion, tasks, completed_tasks))
    }

    async fn summarize_task(
        &self,
        goal: &str,
        results: &[String],
    ) -> Result<TextStream, AgentError> {
        let mut model = self.model.clone().with_model(LARGE_CONTEXT_MODEL);
        model.max_tokens = SUMMARY_MAX_TOKENS;

        let text = self
            .tokens
            .truncate(&results.join("\n\n"), SUMMARY_TEXT_TOKENS)?;
        tracing::info!(
            "Summarizing {} results ({} chars after truncation)",
            results.len(),
            text.len()
        );

        self.rate_limiter.acquire().await;
        Ok(summarize(&model, &self.tokens, self.language(), goal, &text).await?)
    }

    async fn chat(&self, message: &str, results: &[String]) -> Result<TextStream, AgentError> {
        let mut messages = Vec::with_capacity(results.len() + 2);
        messages.push(ChatMessage::system(prompts::chat(self.language())));
        messages.extend(results.iter().map(|r| ChatMessage::user(r.as_str())));
        messages.push(ChatMessage::user(message));

        let parts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        let model = self
            .model
            .clone()
            .with_model(LARGE_CONTEXT_MODEL)
            .budgeted(&self.tokens, &parts);

        self.rate_limiter.acquire().await;
        Ok(model.stream(messages).await?)
    }
}

/// Read the model's function call, falling back to the default analysis when
/// there is none, it names a tool that was not offered, or its arguments do
/// not validate.
fn read_analysis(task: &str, offered: &[Tool], call: Option<FunctionCall>) -> Analysis {
    let Some(call) = call else {
        tracing::warn!("Model did not pick a function, using default analysis");
        return Analysis::default_for(task);
    };
    if !offered.iter().any(|tool| tool.name() == call.name) {
        tracing::warn!("Model picked unknown function '{}'", call.name);
        return Analysis::default_for(task);
    }
    match serde_json::from_str::<AnalysisArguments>(&call.arguments) {
        Ok(arguments) => Analysis::new(call.name, arguments),
        Err(e) => {
            tracing::warn!("Invalid arguments for '{}': {}", call.name, e);
            Analysis::default_for(task)
        }
    }
}

/// The completion as a single new task, unless it is blank, says there is
/// nothing left to do, or repeats a pending or completed task.
fn new_task(completion: &str, tasks: &[String], completed_tasks: &[String]) -> Vec<String> {
    let task = completion.trim();
    if task.is_empty() || !parser::is_actionable(task) {
        return Vec::new();
    }
    if tasks.iter().chain(completed_tasks).any(|t| t.trim() == task) {
        tracing::debug!("Dropping duplicate task: {}", task);
        return Vec::new();
    }
    vec![task.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccounts;
    use crate::agents::model_factory::create_model_with_client;
    use crate::llm::testing::ScriptedClient;
    use crate::llm::{collect_stream, LlmError, Role};

    fn service(client: Arc<ScriptedClient>, settings: ModelSettings) -> OpenAiAgentService {
        let user = UserBase::new("u1").with_email("u1@example.com");
        let model = create_model_with_client(client, &settings, &user, false, None);
        OpenAiAgentService::new(
            model,
            settings,
            TokenService::cl100k().unwrap(),
            user,
            Arc::new(InMemoryAccounts::new()),
            Arc::new(Config::new("sk", "https://api.openai.com/v1")),
        )
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_goal_parses_task_list() {
        let client = Arc::new(ScriptedClient::new(""));
        client.push_text(r#"["Research Nike", "Summarize Nike's history"]"#);
        let agent = service(client.clone(), ModelSettings::default());

        let tasks = agent.start_goal("Learn about Nike").await.unwrap();
        assert_eq!(tasks, strings(&["Research Nike", "Summarize Nike's history"]));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[0].content.contains("Learn about Nike"));
        assert!(requests[0].max_tokens >= 1 && requests[0].max_tokens < 4000);
    }

    #[tokio::test]
    async fn test_start_goal_surfaces_parse_failure() {
        let client = Arc::new(ScriptedClient::new(""));
        client.push_text("first idea\nsecond idea");
        let agent = service(client, ModelSettings::default());

        let result = agent.start_goal("goal").await;
        assert!(matches!(result, Err(AgentError::Parse(_))));
    }

    #[tokio::test]
    async fn test_analyze_reads_function_call() {
        let client = Arc::new(ScriptedClient::new(""));
        client.push_function_call(
            "code",
            r#"{"reasoning": "Needs a script", "arg": "Write a scraper"}"#,
        );
        let agent = service(client.clone(), ModelSettings::default());

        let analysis = agent
            .analyze_task("goal", "Build a scraper", &strings(&["search"]))
            .await
            .unwrap();
        assert_eq!(analysis.action, "code");
        assert_eq!(analysis.arg, "Write a scraper");

        // Search has no key configured, so only the defaults are offered.
        let offered: Vec<String> = client.requests()[0]
            .functions
            .clone()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(offered, strings(&["reason", "code"]));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_default() {
        let client = Arc::new(ScriptedClient::new("no function here"));
        client.push_function_call("code", "not json");
        client.push_function_call("search", r#"{"reasoning": "r", "arg": "a"}"#);
        let agent = service(client, ModelSettings::default());

        for _ in 0..3 {
            let analysis = agent.analyze_task("goal", "Some task", &[]).await.unwrap();
            assert_eq!(analysis, Analysis::default_for("Some task"));
        }
    }

    #[tokio::test]
    async fn test_analyze_surfaces_backend_failure() {
        let client = Arc::new(ScriptedClient::new(""));
        client.push(Err(LlmError::client_error(401, "bad key".to_string())));
        let agent = service(client, ModelSettings::default());

        let result = agent.analyze_task("goal", "task", &[]).await;
        assert!(matches!(result, Err(AgentError::Backend(_))));
    }

    #[tokio::test]
    async fn test_execute_runs_chosen_tool() {
        let client = Arc::new(ScriptedClient::new("Nike was founded in 1964."));
        let agent = service(client.clone(), ModelSettings::default());
        let analysis = Analysis::default_for("When was Nike founded?");

        let stream = agent
            .execute_task("Learn about Nike", "When was Nike founded?", &analysis)
            .await
            .unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), "Nike was founded in 1964.");
        assert!(client.requests()[0].messages[0]
            .content
            .contains("When was Nike founded?"));
    }

    #[tokio::test]
    async fn test_create_tasks_drops_duplicates() {
        let client = Arc::new(ScriptedClient::new(""));
        client.push_text("  Research Adidas  ");
        client.push_text("Research Nike");
        client.push_text("Compare prices");
        client.push_text("Task complete");
        let agent = service(client, ModelSettings::default());

        let pending = strings(&["Compare prices"]);
        let completed = strings(&["Research Nike"]);
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(
                agent
                    .create_tasks("goal", &pending, "Research Nike", "done", &completed)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(outcomes[0], strings(&["Research Adidas"]));
        assert!(outcomes[1].is_empty());
        assert!(outcomes[2].is_empty());
        assert!(outcomes[3].is_empty());
    }

    #[tokio::test]
    async fn test_summarize_uses_large_context_model() {
        let client = Arc::new(ScriptedClient::new("summary"));
        let agent = service(client.clone(), ModelSettings::default());

        let stream = agent
            .summarize_task("goal", &strings(&["first result", "second result"]))
            .await
            .unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), "summary");

        let request = &client.requests()[0];
        assert_eq!(request.model, "gpt-3.5-turbo-16k");
        assert!(request.max_tokens <= SUMMARY_MAX_TOKENS);
        assert!(request.messages[0]
            .content
            .contains("first result\n\nsecond result"));
    }

    #[tokio::test]
    async fn test_chat_seeds_prior_results() {
        let client = Arc::new(ScriptedClient::new("answer"));
        let agent = service(client.clone(), ModelSettings::default().with_language("German"));

        let stream = agent
            .chat("What did you find?", &strings(&["result one", "result two"]))
            .await
            .unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), "answer");

        let request = &client.requests()[0];
        assert_eq!(request.model, "gpt-3.5-turbo-16k");
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert!(contents[0].contains("German"));
        assert_eq!(&contents[1..], &["result one", "result two", "What did you find?"]);
    }

    #[test]
    fn test_new_task_rules() {
        assert!(new_task("", &[], &[]).is_empty());
        assert!(new_task("   \n", &[], &[]).is_empty());
        assert_eq!(new_task("Write the report\n", &[], &[]), strings(&["Write the report"]));
        assert!(new_task("Write the report", &strings(&["Write the report"]), &[]).is_empty());
    }
}
