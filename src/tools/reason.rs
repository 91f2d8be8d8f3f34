use super::{ToolContext, ToolError};
use crate::agents::prompts;
use crate::llm::{ChatMessage, TextStream};

/// Answer the task directly from the model's own knowledge.
pub(super) async fn call(ctx: &ToolContext, goal: &str, task: &str) -> Result<TextStream, ToolError> {
    let prompt = prompts::execute_task(goal, task, &ctx.language);
    let model = ctx.model.budgeted(&ctx.tokens, &[&prompt]);
    Ok(model.stream(vec![ChatMessage::user(prompt)]).await?)
}
