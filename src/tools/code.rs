use super::{ToolContext, ToolError};
use crate::agents::prompts;
use crate::llm::{ChatMessage, TextStream};

/// Write code for the task. The model's argument describes what to build;
/// the task text is used when it is blank.
pub(super) async fn call(
    ctx: &ToolContext,
    goal: &str,
    task: &str,
    arg: &str,
) -> Result<TextStream, ToolError> {
    let request = if arg.trim().is_empty() { task } else { arg };
    let prompt = prompts::code(goal, request, &ctx.language);
    let model = ctx.model.budgeted(&ctx.tokens, &[&prompt]);
    Ok(model.stream(vec![ChatMessage::user(prompt)]).await?)
}
