//! Prompt templates for each step of the agent loop and for the tools.

/// How the model should shape a task list so the parser can read it.
pub const TASK_FORMAT_INSTRUCTIONS: &str = r#"The response should be a JSON array of strings. Example:

["Search the web for NBA news", "Write some code to build a web scraper"]

This should be parsable by JSON.parse()."#;

pub fn start_goal(goal: &str, language: &str) -> String {
    format!(
        "You are a task creation AI called AgentGPT. You answer in the \"{language}\" language. \
         You have the following objective \"{goal}\". Return a list of search queries that would \
         be required to answer the entirety of the objective. Limit the list to a maximum of 5 \
         queries. Ensure the queries are as succinct as possible. For simple questions use a \
         single query.\n\n{TASK_FORMAT_INSTRUCTIONS}"
    )
}

pub fn analyze_task(goal: &str, task: &str, language: &str) -> String {
    format!(
        "High level objective: \"{goal}\"\n\
         Current task: \"{task}\"\n\n\
         Based on this information, use the best function to make progress or accomplish the \
         task entirely. Select the correct function by being smart and efficient. Ensure \
         \"reasoning\" and only \"reasoning\" is in the {language} language.\n\n\
         Note you MUST select a function."
    )
}

/// Direct reasoning over a task; used by the default tool.
pub fn execute_task(goal: &str, task: &str, language: &str) -> String {
    format!(
        "Answer in the \"{language}\" language. Given the following overall objective \
         `{goal}` and the following sub-task, `{task}`.\n\n\
         Perform the task by understanding the problem, extracting variables, and being smart \
         and efficient. Write a detailed response that address the task. When confronted with \
         choices, make a decision yourself with reasoning."
    )
}

pub fn create_tasks(
    goal: &str,
    language: &str,
    tasks: &[String],
    last_task: &str,
    result: &str,
) -> String {
    format!(
        "You are an AI task creation agent. You must answer in the \"{language}\" language. \
         You have the following objective `{goal}`.\n\n\
         You have the following incomplete tasks:\n{tasks}\n\n\
         You just completed the following task:\n`{last_task}`\n\n\
         And received the following result:\n`{result}`.\n\n\
         Based on this, create a single new task to be completed by your AI system such that \
         your goal is closer reached. If there are no more tasks to be done, return nothing. \
         Do not add quotes to the task.",
        tasks = tasks.join("\n"),
    )
}

pub fn code(goal: &str, task: &str, language: &str) -> String {
    format!(
        "You are a world-class software engineer and an expert in all programing languages, \
         software systems, and architecture.\n\n\
         For reference, your high level goal is {goal}\n\n\
         Write code in English but explanations/comments in the \"{language}\" language.\n\n\
         Provide no information about who you are and focus on writing code. Ensure code is \
         bug and error free and explain complex concepts through comments. Respond in \
         well-formatted markdown. Ensure code blocks are used for code sections. Approach \
         problems step by step and file by file, for each section, use a heading to describe \
         the section.\n\n\
         Write code to accomplish the following:\n{task}"
    )
}

pub fn summarize(goal: &str, language: &str, text: &str) -> String {
    format!(
        "You must answer in the \"{language}\" language.\n\n\
         Combine the following text into a cohesive document:\n\n\
         \"{text}\"\n\n\
         Write using clear markdown formatting in a style expected of the goal \"{goal}\".\n\
         Be as clear, informative, and descriptive as necessary. You will not make up \
         information or add any information outside of the above text. Only use the given \
         information and nothing more.\n\n\
         If there is no information provided, say \"There is nothing to summarize\"."
    )
}

pub fn summarize_with_sources(goal: &str, language: &str, query: &str, snippets: &str) -> String {
    format!(
        "You must answer in the \"{language}\" language.\n\n\
         Parse and summarize the following text snippets \"{snippets}\".\n\
         Write using clear markdown formatting in a style expected of the goal \"{goal}\".\n\
         Be as clear, informative, and descriptive as necessary and attempt to answer the \
         query: \"{query}\" as best as possible.\n\
         If any of the snippets are not relevant to the query, ignore them, and do not include \
         them in the summary. Do not mention that you are ignoring them.\n\n\
         Cite sources for sentences via markdown links using the source link as the link and \
         the index as the text. Use in-line sources. Do not separately list sources at the \
         end of the writing.\n\n\
         Example: \"So this is a cited sentence at the end of a paragraph[1](https://test.com).\""
    )
}

/// Summary over snippets from the caller's own connected documents.
pub fn summarize_personal(goal: &str, language: &str, query: &str, snippets: &str) -> String {
    format!(
        "You must answer in the \"{language}\" language.\n\n\
         Parse and summarize the following text snippets \"{snippets}\".\n\
         Write using clear markdown formatting in a style expected of the goal \"{goal}\".\n\
         Be as clear, informative, and descriptive as necessary and attempt to answer the \
         query: \"{query}\" as best as possible.\n\
         If any of the snippets are not relevant to the query, ignore them, and do not include \
         them in the summary. Do not mention that you are ignoring them.\n\n\
         If there is no information provided, say \"There is nothing to summarize\"."
    )
}

pub fn chat(language: &str) -> String {
    format!(
        "You must answer in the \"{language}\" language.\n\n\
         You are a helpful AI Assistant that will provide responses based on the current \
         conversation history.\n\n\
         The human will provide previous messages as context. Use ONLY this information for \
         your responses. Do not make anything up and do not add any additional information.\n\
         If you have no information for a given question in the conversation history, say \
         \"I do not have any information on this\"."
    )
}
