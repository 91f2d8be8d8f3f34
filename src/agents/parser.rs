//! Turns free-form model output into a clean task list.
//!
//! Two shapes are accepted: a single bracketed array of quoted strings, or a
//! newline-separated list whose lines may carry a `Task`/`Step` label, a
//! number, or a leading period. Candidates that only say "no tasks needed",
//! "task complete" or "do nothing" are dropped, as is anything already in the
//! completed set.

use std::sync::LazyLock;

use regex::Regex;

const ARRAY_PATTERN: &str = r#"^\[(?:\s*(?:"[^"\\]*(?:\\.[^"\\]*)*"|'[^'\\]*(?:\\.[^'\\]*)*')\s*,?)*\s*\]$"#;
const LITERAL_PATTERN: &str = r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#;
const PREFIX_PATTERN: &str =
    r"(?i)^(?:(?:Task|Step)(?:\s*\d+\b|\b)\s*[-:.]?\s*|\d+\b\s*[-:.]?\s*|\.+\s*)";
const NO_TASK_PATTERN: &str = r"(?i)^No( (new|further|additional|extra|other))? tasks? (is )?(required|needed|added|created|inputted).*$";
const TASK_COMPLETE_PATTERN: &str = r"(?i)^Task (complete|completed|finished|done|over|success).*$";
const DO_NOTHING_PATTERN: &str = r"(?i)^(\s*|Do nothing(\s.*)?)$";
const STATUS_ONLY_PATTERN: &str = r"(?i)^(complete|completed|finished|done|over|success)(\s+successfully)?[.!]*$";

struct Patterns {
    array: Regex,
    literal: Regex,
    prefix: Regex,
    exclusions: [Regex; 3],
    status_only: Regex,
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(|| {
    Ok(Patterns {
        array: Regex::new(ARRAY_PATTERN)?,
        literal: Regex::new(LITERAL_PATTERN)?,
        prefix: Regex::new(PREFIX_PATTERN)?,
        exclusions: [
            Regex::new(NO_TASK_PATTERN)?,
            Regex::new(TASK_COMPLETE_PATTERN)?,
            Regex::new(DO_NOTHING_PATTERN)?,
        ],
        status_only: Regex::new(STATUS_ONLY_PATTERN)?,
    })
});

/// Model output that could not be read as a task list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse tasks from completion '{text}': {cause}")]
pub struct ParseError {
    /// The raw completion.
    pub text: String,
    pub cause: String,
}

impl ParseError {
    fn new(text: &str, cause: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            cause: cause.into(),
        }
    }
}

/// Extract the tasks in `text` that are real work and not yet in `completed`.
///
/// Empty input yields an empty list. Order is preserved. Labels are stripped
/// before the exclusions are checked, and a label followed by nothing but a
/// status word ("Task complete", "Step 3: done") is dropped as well.
pub fn parse(text: &str, completed: &[String]) -> Result<Vec<String>, ParseError> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| ParseError::new(text, format!("invalid pattern: {}", e)))?;

    let candidates = extract_candidates(patterns, text)?;
    Ok(candidates
        .into_iter()
        .filter(|c| is_real_task(patterns, &c.task))
        .filter(|c| !(c.labelled && patterns.status_only.is_match(&c.task)))
        .map(|c| c.task)
        .filter(|task| !completed.contains(task))
        .collect())
}

/// Whether a single task string is real work rather than a "no tasks" or
/// "task complete" remark.
pub fn is_actionable(task: &str) -> bool {
    match PATTERNS.as_ref() {
        Ok(patterns) => is_real_task(patterns, task.trim()),
        Err(_) => !task.trim().is_empty(),
    }
}

/// A candidate task and whether a label was stripped from its line.
struct Candidate {
    task: String,
    labelled: bool,
}

fn extract_candidates(patterns: &Patterns, text: &str) -> Result<Vec<Candidate>, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if patterns.array.is_match(trimmed) {
        return decode_array(patterns, trimmed)
            .map(|items| {
                items
                    .into_iter()
                    .map(|task| Candidate {
                        task,
                        labelled: false,
                    })
                    .collect()
            })
            .map_err(|cause| ParseError::new(text, cause));
    }

    let lines: Vec<&str> = trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut any_labelled = false;
    let mut candidates = Vec::with_capacity(lines.len());
    for line in &lines {
        let (task, labelled) = strip_prefix(patterns, line);
        any_labelled |= labelled;
        candidates.push(Candidate { task, labelled });
    }

    match (any_labelled, candidates.len()) {
        (true, _) | (false, 1) => Ok(candidates),
        (false, n) => Err(ParseError::new(
            text,
            format!("none of the {} lines is a numbered or labelled task", n),
        )),
    }
}

/// Remove a leading label; reports whether a non-empty label was found.
fn strip_prefix(patterns: &Patterns, line: &str) -> (String, bool) {
    match patterns.prefix.find(line) {
        Some(m) if !m.is_empty() => (line[m.end()..].trim().to_string(), true),
        _ => (line.to_string(), false),
    }
}

fn is_real_task(patterns: &Patterns, candidate: &str) -> bool {
    !patterns.exclusions.iter().any(|re| re.is_match(candidate))
}

fn decode_array(patterns: &Patterns, literal: &str) -> Result<Vec<String>, String> {
    patterns
        .literal
        .captures_iter(literal)
        .map(|caps| {
            let body = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            unescape(body)
        })
        .collect()
}

/// Resolve backslash escapes inside a quoted literal.
///
/// Covers the single-character escapes, octal `\ooo`, `\xhh`, `\uhhhh` and
/// `\Uhhhhhhhh`. An unknown escape is kept as written, backslash included.
fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            return Err("dangling escape at end of string".to_string());
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' | '\'' | '"' => out.push(escape),
            '\n' => {}
            '0'..='7' => {
                let mut code = escape.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(decode_code_point(code, escape)?);
            }
            'x' | 'u' | 'U' => {
                let width = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.by_ref().take(width).collect();
                let code = Some(hex.as_str())
                    .filter(|h| h.len() == width)
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("truncated \\{}{} escape", escape, hex))?;
                out.push(decode_code_point(code, escape)?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn decode_code_point(code: u32, escape: char) -> Result<char, String> {
    char::from_u32(code).ok_or_else(|| format!("\\{} escape out of range: {:#x}", escape, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> Vec<String> {
        parse(text, &[]).unwrap()
    }

    #[test]
    fn test_empty_input_is_empty() {
        assert!(parse_one("").is_empty());
        assert!(parse_one("   \n  ").is_empty());
    }

    #[test]
    fn test_bracket_array() {
        assert_eq!(
            parse_one(r#"["Search the web for NBA news", "Write some code to build a web scraper"]"#),
            vec![
                "Search the web for NBA news",
                "Write some code to build a web scraper"
            ]
        );
        assert_eq!(
            parse_one(r#"['Task 1: keep my label', "say \"hi\"", 'it\'s']"#),
            vec!["Task 1: keep my label", "say \"hi\"", "it's"]
        );
        assert!(parse_one("[]").is_empty());
    }

    #[test]
    fn test_bracket_array_respects_completed() {
        let completed = vec!["b".to_string()];
        assert_eq!(
            parse(r#"["a", "b", "c"]"#, &completed).unwrap(),
            vec!["a", "c"]
        );
    }

    #[test]
    fn test_prefixes_are_stripped() {
        let cases = [
            ("Task: This is a sample task", "This is a sample task"),
            (
                "Task 1: Perform a comprehensive analysis of system performance.",
                "Perform a comprehensive analysis of system performance.",
            ),
            ("Task 2. Create a python script", "Create a python script"),
            ("5 - This is a sample task", "This is a sample task"),
            ("2: This is a sample task", "This is a sample task"),
            ("Step: This is a sample task", "This is a sample task"),
            ("Step 2:Create a python script", "Create a python script"),
            (
                ". Conduct research on the history of Nike",
                "Conduct research on the history of Nike",
            ),
            (".This is a sample task", "This is a sample task"),
            (
                "1. Research the history and background of Nike company.",
                "Research the history and background of Nike company.",
            ),
            ("task 3: lower case label", "lower case label"),
            ("Step 2. Create a python script", "Create a python script"),
            ("Task 1 - Create a python script", "Create a python script"),
            ("Step 1 - Create a python script", "Create a python script"),
            ("Step 4 : Deploy, then verify", "Deploy, then verify"),
            ("Task1: Compact label", "Compact label"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_one(input), vec![expected], "input: {}", input);
        }
    }

    #[test]
    fn test_words_starting_with_a_label_are_kept() {
        assert_eq!(
            parse_one("Steps to reproduce the login bug"),
            vec!["Steps to reproduce the login bug"]
        );
        assert_eq!(
            parse_one("1. Research Nike\nTasks left for tomorrow"),
            vec!["Research Nike", "Tasks left for tomorrow"]
        );
        assert_eq!(parse_one("3D print a prototype"), vec!["3D print a prototype"]);
        assert!(parse("Steps we could take\nTasks for later", &[]).is_err());
    }

    #[test]
    fn test_single_unlabelled_line_is_a_task() {
        assert_eq!(
            parse_one("This is a sample task without a prefix"),
            vec!["This is a sample task without a prefix"]
        );
    }

    #[test]
    fn test_numbered_list() {
        let text = "Here is the plan:\n1. Research Nike\n\n2. Summarize findings: sales, brand\n";
        assert_eq!(
            parse_one(text),
            vec!["Here is the plan:", "Research Nike", "Summarize findings: sales, brand"]
        );
    }

    #[test]
    fn test_unlabelled_multiline_fails() {
        let text = "I think we should\nconsider some things";
        let err = parse(text, &[]).unwrap_err();
        assert_eq!(err.text, text);
        assert!(err.to_string().contains(text));
    }

    #[test]
    fn test_exclusions() {
        for text in [
            "No new tasks required",
            "no further tasks needed",
            "No tasks added.",
            "Task complete",
            "Task completed successfully",
            "Do nothing",
            "do nothing at all",
        ] {
            assert!(parse_one(text).is_empty(), "should drop: {}", text);
        }
        assert_eq!(
            parse_one("1. Research Nike\n2. Task complete\n3. Task done"),
            vec!["Research Nike"]
        );
        assert_eq!(parse_one("Do nothing but research"), Vec::<String>::new());
        assert!(parse_one("Step 3: done").is_empty());
        assert!(parse_one("Step: Task complete").is_empty());
        assert_eq!(parse_one("Do research"), vec!["Do research"]);
    }

    #[test]
    fn test_exclusions_apply_after_stripping() {
        assert_eq!(
            parse_one("Task completed research report"),
            vec!["completed research report"]
        );
        assert_eq!(
            parse_one("1. Task done\nTask finished goods inventory audit"),
            vec!["finished goods inventory audit"]
        );
    }

    #[test]
    fn test_is_actionable() {
        assert!(is_actionable("Research Nike"));
        assert!(!is_actionable("No further tasks needed."));
        assert!(!is_actionable("   "));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = "1. Research Nike\n2. Write a report\n3. Publish it";
        let first = parse(text, &[]).unwrap();
        assert_eq!(parse(text, &[]).unwrap(), first);
        assert!(parse(text, &first).unwrap().is_empty());

        let array = r#"["a", "b"]"#;
        let first = parse(array, &[]).unwrap();
        assert!(parse(array, &first).unwrap().is_empty());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb\u00e9\q").unwrap(), "a\nbé\\q");
        assert!(unescape(r"bad\u12").is_err());
    }

    #[test]
    fn test_unescape_numeric_escapes() {
        assert_eq!(unescape(r"caf\xe9").unwrap(), "café");
        assert_eq!(unescape(r"\U0001F600!").unwrap(), "\u{1F600}!");
        assert_eq!(unescape(r"\101\0").unwrap(), "A\0");
        assert_eq!(unescape(r"\1019").unwrap(), "A9");
        assert!(unescape(r"\x4").is_err());
        assert!(unescape(r"\UFFFFFFFF").is_err());
        assert_eq!(
            parse_one(r#"["Visit caf\xe9 Nike", "tab\there"]"#),
            vec!["Visit café Nike", "tab\there"]
        );
    }
}
