//! Token accounting for model requests.
//!
//! # Invariants
//! - `detokenize(tokenize(text)) == text` for any UTF-8 text
//! - After `calculate_max_tokens`, `1 <= max_tokens <= context_size - prompt_tokens`
//!   whenever the prompt fits; when it does not fit the budget is exactly 1.

use std::sync::{Arc, OnceLock};

use tiktoken_rs::CoreBPE;

/// A single BPE token id.
pub type TokenId = tiktoken_rs::Rank;

/// Anything that carries a model context size and a mutable completion budget.
pub trait ModelDescriptor {
    /// Declared context window of the model (prompt + completion).
    fn context_size(&self) -> u32;

    /// Current completion budget.
    fn max_tokens(&self) -> u32;

    fn set_max_tokens(&mut self, max_tokens: u32);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenizerError {
    #[error("Failed to load tokenizer: {0}")]
    Load(String),

    #[error("Failed to decode {count} tokens: {message}")]
    Decode { count: usize, message: String },
}

static CL100K: OnceLock<Result<Arc<CoreBPE>, String>> = OnceLock::new();

/// Counts, encodes and decodes tokens, and sizes completion budgets.
#[derive(Clone)]
pub struct TokenService {
    encoding: Arc<CoreBPE>,
}

impl TokenService {
    pub fn new(encoding: Arc<CoreBPE>) -> Self {
        Self { encoding }
    }

    /// Service backed by the `cl100k_base` encoding used by the GPT-3.5/4 family.
    ///
    /// The encoding is loaded once per process and shared.
    pub fn cl100k() -> Result<Self, TokenizerError> {
        let loaded = CL100K.get_or_init(|| {
            tiktoken_rs::cl100k_base()
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });
        match loaded {
            Ok(encoding) => Ok(Self::new(Arc::clone(encoding))),
            Err(message) => Err(TokenizerError::Load(message.clone())),
        }
    }

    /// Encode text. Special-token markers in the text are treated as plain text.
    pub fn tokenize(&self, text: &str) -> Vec<TokenId> {
        self.encoding.encode_ordinary(text)
    }

    pub fn detokenize(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        self.encoding
            .decode(tokens.to_vec())
            .map_err(|e| TokenizerError::Decode {
                count: tokens.len(),
                message: e.to_string(),
            })
    }

    pub fn count(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }

    /// Shrink `model`'s completion budget so prompt + completion fit its context.
    ///
    /// The parts are counted as one concatenated prompt; the budget becomes
    /// `max(1, min(max_tokens, context_size - prompt_tokens))` and is written
    /// back onto the model. Returns the new budget.
    pub fn calculate_max_tokens<M>(&self, model: &mut M, prompt_parts: &[&str]) -> u32
    where
        M: ModelDescriptor + ?Sized,
    {
        let prompt_tokens = self.count(&prompt_parts.concat());
        let available = i64::from(model.context_size()) - prompt_tokens as i64;
        let budget = i64::from(model.max_tokens()).min(available).max(1);
        // budget is within [1, max_tokens] so it fits in u32
        let budget = budget as u32;

        tracing::debug!(
            prompt_tokens,
            context_size = model.context_size(),
            budget,
            "Calculated completion budget"
        );
        model.set_max_tokens(budget);
        budget
    }

    /// Longest prefix of `text` that is at most `max_tokens` tokens and decodes cleanly.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> Result<String, TokenizerError> {
        let tokens = self.tokenize(text);
        if tokens.len() <= max_tokens {
            return Ok(text.to_string());
        }

        // A multi-byte character can be split over up to four byte-level tokens.
        let mut last_error = None;
        for end in (max_tokens.saturating_sub(3)..=max_tokens).rev() {
            match self.detokenize(&tokens[..end]) {
                Ok(prefix) => return Ok(prefix),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(TokenizerError::Decode {
            count: max_tokens,
            message: "no decodable prefix".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeModel {
        context: u32,
        max_tokens: u32,
    }

    impl ModelDescriptor for FakeModel {
        fn context_size(&self) -> u32 {
            self.context
        }

        fn max_tokens(&self) -> u32 {
            self.max_tokens
        }

        fn set_max_tokens(&mut self, max_tokens: u32) {
            self.max_tokens = max_tokens;
        }
    }

    fn service() -> TokenService {
        TokenService::cl100k().unwrap()
    }

    fn long_text() -> String {
        "This is some long text. This is some long text. This is some long text.\n".repeat(30)
    }

    #[test]
    fn test_round_trip() {
        let service = service();
        for text in [
            "Hello world!",
            "",
            "naïve café – 日本語のテキスト 🚀",
            "<|endoftext|> is just text here",
        ] {
            let tokens = service.tokenize(text);
            assert_eq!(tokens.len(), service.count(text));
            assert_eq!(service.detokenize(&tokens).unwrap(), text);
        }
        assert_eq!(service.count(""), 0);
    }

    #[test]
    fn test_small_request_is_kept() {
        let service = service();
        let mut model = FakeModel {
            context: 4000,
            max_tokens: 3000,
        };
        service.calculate_max_tokens(&mut model, &["Hello"]);
        assert_eq!(model.max_tokens, 3000);
    }

    #[test]
    fn test_large_request_is_clamped_to_remaining_context() {
        let service = service();
        let text = long_text();
        let prompt_tokens = service.count(&text) as u32;
        assert!(prompt_tokens < 4000);

        let mut model = FakeModel {
            context: 4000,
            max_tokens: 8000,
        };
        let budget = service.calculate_max_tokens(&mut model, &[&text]);
        assert_eq!(budget, 4000 - prompt_tokens);
        assert_eq!(model.max_tokens, 4000 - prompt_tokens);
    }

    #[test]
    fn test_budget_boundary_for_8k_context() {
        let service = service();
        let text = long_text();
        let prompt_tokens = service.count(&text) as u32;
        let remaining = 8000 - prompt_tokens;

        let mut at_limit = FakeModel {
            context: 8000,
            max_tokens: remaining,
        };
        service.calculate_max_tokens(&mut at_limit, &[&text]);
        assert_eq!(at_limit.max_tokens, remaining);

        let mut over_limit = FakeModel {
            context: 8000,
            max_tokens: remaining + 1,
        };
        service.calculate_max_tokens(&mut over_limit, &[&text]);
        assert_eq!(over_limit.max_tokens, remaining);
    }

    #[test]
    fn test_parts_are_counted_as_one_prompt() {
        let service = service();
        let (head, tail) = ("You are an agent named Auto", "GPT. Goal: research");
        let joined = service.count(&format!("{head}{tail}")) as u32;

        let mut model = FakeModel {
            context: 4000,
            max_tokens: 4000,
        };
        service.calculate_max_tokens(&mut model, &[head, tail]);
        assert_eq!(model.max_tokens, 4000 - joined);
    }

    #[test]
    fn test_oversized_prompt_yields_one() {
        let service = service();
        let text = long_text().repeat(100);
        let mut model = FakeModel {
            context: 4000,
            max_tokens: 8000,
        };
        assert_eq!(service.calculate_max_tokens(&mut model, &[&text]), 1);
        assert_eq!(model.max_tokens, 1);
    }

    #[test]
    fn test_truncate() {
        let service = service();
        let text = long_text();
        let truncated = service.truncate(&text, 50).unwrap();
        assert!(service.count(&truncated) <= 50);
        assert!(text.starts_with(&truncated));

        assert_eq!(service.truncate("short", 50).unwrap(), "short");

        let emoji = "🚀🚀🚀🚀🚀🚀🚀🚀";
        let cut = service.truncate(emoji, 3).unwrap();
        assert!(emoji.starts_with(&cut));
    }
}
