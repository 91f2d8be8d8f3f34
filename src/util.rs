//! Shared utility functions used across the codebase.

use std::future::Future;
use std::time::{Duration, Instant};

/// Parse an environment variable as a boolean, returning `default` if unset.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else maps to `false`.
pub fn env_var_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

/// Await `future`, log how long it took, and hand back the elapsed time with the output.
pub async fn timed<F, T>(label: &str, future: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = future.await;
    let elapsed = start.elapsed();
    tracing::info!("{} finished in {:.4}s", label, elapsed.as_secs_f64());
    (output, elapsed)
}

/// Truncate a string to at most `max_chars` characters for log previews.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
