/// Maps text and a model identifier to an approximate token count.
///
/// Implementations must be deterministic, return 0 for empty text, never
/// decrease when text is extended, and fall back to a default calibration for
/// model names they do not recognize.
pub trait TokenEstimator {
    fn estimate(&self, text: &str, model: &str) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct ModelProfile {
    /// Characters per token for prose, in tenths
    prose_chars_per_token_x10: usize,
    /// Characters per token inside fenced code, in tenths
    code_chars_per_token_x10: usize,
}

const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    prose_chars_per_token_x10: 40,
    code_chars_per_token_x10: 45,
};

fn profile_for(model: &str) -> ModelProfile {
    let model = model.to_ascii_lowercase();
    if model.starts_with("claude") {
        ModelProfile {
            prose_chars_per_token_x10: 38,
            code_chars_per_token_x10: 42,
        }
    } else if model.starts_with("gpt-4o")
        || model.starts_with("gpt-4.1")
        || model.starts_with("o3")
        || model.starts_with("o4")
    {
        ModelProfile {
            prose_chars_per_token_x10: 42,
            code_chars_per_token_x10: 48,
        }
    } else if model.starts_with("gpt-") {
        ModelProfile {
            prose_chars_per_token_x10: 40,
            code_chars_per_token_x10: 44,
        }
    } else {
        DEFAULT_PROFILE
    }
}

/// Character-count estimator with a content-shape adjustment: fenced code
/// counts at a higher characters-per-token ratio than prose.
///
/// Each line is classified by the fence state at the start of the line, and a
/// fence marker only toggles the state for the lines after it. Appended text
/// therefore never reclassifies characters already counted, which keeps the
/// estimate monotone as text grows.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTokenEstimator;

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate(&self, text: &str, model: &str) -> usize {
        let profile = profile_for(model);
        let mut prose_chars = 0usize;
        let mut code_chars = 0usize;
        let mut in_code_fence = false;

        for line in text.split_inclusive('\n') {
            if in_code_fence {
                code_chars += line.chars().count();
            } else {
                prose_chars += line.chars().count();
            }
            if line.trim().starts_with("```") {
                in_code_fence = !in_code_fence;
            }
        }

        (prose_chars * 10).div_ceil(profile.prose_chars_per_token_x10)
            + (code_chars * 10).div_ceil(profile.code_chars_per_token_x10)
    }
}

/// Word-count estimator: whitespace-separated words plus half the
/// punctuation, ignoring the model entirely. Coarser than the character
/// heuristic but cheap and shape-independent.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenEstimator;

impl TokenEstimator for WhitespaceTokenEstimator {
    fn estimate(&self, text: &str, _model: &str) -> usize {
        let words = text.split_whitespace().count();
        let punctuation = text
            .chars()
            .filter(|c| c.is_ascii_punctuation())
            .count();
        words + punctuation / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &[&str] = &["gpt-4o", "gpt-3.5-turbo", "claude-sonnet", "o3", "mystery-9000"];

    #[test]
    fn test_empty_text_is_zero_for_any_model() {
        for model in MODELS {
            assert_eq!(HeuristicTokenEstimator.estimate("", model), 0);
            assert_eq!(WhitespaceTokenEstimator.estimate("", model), 0);
        }
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let text = "Some prose.\n```rust\nfn f() {}\n```\nMore prose.";
        for model in MODELS {
            let first = HeuristicTokenEstimator.estimate(text, model);
            let second = HeuristicTokenEstimator.estimate(text, model);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_prefix_monotonicity() {
        let text = "Intro prose line.\n```rust\nlet x = 1;\nlet y = 2;\n```\nClosing remarks, with punctuation!";
        for model in MODELS {
            let mut previous_heuristic = 0;
            let mut previous_whitespace = 0;
            for (offset, _) in text.char_indices() {
                let prefix = &text[..offset];

                let heuristic = HeuristicTokenEstimator.estimate(prefix, model);
                assert!(
                    heuristic >= previous_heuristic,
                    "heuristic regressed at offset {offset} for {model}"
                );
                previous_heuristic = heuristic;

                let whitespace = WhitespaceTokenEstimator.estimate(prefix, model);
                assert!(
                    whitespace >= previous_whitespace,
                    "whitespace regressed at offset {offset} for {model}"
                );
                previous_whitespace = whitespace;
            }
        }
    }

    #[test]
    fn test_unknown_model_uses_fallback_profile() {
        let text = "hello world, this is a plain sentence of prose text";
        let unknown = HeuristicTokenEstimator.estimate(text, "mystery-9000");
        assert!(unknown > 0);
        assert_eq!(unknown, HeuristicTokenEstimator.estimate(text, ""));
    }

    #[test]
    fn test_fenced_code_counts_fewer_tokens_than_prose() {
        let body = "x".repeat(450);
        let as_prose = HeuristicTokenEstimator.estimate(&body, "gpt-4o");
        let as_code = HeuristicTokenEstimator.estimate(&format!("```\n{body}\n```"), "gpt-4o");
        assert!(
            as_code < as_prose,
            "expected fenced body ({as_code}) below prose body ({as_prose})"
        );
    }

    #[test]
    fn test_estimate_grows_with_length() {
        let short = HeuristicTokenEstimator.estimate("short", "gpt-4o");
        let long = HeuristicTokenEstimator.estimate(&"long text ".repeat(100), "gpt-4o");
        assert!(long > short);
    }

    #[test]
    fn test_whitespace_estimator_counts_words_and_punctuation() {
        assert_eq!(WhitespaceTokenEstimator.estimate("one two three", "any"), 3);
        // Four punctuation marks contribute two extra tokens.
        assert_eq!(
            WhitespaceTokenEstimator.estimate("a, b, c; d. ", "any"),
            4 + 2
        );
    }
}
