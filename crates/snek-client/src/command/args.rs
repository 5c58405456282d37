//! Message command argument parsing.

use std::sync::LazyLock;

use regex::Regex;

/// A double-quoted run, a single-quoted run, or a bare word.
static ARG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|'([^']*)'|(\S+)"#).ok());

/// The first whitespace-delimited word of `text`.
pub fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or_default()
}

/// Splits `text` into positional arguments; quoted runs stay together.
pub fn split_args(text: &str) -> Vec<String> {
    let Some(pattern) = ARG_PATTERN.as_ref() else {
        return text.split_whitespace().map(str::to_string).collect();
    };

    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Pattern matching a leading mention of `user_id` followed by whitespace.
pub fn mention_pattern(user_id: impl std::fmt::Display) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"^(<@!?{user_id}>\s)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_word() {
        assert_eq!(first_word("  echo hello"), "echo");
        assert_eq!(first_word(""), "");
    }

    #[test]
    fn test_split_args_keeps_quoted_runs() {
        assert_eq!(
            split_args(r#"one "two three" 'four five' six"#),
            vec!["one", "two three", "four five", "six"]
        );
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_mention_pattern() {
        let pattern = mention_pattern(42).unwrap();
        assert!(pattern.is_match("<@42> ping"));
        assert!(pattern.is_match("<@!42> ping"));
        assert!(!pattern.is_match("<@43> ping"));
        assert!(!pattern.is_match("hey <@42> ping"));
    }
}
