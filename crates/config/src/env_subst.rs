use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok()
});

/// Expand `${VAR}` and `${VAR:-fallback}` placeholders from the process
/// environment. Unknown variables without a fallback stay verbatim.
pub fn substitute_env(input: &str) -> Cow<'_, str> {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders through `lookup`.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Cow<'_, str> {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return Cow::Borrowed(input);
    };
    re.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "LLM_API_KEY").then(|| "sk-test".to_string())
    }

    #[test]
    fn known_variable_is_replaced() {
        assert_eq!(
            substitute_with("key = \"${LLM_API_KEY}\"", lookup),
            "key = \"sk-test\""
        );
    }

    #[test]
    fn unknown_variable_is_left_alone() {
        assert_eq!(substitute_with("${NOPE_XYZ}", lookup), "${NOPE_XYZ}");
    }

    #[test]
    fn fallback_used_when_unset() {
        assert_eq!(
            substitute_with("queue = \"${QUEUE:-receiver.inbound}\"", lookup),
            "queue = \"receiver.inbound\""
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_with("${LLM_API_KEY", lookup), "${LLM_API_KEY");
    }

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(substitute_env("plain"), Cow::Borrowed(_)));
    }
}
