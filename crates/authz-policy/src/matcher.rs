use regex::Regex;

/// How a single policy string (principal, path or header value) is matched.
///
/// Policy documents use a compact wildcard syntax which [`StringMatch::from_pattern`]
/// turns into one of these:
///
/// * `*` matches any non-empty value.
/// * `*suffix` matches values ending in `suffix`.
/// * `prefix*` matches values starting with `prefix`.
/// * anything else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Suffix(String),
    /// A regular expression that must match the whole value.
    SafeRegex(String),
}

impl StringMatch {
    pub fn from_pattern(pattern: &str) -> Self {
        if pattern == "*" {
            StringMatch::SafeRegex(".+".to_string())
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            StringMatch::Suffix(suffix.to_string())
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            StringMatch::Prefix(prefix.to_string())
        } else {
            StringMatch::Exact(pattern.to_string())
        }
    }

    /// The pattern text, used in error messages.
    pub fn pattern(&self) -> &str {
        match self {
            StringMatch::Exact(s)
            | StringMatch::Prefix(s)
            | StringMatch::Suffix(s)
            | StringMatch::SafeRegex(s) => s,
        }
    }
}

/// A pre-compiled [`StringMatch`] ready for repeated evaluation.
#[derive(Debug)]
pub(crate) enum CompiledMatch {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Regex(Regex),
}

impl CompiledMatch {
    pub(crate) fn compile(m: &StringMatch) -> Result<Self, regex::Error> {
        Ok(match m {
            StringMatch::Exact(s) => CompiledMatch::Exact(s.clone()),
            StringMatch::Prefix(s) => CompiledMatch::Prefix(s.clone()),
            StringMatch::Suffix(s) => CompiledMatch::Suffix(s.clone()),
            // Anchored: a safe regex has to cover the entire value.
            StringMatch::SafeRegex(re) => CompiledMatch::Regex(Regex::new(&format!("^(?:{re})$"))?),
        })
    }

    pub(crate) fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledMatch::Exact(s) => value == s,
            CompiledMatch::Prefix(s) => value.starts_with(s.as_str()),
            CompiledMatch::Suffix(s) => value.ends_with(s.as_str()),
            CompiledMatch::Regex(re) => re.is_match(value),
        }
    }
}

/// Returns `true` if any matcher accepts any of `values`. An empty matcher
/// list accepts everything.
pub(crate) fn any_match<'a>(
    matchers: &[CompiledMatch],
    values: impl IntoIterator<Item = &'a str> + Clone,
) -> bool {
    matchers.is_empty()
        || matchers
            .iter()
            .any(|m| values.clone().into_iter().any(|v| m.is_match(v)))
}
