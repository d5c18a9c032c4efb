//! Functions callable from inside message templates.
//!
//! - `truncate_chars(text, max_chars)`
//! - `truncate_tokens(text, max_tokens)` (uses the template's token counter)
//! - `render_tools_as_json(Tools)` / `render_tools_as_xml(Tools)`

use std::iter;
use std::sync::Arc;

use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, Value};

use super::message::ToolDefinition;
use super::token::{TokenCountError, TokenCounter};

/// Names registered into every template namespace.
pub const FUNCTION_NAMES: [&str; 4] =
    ["truncate_chars", "truncate_tokens", "render_tools_as_json", "render_tools_as_xml"];

/// Keep at most `max_chars` code points of `text`.
pub fn truncate_chars(text: &str, max_chars: i64) -> String {
    if max_chars <= 0 {
        return String::new();
    }
    let max_chars = usize::try_from(max_chars).unwrap_or(usize::MAX);
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Keep the longest prefix of `text` whose token count fits `max_tokens`.
///
/// Binary search over prefix lengths in code points; assumes `counter` is
/// monotonic in prefix length. A counter error aborts the search.
pub fn truncate_tokens(
    text: &str,
    max_tokens: i64,
    counter: &dyn TokenCounter,
) -> Result<String, TokenCountError> {
    if max_tokens <= 0 {
        return Ok(String::new());
    }
    let max_tokens = usize::try_from(max_tokens).unwrap_or(usize::MAX);
    if counter.count(text)? <= max_tokens {
        return Ok(text.to_string());
    }

    // boundaries[k] is the byte offset where the k-char prefix ends
    let boundaries: Vec<usize> =
        text.char_indices().map(|(offset, _)| offset).chain(iter::once(text.len())).collect();

    let (mut lo, mut hi) = (0, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if counter.count(&text[..boundaries[mid]])? <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(text[..boundaries[lo]].to_string())
}

/// Deterministic JSON array of tool definitions. An empty list renders `[]`.
pub fn render_tools_as_json(tools: &[ToolDefinition]) -> Result<String, serde_json::Error> {
    serde_json::to_string(tools)
}

/// Deterministic XML rendering, one `<tool>` element per definition.
pub fn render_tools_as_xml(tools: &[ToolDefinition]) -> Result<String, serde_json::Error> {
    let mut out = String::from("<tools>\n");
    for tool in tools {
        let parameters = if tool.parameters.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&tool.parameters)?
        };
        out.push_str("  <tool>\n");
        push_element(&mut out, "name", &tool.name);
        push_element(&mut out, "description", &tool.description);
        push_element(&mut out, "parameters", &parameters);
        out.push_str("  </tool>\n");
    }
    out.push_str("</tools>");
    Ok(out)
}

fn push_element(out: &mut String, tag: &str, text: &str) {
    out.push_str("    <");
    out.push_str(tag);
    out.push('>');
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

/// Register the helper functions into a template environment.
pub fn register_functions(env: &mut Environment<'static>, counter: Arc<dyn TokenCounter>) {
    env.add_function("truncate_chars", |text: String, max_chars: i64| {
        truncate_chars(&text, max_chars)
    });

    env.add_function("truncate_tokens", move |text: String, max_tokens: i64| {
        truncate_tokens(&text, max_tokens, counter.as_ref()).map_err(|err| {
            Error::new(ErrorKind::InvalidOperation, "truncate_tokens: token counter failed")
                .with_source(err)
        })
    });

    env.add_function("render_tools_as_json", |tools: Value| -> Result<String, Error> {
        let tools = tools_from_value("render_tools_as_json", &tools)?;
        render_tools_as_json(&tools).map_err(|err| serialization_error("render_tools_as_json", err))
    });

    env.add_function("render_tools_as_xml", |tools: Value| -> Result<String, Error> {
        let tools = tools_from_value("render_tools_as_xml", &tools)?;
        render_tools_as_xml(&tools).map_err(|err| serialization_error("render_tools_as_xml", err))
    });
}

/// Convert a template value back into tool definitions.
///
/// `none` and undefined count as an empty list; anything that is not a list
/// of tool definitions is a usage error.
fn tools_from_value(function: &str, value: &Value) -> Result<Vec<ToolDefinition>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
        ValueKind::Seq => serde_json::to_value(value)
            .and_then(serde_json::from_value)
            .map_err(|err| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{}: expected a list of tool definitions", function),
                )
                .with_source(err)
            }),
        other => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("{}: expected a list of tool definitions, got {}", function, other),
        )),
    }
}

fn serialization_error(function: &str, err: serde_json::Error) -> Error {
    Error::new(ErrorKind::InvalidOperation, format!("{}: serialization failed", function))
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::domain::token::CharFallbackCounter;

    fn weather_tools() -> Vec<ToolDefinition> {
        let parameters = json!({"type": "object"}).as_object().cloned().unwrap();
        vec![
            ToolDefinition::new("get_weather", "Get weather").with_parameters(parameters),
            ToolDefinition::new("search", "Search"),
        ]
    }

    struct FailingCounter;

    impl TokenCounter for FailingCounter {
        fn count(&self, _text: &str) -> Result<usize, TokenCountError> {
            Err(TokenCountError::new("tokenizer offline"))
        }
    }

    /// Succeeds on the full text, fails on any shorter prefix.
    struct FailsDuringSearch;

    impl TokenCounter for FailsDuringSearch {
        fn count(&self, text: &str) -> Result<usize, TokenCountError> {
            if text.len() > 10 { Ok(100) } else { Err(TokenCountError::new("prefix rejected")) }
        }
    }

    #[test]
    fn truncate_chars_cases() {
        assert_eq!(truncate_chars("", 5), "");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello");
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("привет", 10), "привет");
        assert_eq!(truncate_chars("hello", 0), "");
        assert_eq!(truncate_chars("hello", -1), "");
    }

    #[test]
    fn truncate_tokens_cases() {
        let counter = CharFallbackCounter::new(4);
        assert_eq!(truncate_tokens("", 5, &counter).unwrap(), "");
        assert_eq!(truncate_tokens("hello", 10, &counter).unwrap(), "hello");
        assert_eq!(truncate_tokens("abcdefgh", 2, &counter).unwrap(), "abcdefgh");
        assert_eq!(truncate_tokens("abcdefghijkl", 2, &counter).unwrap(), "abcdefgh");
        assert_eq!(truncate_tokens("hello", 0, &counter).unwrap(), "");
        assert_eq!(truncate_tokens("hello", -3, &counter).unwrap(), "");
    }

    #[test]
    fn truncate_tokens_respects_multibyte_boundaries() {
        let counter = CharFallbackCounter::new(2);
        assert_eq!(truncate_tokens("привет мир", 2, &counter).unwrap(), "прив");
    }

    #[test]
    fn truncate_tokens_surfaces_counter_errors() {
        let err = truncate_tokens("hello", 1, &FailingCounter).unwrap_err();
        assert!(err.to_string().contains("tokenizer offline"));

        let err = truncate_tokens("a long enough input", 1, &FailsDuringSearch).unwrap_err();
        assert!(err.to_string().contains("prefix rejected"));
    }

    #[test]
    fn render_tools_as_json_is_stable() {
        assert_eq!(render_tools_as_json(&[]).unwrap(), "[]");
        assert_eq!(
            render_tools_as_json(&weather_tools()).unwrap(),
            r#"[{"name":"get_weather","description":"Get weather","parameters":{"type":"object"}},{"name":"search","description":"Search"}]"#
        );
    }

    #[test]
    fn render_tools_as_xml_golden() {
        let expected = "<tools>\n  <tool>\n    <name>get_weather</name>\n    <description>Get weather</description>\n    <parameters>{&#34;type&#34;:&#34;object&#34;}</parameters>\n  </tool>\n  <tool>\n    <name>search</name>\n    <description>Search</description>\n    <parameters></parameters>\n  </tool>\n</tools>";
        assert_eq!(render_tools_as_xml(&weather_tools()).unwrap(), expected);
        assert_eq!(render_tools_as_xml(&[]).unwrap(), "<tools>\n</tools>");
    }

    #[test]
    fn xml_escapes_markup() {
        let tools = vec![ToolDefinition::new("a<b", "x & y")];
        let xml = render_tools_as_xml(&tools).unwrap();
        assert!(xml.contains("<name>a&lt;b</name>"));
        assert!(xml.contains("<description>x &amp; y</description>"));
    }

    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        register_functions(&mut env, Arc::new(CharFallbackCounter::default()));
        env
    }

    #[test]
    fn functions_are_callable_from_templates() {
        let env = environment();
        let tools = weather_tools();
        let rendered = env
            .render_str(
                "{{ truncate_chars(text, 5) }}|{{ truncate_tokens(text, 1) }}|{{ render_tools_as_json(none) }}|{{ render_tools_as_json(tools) }}",
                minijinja::context! { text => "hello world", tools => tools },
            )
            .unwrap();
        assert_eq!(
            rendered,
            r#"hello|hell|[]|[{"name":"get_weather","description":"Get weather","parameters":{"type":"object"}},{"name":"search","description":"Search"}]"#
        );
    }

    #[test]
    fn non_list_tools_is_a_usage_error() {
        let env = environment();
        let err = env.render_str("{{ render_tools_as_xml(42) }}", minijinja::context! {}).unwrap_err();
        assert!(err.to_string().contains("expected a list of tool definitions"));
    }

    proptest! {
        #[test]
        fn truncate_chars_yields_prefix_of_bounded_length(text in ".{0,40}", max in -5i64..60) {
            let out = truncate_chars(&text, max);
            prop_assert!(text.starts_with(&out));
            let expected = if max <= 0 { 0 } else { (max as usize).min(text.chars().count()) };
            prop_assert_eq!(out.chars().count(), expected);
        }

        #[test]
        fn truncate_tokens_yields_longest_fitting_prefix(
            text in ".{0,60}",
            max in 1i64..12,
            per_token in 1usize..6,
        ) {
            let counter = CharFallbackCounter::new(per_token);
            let out = truncate_tokens(&text, max, &counter).unwrap();
            prop_assert!(text.starts_with(&out));
            prop_assert!(counter.count(&out).unwrap() <= max as usize);

            let taken = out.chars().count();
            if taken < text.chars().count() {
                let longer: String = text.chars().take(taken + 1).collect();
                prop_assert!(counter.count(&longer).unwrap() > max as usize);
            }
        }
    }
}
