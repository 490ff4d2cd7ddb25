//! One-time scrubs applied to the freshly built artifact.

use regex::{Captures, Regex};

use crate::names::random_hex;

/// Length of the hex token that replaces a debug tag.
pub const DEBUG_TAG_LEN: usize = 8;

/// Rewrites `call(<expr>, "<name>")` debug registrations so the string
/// literal becomes a random hex token.
///
/// The first argument may contain one level of balanced parentheses. The
/// literal may use single or double quotes and may contain escapes, but not
/// raw line breaks. Everything outside the literal is kept byte for byte.
#[derive(Debug, Clone)]
pub struct DebugTagScrubber {
    pattern: Regex,
}

impl DebugTagScrubber {
    pub fn new(call_name: &str) -> Result<Self, regex::Error> {
        let pattern = format!(
            r#"(?m)(?P<head>(?:^|[^\w$]){call}\s*\(\s*(?:[^,()"'`]|\([^()]*\))+?\s*,\s*)(?P<lit>"(?:[^"\\\r\n]|\\.)*"|'(?:[^'\\\r\n]|\\.)*')(?P<tail>\s*\))"#,
            call = regex::escape(call_name)
        );
        Ok(Self {
            pattern: Regex::new(&pattern)?,
        })
    }

    /// Returns the scrubbed text and the number of calls rewritten.
    pub fn scrub(&self, text: &str) -> (String, usize) {
        let mut count = 0;
        let out = self
            .pattern
            .replace_all(text, |caps: &Captures| {
                count += 1;
                let quote = caps["lit"].chars().next().unwrap_or('"');
                format!(
                    "{}{quote}{}{quote}{}",
                    &caps["head"],
                    random_hex(DEBUG_TAG_LEN),
                    &caps["tail"],
                )
            })
            .into_owned();
        (out, count)
    }
}

/// Convenience wrapper around [`DebugTagScrubber`].
pub fn scrub_debug_tags(text: &str, call_name: &str) -> Result<String, regex::Error> {
    Ok(DebugTagScrubber::new(call_name)?.scrub(text).0)
}

/// Drops every character that is neither printable ASCII nor ASCII
/// whitespace.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_graphic() || c.is_ascii_whitespace() || *c == '\x0b')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn replaces_literal_with_hex_token() {
        let out = scrub_debug_tags(r#"secretFn(x, "doLogin")"#, "secretFn").unwrap();
        let re = Regex::new(r#"^secretFn\(x, "[0-9a-f]{8}"\)$"#).unwrap();
        assert!(re.is_match(&out), "unexpected output {}", out);
    }

    #[test]
    fn rewrites_every_call_and_keeps_first_argument() {
        let input = r#"var a=__name(function(){},"a");__name(obj.handler, 'onClick');"#;
        let scrubber = DebugTagScrubber::new("__name").unwrap();
        let (out, count) = scrubber.scrub(input);
        assert_eq!(count, 2);
        let re = Regex::new(
            r#"^var a=__name\(function\(\)\{\},"[0-9a-f]{8}"\);__name\(obj\.handler, '[0-9a-f]{8}'\);$"#,
        )
        .unwrap();
        assert!(re.is_match(&out), "unexpected output {}", out);
    }

    #[test]
    fn handles_escaped_quotes_in_literal() {
        let (out, count) = DebugTagScrubber::new("__name")
            .unwrap()
            .scrub(r#"__name(f, "say \"hi\"")"#);
        assert_eq!(count, 1);
        assert!(!out.contains("hi"));
    }

    #[test]
    fn ignores_other_calls_and_longer_names() {
        let input = r#"my__name(x, "keep"); __names(y, "keep"); __name(z, 42);"#;
        let (out, count) = DebugTagScrubber::new("__name").unwrap().scrub(input);
        assert_eq!(count, 0);
        assert_eq!(out, input);
    }

    #[test]
    fn no_matches_is_a_noop() {
        let (out, count) = DebugTagScrubber::new("__name").unwrap().scrub("let a = 1;");
        assert_eq!(count, 0);
        assert_eq!(out, "let a = 1;");
    }

    #[test]
    fn strips_non_printable_characters() {
        let input = "let a\u{0} = 1;\t\r\n\u{1b}[0m\u{e9}b";
        assert_eq!(strip_control_chars(input), "let a = 1;\t\r\n[0mb");
    }

    proptest! {
        #[test]
        fn stripped_text_is_printable_ascii(s in ".*") {
            let out = strip_control_chars(&s);
            prop_assert!(out.chars().all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace() || c == '\x0b'));
        }

        #[test]
        fn scrub_preserves_length_outside_literals(arg in "[a-z]{1,10}", name in "[A-Za-z]{1,20}") {
            let input = format!("__name({}, \"{}\");", arg, name);
            let (out, count) = DebugTagScrubber::new("__name").unwrap().scrub(&input);
            prop_assert_eq!(count, 1);
            let expected_prefix = format!("__name({}, \"", arg);
            prop_assert!(out.starts_with(&expected_prefix));
            prop_assert_eq!(out.len(), expected_prefix.len() + DEBUG_TAG_LEN + 3);
        }
    }
}
