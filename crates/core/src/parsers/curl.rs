//! Example invocations written as `curl` command lines

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::types::{CurlExample, Extraction};
use crate::catalog::{map_action_key, map_content_key_to_type, Action};

const SOURCE: &str = "curl";

/// Flags whose value we read past without keeping.
const SKIPPED_VALUE_FLAGS: &[&str] = &[
    "-H",
    "--header",
    "-u",
    "--user",
    "-o",
    "--output",
    "-A",
    "--user-agent",
    "-b",
    "--cookie",
    "-e",
    "--referer",
    "-w",
    "--write-out",
    "-m",
    "--max-time",
];

const DATA_FLAGS: &[&str] = &["-d", "--data", "--data-raw", "--data-binary", "--data-ascii"];

/// Find and parse every `curl` command in `text`.
///
/// Commands may sit in comments (`//`, `#`, ` * `), behind a `$ ` prompt, or
/// inside `<pre>` blocks, and may span lines with trailing backslashes.
pub fn parse_curl_examples(text: &str) -> Extraction<CurlExample> {
    let mut out = Extraction::default();

    for command in curl_commands(text) {
        match parse_command(&command) {
            Some(example) => out.records.push(example),
            None => {
                let preview: String = command.chars().take(60).collect();
                out.warn(SOURCE, format!("could not parse curl command: {preview}"));
            }
        }
    }

    out
}

/// Parse the first `curl` command in `text`, if any parses.
pub fn parse_curl_example(text: &str) -> Option<CurlExample> {
    curl_commands(text).first().and_then(|command| parse_command(command))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

fn clean_line(line: &str) -> String {
    let line = if line.contains('<') {
        tag_re().replace_all(line, "").into_owned()
    } else {
        line.to_string()
    };
    let line = if line.contains("&amp;") || line.contains("&quot;") {
        html_escape::decode_html_entities(&line).into_owned()
    } else {
        line
    };

    let trimmed = line
        .trim()
        .trim_end_matches("*/")
        .trim_start_matches(|c: char| matches!(c, '/' | '*' | '#') || c.is_whitespace());
    trimmed
        .strip_prefix("$ ")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Logical command lines that start with `curl`, continuations joined.
fn curl_commands(text: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = clean_line(raw);

        if let Some(command) = current.as_mut() {
            match line.strip_suffix('\\') {
                Some(part) => {
                    command.push(' ');
                    command.push_str(part.trim());
                }
                None => {
                    command.push(' ');
                    command.push_str(&line);
                    commands.extend(current.take());
                }
            }
            continue;
        }

        if line != "curl" && !line.starts_with("curl ") && !line.starts_with("curl\t") {
            continue;
        }

        match line.strip_suffix('\\') {
            Some(part) => current = Some(part.trim().to_string()),
            None => commands.push(line),
        }
    }

    commands.extend(current);
    commands
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_command(command: &str) -> Option<CurlExample> {
    let tokens = shlex::split(command)?;
    let mut tokens = tokens.into_iter();
    if tokens.next().as_deref() != Some("curl") {
        return None;
    }

    let mut method: Option<String> = None;
    let mut url: Option<String> = None;
    let mut params = BTreeMap::new();
    let mut files = BTreeMap::new();

    while let Some(token) = tokens.next() {
        // `--data=value` and `-XPOST` spellings
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ if token.starts_with("-X") && token.len() > 2 => {
                ("-X".to_string(), Some(token[2..].to_string()))
            }
            _ => (token.clone(), None),
        };
        let mut value = |inline: Option<String>| inline.or_else(|| tokens.next());

        match flag.as_str() {
            "-X" | "--request" => method = value(inline).map(|m| m.to_ascii_uppercase()),
            "--data-urlencode" => {
                if let Some((key, val)) = value(inline).as_deref().and_then(|v| v.split_once('=')) {
                    params.insert(key.to_string(), val.to_string());
                }
            }
            f if DATA_FLAGS.contains(&f) => {
                let Some(data) = value(inline) else { continue };
                if data.starts_with('@') {
                    continue;
                }
                for pair in data.split('&').filter(|pair| !pair.is_empty()) {
                    let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
                    params.insert(decode(key), decode(val));
                }
            }
            "-F" | "--form" => {
                let Some(field) = value(inline) else { continue };
                let Some((key, val)) = field.split_once('=') else { continue };
                match val.strip_prefix('@') {
                    Some(path) => {
                        let path = path.split(';').next().unwrap_or(path);
                        files.insert(key.to_string(), path.to_string());
                    }
                    None => {
                        params.insert(key.to_string(), val.to_string());
                    }
                }
            }
            f if SKIPPED_VALUE_FLAGS.contains(&f) => {
                value(inline);
            }
            f if f.starts_with('-') => {}
            _ => {
                if url.is_none() {
                    url = Some(token);
                }
            }
        }
    }

    if url.is_none() && params.is_empty() && files.is_empty() {
        return None;
    }

    let method = method.unwrap_or_else(|| {
        if params.is_empty() && files.is_empty() {
            "GET".to_string()
        } else {
            "POST".to_string()
        }
    });

    let content_type = params
        .get("content")
        .and_then(|raw: &String| map_content_key_to_type(raw));
    let action = match params.get("action") {
        Some(raw) => map_action_key(raw),
        None => content_type.map(|_| Action::Export),
    };

    Some(CurlExample {
        method,
        url,
        params,
        files,
        content_type,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ContentType;

    #[test]
    fn test_single_line_example() {
        let example = parse_curl_example(
            "curl -X POST -d 'token=ABC&content=record&format=json' https://redcap.example.edu/api/",
        )
        .unwrap();
        assert_eq!(example.method, "POST");
        assert_eq!(example.url.as_deref(), Some("https://redcap.example.edu/api/"));
        assert_eq!(example.params.len(), 3);
        assert_eq!(example.content_type, Some(ContentType::Record));
        assert_eq!(example.action, Some(Action::Export));
    }

    #[test]
    fn test_commented_multiline_example() {
        let text = r#"
/**
 * Example:
 * $ curl -H "Content-Type: application/x-www-form-urlencoded" \
 *     -H "Accept: application/json" \
 *     -d "token=ABC&content=file&action=import&record=1" \
 *     -F "file=@/tmp/consent.pdf;type=application/pdf" \
 *     --data-urlencode "filterLogic=[age] > 30" \
 *     https://redcap.example.edu/api/
 */
"#;
        let out = parse_curl_examples(text);
        assert!(out.is_clean());
        assert_eq!(out.records.len(), 1);

        let example = &out.records[0];
        assert_eq!(example.method, "POST");
        assert_eq!(example.content_type, Some(ContentType::File));
        assert_eq!(example.action, Some(Action::Import));
        assert_eq!(example.params.get("record").map(String::as_str), Some("1"));
        assert_eq!(
            example.params.get("filterLogic").map(String::as_str),
            Some("[age] > 30")
        );
        assert_eq!(example.files.get("file").map(String::as_str), Some("/tmp/consent.pdf"));
        assert!(!example.params.contains_key("Accept"));
    }

    #[test]
    fn test_percent_decoding_and_inline_flags() {
        let example = parse_curl_example(
            "# curl -XPOST --data=token=X&fields%5B0%5D=age&content=metadata https://x/api/",
        )
        .unwrap();
        assert_eq!(example.method, "POST");
        assert_eq!(example.params.get("token").map(String::as_str), Some("X"));
        assert_eq!(example.params.get("fields[0]").map(String::as_str), Some("age"));
        assert_eq!(example.content_type, Some(ContentType::Metadata));
    }

    #[test]
    fn test_get_without_data() {
        let example = parse_curl_example("curl https://redcap.example.edu/api/").unwrap();
        assert_eq!(example.method, "GET");
        assert!(example.params.is_empty());
        assert_eq!(example.content_type, None);
        assert_eq!(example.action, None);
    }

    #[test]
    fn test_unknown_action_is_none() {
        let example =
            parse_curl_example("curl -d 'content=arm&action=launch' https://x/api/").unwrap();
        assert_eq!(example.content_type, Some(ContentType::Arm));
        assert_eq!(example.action, None);
    }

    #[test]
    fn test_html_example_is_decoded() {
        let text = "<pre>curl -d \"token=ABC&amp;content=version\" https://x/api/</pre>";
        let out = parse_curl_examples(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].content_type, Some(ContentType::Version));
    }

    #[test]
    fn test_unbalanced_quote_is_a_warning() {
        let text = "curl -d 'token=ABC&content=record https://x/api/\ncurl -d content=arm https://x/api/";
        let out = parse_curl_examples(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].content_type, Some(ContentType::Arm));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_non_curl_lines_ignored() {
        let text = "<?php\n$ch = curl_init();\ncurl_setopt($ch, CURLOPT_POST, 1);\n";
        let out = parse_curl_examples(text);
        assert!(out.records.is_empty());
        assert!(out.is_clean());
    }

    #[test]
    fn test_bare_curl_is_a_warning() {
        let out = parse_curl_examples("curl -s");
        assert!(out.records.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }
}
