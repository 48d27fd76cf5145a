//! Parsing of shell input lines.

use serde_json::{Value, json};

pub const HELP: &str = "\
Commands:
  call <service> <endpoint> <method> [json]
  subscribe <channel>
  unsubscribe <channel>
  publish <channel> <json>
  subscribers <channel>
  subscribe-queue <queue>
  unsubscribe-queue <queue>
  enqueue <queue> <json>
  help
  close";

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Call {
        service: String,
        endpoint: String,
        method: String,
        params: Value,
    },
    Subscribe(String),
    Unsubscribe(String),
    Publish { channel: String, message: Value },
    Subscribers(String),
    SubscribeQueue(String),
    UnsubscribeQueue(String),
    Enqueue { queue: String, message: Value },
    Help,
    Close,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Parses one input line. The trailing JSON argument may contain spaces.
pub fn parse_line(line: &str) -> Result<ReplCommand, ParseError> {
    let (name, rest) = next_word(line).ok_or(ParseError::Empty)?;

    match name {
        "call" => {
            const USAGE: &str = "call <service> <endpoint> <method> [json]";
            let (service, rest) = next_word(rest).ok_or(ParseError::Usage(USAGE))?;
            let (endpoint, rest) = next_word(rest).ok_or(ParseError::Usage(USAGE))?;
            let (method, rest) = next_word(rest).ok_or(ParseError::Usage(USAGE))?;
            let params = match rest.trim() {
                "" => json!({}),
                text => parse_json(text)?,
            };
            Ok(ReplCommand::Call {
                service: service.to_owned(),
                endpoint: endpoint.to_owned(),
                method: method.to_owned(),
                params,
            })
        }
        "subscribe" => single(rest, "subscribe <channel>").map(ReplCommand::Subscribe),
        "unsubscribe" => single(rest, "unsubscribe <channel>").map(ReplCommand::Unsubscribe),
        "subscribers" => single(rest, "subscribers <channel>").map(ReplCommand::Subscribers),
        "subscribe-queue" => {
            single(rest, "subscribe-queue <queue>").map(ReplCommand::SubscribeQueue)
        }
        "unsubscribe-queue" => {
            single(rest, "unsubscribe-queue <queue>").map(ReplCommand::UnsubscribeQueue)
        }
        "publish" => {
            let (channel, message) = with_json(rest, "publish <channel> <json>")?;
            Ok(ReplCommand::Publish { channel, message })
        }
        "enqueue" => {
            let (queue, message) = with_json(rest, "enqueue <queue> <json>")?;
            Ok(ReplCommand::Enqueue { queue, message })
        }
        "help" => Ok(ReplCommand::Help),
        "close" => Ok(ReplCommand::Close),
        other => Err(ParseError::Unknown(other.to_owned())),
    }
}

/// Splits off the first whitespace-delimited word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

fn single(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    match next_word(rest) {
        Some((word, tail)) if tail.trim().is_empty() => Ok(word.to_owned()),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn with_json(rest: &str, usage: &'static str) -> Result<(String, Value), ParseError> {
    let (name, tail) = next_word(rest).ok_or(ParseError::Usage(usage))?;
    let text = tail.trim();
    if text.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok((name.to_owned(), parse_json(text)?))
}

fn parse_json(text: &str) -> Result<Value, ParseError> {
    serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_with_json_containing_spaces() {
        let cmd = parse_line("call forecast daily today {\"city\": \"Oslo\"}").unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Call {
                service: "forecast".into(),
                endpoint: "daily".into(),
                method: "today".into(),
                params: json!({ "city": "Oslo" }),
            }
        );
    }

    #[test]
    fn test_call_without_params_sends_empty_object() {
        match parse_line("  call a b c  ").unwrap() {
            ReplCommand::Call { params, .. } => assert_eq!(params, json!({})),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_call_missing_method() {
        assert!(matches!(parse_line("call a b"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn test_publish_and_enqueue_require_json() {
        assert_eq!(
            parse_line("publish news [1, 2]").unwrap(),
            ReplCommand::Publish {
                channel: "news".into(),
                message: json!([1, 2]),
            }
        );
        assert!(matches!(parse_line("publish news"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_line("enqueue jobs {oops"), Err(ParseError::Json(_))));
    }

    #[test]
    fn test_single_argument_commands() {
        assert_eq!(
            parse_line("subscribe-queue jobs").unwrap(),
            ReplCommand::SubscribeQueue("jobs".into())
        );
        assert!(matches!(
            parse_line("subscribe a b"),
            Err(ParseError::Usage(_))
        ));
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(parse_line("   "), Err(ParseError::Empty));
        assert_eq!(parse_line("frobnicate"), Err(ParseError::Unknown("frobnicate".into())));
    }
}
