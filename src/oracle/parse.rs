use crate::models::{Recommendation, Signal};
use serde_json::{Map, Value};
use thiserror::Error;

const KEYS: [&str; 5] = [
    "signal",
    "confidence",
    "stop_loss_distance_in_usd",
    "take_profit_distance_in_usd",
    "reason",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("no JSON object found in response")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("unexpected key `{0}`")]
    UnexpectedKey(String),
    #[error("`{key}` must be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("unknown signal `{0}`")]
    UnknownSignal(String),
}

/// First balanced `{...}` block in `text`
///
/// Braces inside JSON strings (and escaped quotes within them) are ignored.
/// Returns None when no opening brace is ever closed.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and validate the oracle's recommendation from free text
///
/// The object must carry exactly the five recommendation keys. Confidence
/// is rounded and clamped to 0..=100; distances must be non-negative.
pub fn parse_recommendation(text: &str) -> Result<Recommendation, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let block = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(block).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ParseError::NoJsonObject);
    };

    if let Some(unknown) = object.keys().find(|k| !KEYS.contains(&k.as_str())) {
        return Err(ParseError::UnexpectedKey(unknown.clone()));
    }

    let signal_text = field(&object, "signal")?
        .as_str()
        .ok_or(ParseError::WrongType {
            key: "signal",
            expected: "a string",
        })?;
    let signal = Signal::parse(signal_text).ok_or_else(|| ParseError::UnknownSignal(signal_text.to_string()))?;

    let confidence = number(&object, "confidence")?.round().clamp(0.0, 100.0) as u8;
    let stop_loss_distance_usd = distance(&object, "stop_loss_distance_in_usd")?;
    let take_profit_distance_usd = distance(&object, "take_profit_distance_in_usd")?;

    let reason = field(&object, "reason")?
        .as_str()
        .ok_or(ParseError::WrongType {
            key: "reason",
            expected: "a string",
        })?
        .to_string();

    Ok(Recommendation {
        signal,
        confidence,
        stop_loss_distance_usd,
        take_profit_distance_usd,
        reason,
    })
}

fn field<'a>(object: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, ParseError> {
    object.get(key).ok_or(ParseError::MissingKey(key))
}

fn number(object: &Map<String, Value>, key: &'static str) -> Result<f64, ParseError> {
    field(object, key)?.as_f64().ok_or(ParseError::WrongType {
        key,
        expected: "a number",
    })
}

fn distance(object: &Map<String, Value>, key: &'static str) -> Result<f64, ParseError> {
    let value = number(object, key)?;
    if value < 0.0 {
        return Err(ParseError::WrongType {
            key,
            expected: "a non-negative number",
        });
    }
    Ok(value)
}
