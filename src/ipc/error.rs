use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// One line of protocol output. `id` is absent only when the request line
/// could not be parsed far enough to read it.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Envelope<'_> {
    fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    Envelope {
        id: Some(id),
        ok: true,
        result: Some(result),
        error: None,
    }
    .into_value()
}

fn failure(
    id: Option<&str>,
    code: &str,
    message: String,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    Envelope {
        id,
        ok: false,
        result: None,
        error: Some(ErrorBody {
            code: code.to_string(),
            message,
            details,
        }),
    }
    .into_value()
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    failure(Some(id), code, message.into(), details)
}

pub fn bad_json(message: impl Into<String>) -> serde_json::Value {
    failure(None, "bad_json", message.into(), None)
}
