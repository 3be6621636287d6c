use crate::types::{ApiError, ApiResult, ErrorKind};
use serde_json::Value;

/// Unwraps `{success, data}` response envelopes.
///
/// An object with a boolean `success` of `true` yields its `data` (or the
/// whole object when `data` is absent); `false` fails with the embedded
/// message. Anything else is returned untouched.
pub fn unwrap_envelope(body: Value, path: &str) -> ApiResult<Value> {
    let Value::Object(mut object) = body else {
        return Ok(body);
    };

    match object.get("success") {
        Some(Value::Bool(true)) => match object.remove("data") {
            Some(data) => Ok(data),
            None => Ok(Value::Object(object)),
        },
        Some(Value::Bool(false)) => {
            let message = object
                .get("message")
                .or_else(|| object.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("Request was rejected")
                .to_string();
            let code = object
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string);

            let mut err = ApiError::new(ErrorKind::Rejected, message, path);
            if let Some(code) = code {
                err = err.with_code(code);
            }
            Err(err.with_details(Value::Object(object)))
        }
        _ => Ok(Value::Object(object)),
    }
}
