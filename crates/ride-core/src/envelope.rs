//! Response envelope (spec §4.6): `{success, data|error, meta?}`.
//!
//! This core never serves HTTP directly (transport encoding is a Non-goal,
//! §1), but every operation it exposes is shaped so a thin adapter can drop
//! the result straight into this envelope without any further massaging.

use {
    crate::error::{CoreError, ErrorKind},
    serde::Serialize,
};

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl From<&CoreError> for ApiError {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.kind.code().to_owned(),
            message: err.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Payload<T> {
    Ok {
        success: bool,
        data: T,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },
    Err {
        success: bool,
        error: ApiError,
    },
}

/// `{success, data|error, meta?}` as specified. `Envelope::ok` and
/// `Envelope::err` are the only two constructors; there is deliberately no
/// way to build one with `success` out of sync with which variant is set.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Envelope<T> {
    payload: Payload<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            payload: Payload::Ok {
                success: true,
                data,
                meta: None,
            },
        }
    }

    pub fn ok_with_meta(data: T, meta: serde_json::Value) -> Self {
        Self {
            payload: Payload::Ok {
                success: true,
                data,
                meta: Some(meta),
            },
        }
    }
}

impl<T> Envelope<T> {
    pub fn err(error: &CoreError) -> Envelope<()> {
        Envelope {
            payload: Payload::Err {
                success: false,
                error: error.into(),
            },
        }
    }

    pub fn status_code(error: &CoreError) -> u16 {
        error.kind.status_code()
    }
}

pub fn kind_for(error: &CoreError) -> ErrorKind {
    error.kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_round_trips() {
        let env = Envelope::ok(42);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn err_envelope_carries_code_and_message() {
        let core_err = CoreError::bad_request("offer too low");
        let env: Envelope<()> = Envelope::err(&core_err);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(json["error"]["message"], "offer too low");
    }
}
