use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::schedule::ScheduleDocument;
use crate::types::{Command, CommandKind};

/// Failure taxonomy for remote operations and the schedule cache. All of
/// these are non-fatal to the control loop; the next interval retries.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network: {0}")]
    Network(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("decode: {0}")]
    Decode(String),
    #[error("device is not active")]
    NotActive,
    #[error("storage: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Decoded outcome of a registration exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    pub remote_id: String,
    pub school_id: Option<String>,
    pub message: Option<String>,
}

impl RegistrationResult {
    /// The backend granted an assignment in this response.
    pub fn assigned(&self) -> bool {
        self.school_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// An explicit correction: the provisioned code was rejected or the
    /// device was unassigned, so locally held assignment data must go.
    pub fn clears_assignment(&self) -> bool {
        self.message.as_deref().is_some_and(|message| {
            message != "OK" && (message.contains("Invalid") || message.contains("Unassigned"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationRow {
    id: String,
    #[serde(default)]
    school_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.into_iter().next(),
        }
    }
}

/// The backend returns the registration row either as a bare object or as a
/// single-element array depending on which endpoint revision answered.
pub fn decode_registration(body: &str) -> Result<RegistrationResult, SyncError> {
    let row = serde_json::from_str::<OneOrMany<RegistrationRow>>(body)?
        .into_first()
        .ok_or_else(|| SyncError::Decode("empty registration response".to_string()))?;

    Ok(RegistrationResult {
        remote_id: row.id,
        school_id: row.school_id,
        message: row.message,
    })
}

#[derive(Debug, Deserialize)]
struct CommandRow {
    id: String,
    command: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl CommandRow {
    fn into_command(self) -> Command {
        let firmware_url = self
            .payload
            .as_ref()
            .and_then(|payload| payload.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Command {
            id: self.id,
            kind: CommandKind::from_tag(&self.command),
            firmware_url,
        }
    }
}

/// An empty body or empty array is success-with-none, not an error: the
/// queue simply holds nothing for this device right now.
pub fn decode_command_poll(body: &str) -> Result<Option<Command>, SyncError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    Ok(serde_json::from_str::<OneOrMany<CommandRow>>(body)?
        .into_first()
        .map(CommandRow::into_command))
}

/// A body without the `schedules` field is a decode error, never an implicit
/// empty schedule; `{"schedules": []}` is the explicit empty form.
pub fn decode_schedule_document(body: &str) -> Result<ScheduleDocument, SyncError> {
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registration_decodes_object_and_array_shapes() {
        let object = r#"{"id":"d1","school_id":"S1"}"#;
        let array = r#"[{"id":"d1","school_id":"S1","message":"OK"}]"#;

        let from_object = decode_registration(object).unwrap();
        let from_array = decode_registration(array).unwrap();

        assert_eq!(from_object.remote_id, "d1");
        assert_eq!(from_object.school_id.as_deref(), Some("S1"));
        assert!(from_object.assigned());
        assert_eq!(from_array.remote_id, from_object.remote_id);
        assert_eq!(from_array.school_id, from_object.school_id);
    }

    #[test]
    fn empty_school_id_is_not_an_assignment() {
        let result = decode_registration(r#"{"id":"d1","school_id":""}"#).unwrap();
        assert!(!result.assigned());
        assert!(!result.clears_assignment());
    }

    #[test]
    fn invalid_code_message_clears_assignment() {
        let result =
            decode_registration(r#"{"id":"d1","message":"Invalid School Code: ZZZ"}"#).unwrap();
        assert!(result.clears_assignment());

        let ok = decode_registration(r#"{"id":"d1","school_id":"S1","message":"OK"}"#).unwrap();
        assert!(!ok.clears_assignment());
    }

    #[test]
    fn empty_registration_array_is_a_decode_error() {
        assert!(matches!(
            decode_registration("[]"),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn empty_poll_is_none_not_error() {
        assert_eq!(decode_command_poll("[]").unwrap(), None);
        assert_eq!(decode_command_poll("").unwrap(), None);
        assert_eq!(decode_command_poll("  ").unwrap(), None);
    }

    #[test]
    fn poll_takes_first_pending_command() {
        let command = decode_command_poll(
            r#"[{"id":"c1","command":"RING"},{"id":"c2","command":"REBOOT"}]"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(command.id, "c1");
        assert_eq!(command.kind, CommandKind::Ring);
        assert_eq!(command.firmware_url, None);
    }

    #[test]
    fn firmware_command_carries_url() {
        let command = decode_command_poll(
            r#"{"id":"c1","command":"UPDATE_FIRMWARE","payload":{"url":"http://x/fw.bin"}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(command.kind, CommandKind::UpdateFirmware);
        assert_eq!(command.firmware_url.as_deref(), Some("http://x/fw.bin"));
    }

    #[test]
    fn dashboard_config_tag_decodes_to_reconfigure() {
        let command = decode_command_poll(r#"[{"id":"c4","command":"CONFIG"}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(command.kind, CommandKind::Reconfigure);
    }

    #[test]
    fn unknown_command_tag_decodes_to_unrecognized() {
        let command = decode_command_poll(r#"{"id":"c9","command":"SELF_DESTRUCT"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(command.kind, CommandKind::Unrecognized);
    }

    #[test]
    fn missing_schedules_field_is_a_decode_error() {
        assert!(matches!(
            decode_schedule_document(r#"{"status":"ok"}"#),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn explicit_empty_schedule_is_valid() {
        let document = decode_schedule_document(r#"{"schedules":[]}"#).unwrap();
        assert!(document.to_set().is_empty());
    }
}
