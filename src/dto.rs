use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /api/send-email`.
///
/// Required fields are optional here so that a missing field is reported as a
/// validation failure naming it, not as a JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MailRequest {
    /// Recipient address, several may be separated by commas.
    pub to: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Option<Vec<AttachmentRequest>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub filename: Option<String>,
    /// File on the server's filesystem.
    pub path: Option<String>,
    /// Inline content, used when `path` is not set.
    pub content: Option<String>,
    /// `base64` decodes `content`, otherwise it is taken as UTF-8 text.
    pub encoding: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(String),
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.is_empty())
}

fn missing(field: impl Into<String>) -> ValidationError {
    ValidationError::MissingField(field.into())
}

impl MailRequest {
    /// Checks `to`, `subject`, the body and then every attachment, stopping at
    /// the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(self.to.as_ref()) {
            return Err(missing("to"));
        }
        if is_blank(self.subject.as_ref()) {
            return Err(missing("subject"));
        }
        if is_blank(self.text.as_ref()) && is_blank(self.html.as_ref()) {
            return Err(missing("text or html"));
        }
        for (index, attachment) in self.attachments.iter().flatten().enumerate() {
            attachment.validate(index)?;
        }
        Ok(())
    }
}

impl AttachmentRequest {
    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if is_blank(self.filename.as_ref()) {
            return Err(missing(format!("attachments[{index}].filename")));
        }
        if is_blank(self.path.as_ref()) && self.content.is_none() {
            return Err(missing(format!("attachments[{index}].path or content")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MailResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MailResult {
    pub fn sent(message_id: String) -> Self {
        Self {
            success: true,
            message: "sent".to_string(),
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            message_id: None,
            error: Some(error.into()),
        }
    }

    pub fn invalid(error: &ValidationError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            message_id: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub success: bool,
    pub message: String,
    pub version: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: String,
    pub send_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFoundResponse {
    pub success: bool,
    pub message: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(to: Option<&str>, subject: Option<&str>, text: Option<&str>) -> MailRequest {
        MailRequest {
            to: to.map(str::to_string),
            subject: subject.map(str::to_string),
            text: text.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn complete_request_is_valid() {
        assert_eq!(
            request(Some("a@b.com"), Some("Hi"), Some("Hello")).validate(),
            Ok(())
        );
    }

    #[test]
    fn html_alone_is_enough() {
        let req = MailRequest {
            html: Some("<h1>Hello</h1>".to_string()),
            ..request(Some("a@b.com"), Some("Hi"), None)
        };

        assert!(req.validate().is_ok());
    }

    #[test]
    fn first_missing_field_wins() {
        let err = request(None, None, None).validate().unwrap_err();
        assert_eq!(err.to_string(), "missing required field: to");

        let err = request(Some("a@b.com"), None, None).validate().unwrap_err();
        assert_eq!(err.to_string(), "missing required field: subject");

        let err = request(Some("a@b.com"), Some("Hi"), None)
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "missing required field: text or html");
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let err = request(Some(""), Some("Hi"), Some("Hello"))
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("to".to_string()));

        let req = MailRequest {
            html: Some(String::new()),
            ..request(Some("a@b.com"), Some("Hi"), Some(""))
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn attachment_needs_filename_and_source() {
        let mut req = request(Some("a@b.com"), Some("Hi"), Some("Hello"));
        req.attachments = Some(vec![
            AttachmentRequest {
                filename: Some("a.txt".to_string()),
                content: Some("hi".to_string()),
                ..Default::default()
            },
            AttachmentRequest {
                content: Some("hi".to_string()),
                ..Default::default()
            },
        ]);
        assert_eq!(
            req.validate().unwrap_err().to_string(),
            "missing required field: attachments[1].filename"
        );

        req.attachments = Some(vec![AttachmentRequest {
            filename: Some("a.txt".to_string()),
            ..Default::default()
        }]);
        assert_eq!(
            req.validate().unwrap_err().to_string(),
            "missing required field: attachments[0].path or content"
        );
    }

    #[test]
    fn result_serializes_camel_case_and_skips_absent_fields() {
        let ok = serde_json::to_value(MailResult::sent("<id@qq.com>".to_string())).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"success": true, "message": "sent", "messageId": "<id@qq.com>"})
        );

        let invalid = serde_json::to_value(MailResult::invalid(&ValidationError::MissingField(
            "to".to_string(),
        )))
        .unwrap();
        assert_eq!(
            invalid,
            serde_json::json!({"success": false, "message": "missing required field: to"})
        );
    }

    #[test]
    fn attachment_accepts_camel_case_content_type() {
        let att: AttachmentRequest = serde_json::from_str(
            r#"{"filename":"r.pdf","content":"SGk=","encoding":"base64","contentType":"application/pdf"}"#,
        )
        .unwrap();

        assert_eq!(att.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(att.encoding.as_deref(), Some("base64"));
    }
}
