use std::fmt::Display;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    address::AddressError,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use uuid::Uuid;

use crate::{
    config::{Config, Encryption},
    dto::{AttachmentRequest, MailRequest, MailResult, ValidationError},
};

/// Problems with the submission settings, detected when a client is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sender address is not configured, check QQ_EMAIL")]
    MissingSender,

    #[error("authorization code is not configured, check QQ_AUTH_CODE")]
    MissingCredential,

    #[error("invalid sender address '{0}': {1}")]
    InvalidSender(String, AddressError),

    #[error("failed to set up SMTP relay to '{0}': {1}")]
    Relay(String, lettre::transport::smtp::Error),
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid recipient address '{0}': {1}")]
    Recipient(String, AddressError),

    #[error("failed to read attachment '{0}': {1}")]
    AttachmentRead(String, std::io::Error),

    #[error("failed to decode attachment '{0}': {1}")]
    AttachmentDecode(String, base64::DecodeError),

    #[error("invalid content type '{0}' for attachment '{1}'")]
    ContentType(String, String),

    #[error("failed to build email message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Submits one mail-send request and reports the outcome as data.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, request: &MailRequest) -> MailResult;
}

/// Submits messages through one SMTP transport, always as the configured
/// sender.
pub struct MailClient<T = AsyncSmtpTransport<Tokio1Executor>> {
    sender: Mailbox,
    transport: T,
}

impl MailClient {
    /// Builds an implicit-TLS (or STARTTLS) transport authenticated with the
    /// configured sender and authorization code.
    pub fn connect(config: &Config) -> Result<Self, ConfigError> {
        let sender = config.sender().ok_or(ConfigError::MissingSender)?;
        let auth_code = config.auth_code().ok_or(ConfigError::MissingCredential)?;

        let mailbox: Mailbox = sender
            .parse()
            .map_err(|e| ConfigError::InvalidSender(sender.to_string(), e))?;

        let builder = match config.smtp_encryption {
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host),
            Encryption::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            }
        }
        .map_err(|e| ConfigError::Relay(config.smtp_host.clone(), e))?;

        let creds = Credentials::new(sender.to_string(), auth_code.to_string());
        let transport = builder.port(config.smtp_port).credentials(creds).build();

        Ok(Self::with_transport(mailbox, transport))
    }

    /// Connects and authenticates without sending anything.
    pub async fn verify_connection(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(true) => {
                tracing::info!("SMTP connection verified");
                true
            }
            Ok(false) => {
                tracing::warn!("SMTP server did not accept the connection check");
                false
            }
            Err(e) => {
                tracing::error!("SMTP connection check failed: {e}");
                false
            }
        }
    }
}

impl<T> MailClient<T>
where
    T: AsyncTransport + Sync,
    T::Error: Display,
{
    pub const fn with_transport(sender: Mailbox, transport: T) -> Self {
        Self { sender, transport }
    }

    async fn try_send(&self, request: &MailRequest) -> Result<String, SendError> {
        request.validate()?;

        let (email, message_id) = self.build_message(request).await?;

        let to = request.to.as_deref().unwrap_or_default();
        tracing::info!(
            "Sending email to '{}' with subject '{}'",
            to,
            request.subject.as_deref().unwrap_or_default()
        );

        self.transport
            .send(email)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!("Message {} to {} sent successfully", message_id, to);

        Ok(message_id)
    }

    async fn build_message(&self, request: &MailRequest) -> Result<(Message, String), SendError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.sender.email.domain());

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .message_id(Some(message_id.clone()))
            .subject(request.subject.clone().unwrap_or_default());

        for address in request
            .to
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            let mailbox: Mailbox = address
                .parse()
                .map_err(|e| SendError::Recipient(address.to_string(), e))?;
            builder = builder.to(mailbox);
        }

        let text = request.text.clone().filter(|t| !t.is_empty());
        let html = request.html.clone().filter(|h| !h.is_empty());

        let mut attachments = Vec::new();
        for attachment in request.attachments.as_deref().unwrap_or_default() {
            attachments.push(load_attachment(attachment).await?);
        }

        let email = match (text, html, attachments.is_empty()) {
            (Some(text), Some(html), true) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))?
            }
            (Some(text), None, true) => builder.singlepart(SinglePart::plain(text))?,
            (None, Some(html), true) => builder.singlepart(SinglePart::html(html))?,
            (text, html, false) => {
                let mut mixed = match (text, html) {
                    (Some(text), Some(html)) => MultiPart::mixed()
                        .multipart(MultiPart::alternative_plain_html(text, html)),
                    (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text)),
                    (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html)),
                    (None, None) => return Err(missing_body()),
                };
                for part in attachments {
                    mixed = mixed.singlepart(part);
                }
                builder.multipart(mixed)?
            }
            (None, None, true) => return Err(missing_body()),
        };

        Ok((email, message_id))
    }
}

#[async_trait]
impl<T> Mailer for MailClient<T>
where
    T: AsyncTransport + Send + Sync + 'static,
    T::Error: Display,
{
    /// Failures are returned in the result, never as an error.
    async fn send(&self, request: &MailRequest) -> MailResult {
        match self.try_send(request).await {
            Ok(message_id) => MailResult::sent(message_id),
            Err(e) => {
                tracing::error!("Failed to send email: {e}");
                MailResult::failed("send failed", e.to_string())
            }
        }
    }
}

fn missing_body() -> SendError {
    ValidationError::MissingField("text or html".to_string()).into()
}

async fn load_attachment(attachment: &AttachmentRequest) -> Result<SinglePart, SendError> {
    let filename = attachment.filename.clone().unwrap_or_default();
    let path = attachment.path.as_deref().filter(|p| !p.is_empty());

    let body = match (path, attachment.content.as_deref()) {
        (Some(path), _) => tokio::fs::read(path)
            .await
            .map_err(|e| SendError::AttachmentRead(filename.clone(), e))?,
        (None, Some(content)) if is_base64(attachment.encoding.as_deref()) => STANDARD
            .decode(content.trim())
            .map_err(|e| SendError::AttachmentDecode(filename.clone(), e))?,
        (None, Some(content)) => content.as_bytes().to_vec(),
        (None, None) => {
            return Err(ValidationError::MissingField(format!("{filename}: path or content")).into());
        }
    };

    let mime = attachment
        .content_type
        .as_deref()
        .unwrap_or_else(|| guess_content_type(&filename));
    let content_type = ContentType::parse(mime)
        .map_err(|_| SendError::ContentType(mime.to_string(), filename.clone()))?;

    Ok(Attachment::new(filename).body(body, content_type))
}

fn is_base64(encoding: Option<&str>) -> bool {
    encoding.is_some_and(|e| e.eq_ignore_ascii_case("base64"))
}

fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
