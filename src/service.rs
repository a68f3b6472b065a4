use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};

use std::sync::Arc;

use crate::{
    config::Config,
    dto::{Endpoints, HealthResponse, MailRequest, MailResult, ServiceInfo},
    mailer::{ConfigError, MailClient, Mailer},
};

/// Builds a fresh submission client for every request.
type Connector = dyn Fn(&Config) -> Result<Box<dyn Mailer>, ConfigError> + Send + Sync;

pub struct EmailService {
    config: Arc<Config>,
    connector: Box<Connector>,
}

impl EmailService {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_connector(config, |cfg| {
            MailClient::connect(cfg).map(|client| Box::new(client) as Box<dyn Mailer>)
        })
    }

    pub fn with_connector<F>(config: Arc<Config>, connector: F) -> Self
    where
        F: Fn(&Config) -> Result<Box<dyn Mailer>, ConfigError> + Send + Sync + 'static,
    {
        Self {
            config,
            connector: Box::new(connector),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates the request, submits it and picks the HTTP status for the
    /// outcome.
    pub async fn handle(&self, request: MailRequest) -> (StatusCode, MailResult) {
        if let Err(e) = request.validate() {
            tracing::warn!("Rejected send request: {e}");
            return (StatusCode::BAD_REQUEST, MailResult::invalid(&e));
        }

        let client = match (self.connector)(&self.config) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to create SMTP client: {e}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    MailResult::failed("internal error", e.to_string()),
                );
            }
        };

        let result = client.send(&request).await;
        let status = if result.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, result)
    }

    /// Diagnostic check of the SMTP account, never used on the request path.
    pub async fn verify_connection(&self) -> bool {
        match MailClient::connect(&self.config) {
            Ok(client) => client.verify_connection().await,
            Err(e) => {
                tracing::error!("Cannot verify SMTP connection: {e}");
                false
            }
        }
    }

    pub fn health() -> HealthResponse {
        HealthResponse {
            success: true,
            message: "mail service is running".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn info() -> ServiceInfo {
        ServiceInfo {
            success: true,
            message: "QQ Mail relay service".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints: Endpoints {
                health: "/api/health".to_string(),
                send_email: "POST /api/send-email".to_string(),
            },
        }
    }
}
