//! Transactional email

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("invalid address {0:?}: {1}")]
    Address(String, #[source] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A rendered message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// Sent after registration; carries the activation token.
#[derive(Debug, Clone)]
pub struct WelcomeEmail {
    pub user_id: i64,
    pub activation_token: String,
}

impl WelcomeEmail {
    pub fn render(&self) -> Email {
        let subject = "Welcome to the item service!".to_string();

        let plain_body = format!(
            "Hi,\n\n\
             Thanks for signing up. Your user ID number is {id}.\n\n\
             Please send a request to the `PUT /v1/users/activated` endpoint with the \
             following JSON body to activate your account:\n\n\
             {{\"token\": \"{token}\"}}\n\n\
             Please note that this is a one-time use token and it will expire in 3 days.\n\n\
             Thanks,\n\nThe Item Service Team\n",
            id = self.user_id,
            token = self.activation_token,
        );

        let html_body = format!(
            "<!doctype html>\n<html>\n<head>\n\
             <meta name=\"viewport\" content=\"width=device-width\" />\n\
             <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n\
             </head>\n<body>\n\
             <p>Hi,</p>\n\
             <p>Thanks for signing up. Your user ID number is {id}.</p>\n\
             <p>Please send a request to the <code>PUT /v1/users/activated</code> endpoint \
             with the following JSON body to activate your account:</p>\n\
             <pre><code>{{\"token\": \"{token}\"}}</code></pre>\n\
             <p>Please note that this is a one-time use token and it will expire in 3 days.</p>\n\
             <p>Thanks,</p>\n<p>The Item Service Team</p>\n\
             </body>\n</html>\n",
            id = self.user_id,
            token = self.activation_token,
        );

        Email {
            subject,
            plain_body,
            html_body,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, email: Email) -> Result<(), MailerError>;
}

/// SMTP connection settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
}

/// Sends mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let sender = config
            .sender
            .parse()
            .map_err(|e| MailerError::Address(config.sender.clone(), e))?;

        let transport = if config.username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(SEND_TIMEOUT))
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .port(config.port)
                .credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ))
                .timeout(Some(SEND_TIMEOUT))
                .build()
        };

        Ok(Self { transport, sender })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, recipient: &str, email: Email) -> Result<(), MailerError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| MailerError::Address(recipient.to_string(), e))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.plain_body,
                email.html_body,
            ))?;

        let mut attempt = 1;
        loop {
            match self.transport.send(message.clone()).await {
                Ok(_) => return Ok(()),
                Err(err) if attempt < SEND_ATTEMPTS => {
                    warn!(attempt, error = %err, "email send failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
