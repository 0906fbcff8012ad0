use lettre::address::AddressError;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Delivers password-reset codes.
///
/// Without SMTP credentials the mailer only logs what it would have sent, which
/// keeps local development and the test suite free of a mail server.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Log,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mailer::Smtp { from, .. } => f.debug_struct("Smtp").field("from", from).finish(),
            Mailer::Log => f.write_str("Log"),
        }
    }
}

impl Mailer {
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let (Some(user), Some(pass)) = (&config.email_user, &config.email_pass) else {
            log::warn!("EMAIL_USER/EMAIL_PASS not set, reset codes will only be logged");
            return Ok(Mailer::Log);
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .credentials(Credentials::new(user.clone(), pass.clone()))
            .build();
        let from = Mailbox::new(Some(config.email_from_name.clone()), user.parse()?);
        Ok(Mailer::Smtp { transport, from })
    }

    pub async fn send_reset_code(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<(), MailError> {
        match self {
            Mailer::Smtp { transport, from } => {
                let message = reset_code_message(from.clone(), to.parse()?, code, ttl_minutes)?;
                transport.send(message).await?;
                log::info!("sent reset code to {}", to);
            }
            Mailer::Log => {
                log::info!("reset code for {}: {} (valid {} minutes)", to, code, ttl_minutes);
            }
        }
        Ok(())
    }
}

fn reset_code_message(
    from: Mailbox,
    to: Mailbox,
    code: &str,
    ttl_minutes: i64,
) -> Result<Message, MailError> {
    let html = format!(
        "<h1>Password reset</h1>\n\
         <p>Your reset code is: <strong>{}</strong></p>\n\
         <p>It expires in {} minutes.</p>\n\
         <p>If you did not ask for a reset, ignore this email.</p>\n",
        code, ttl_minutes
    );
    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject("Password Reset Request")
        .header(ContentType::TEXT_HTML)
        .body(html)?)
}
