//! Transactional email: OTP codes and order confirmations.
//!
//! SMTP delivery uses lettre. Without SMTP settings the log mailer is used,
//! which only records the message through tracing.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use thiserror::Error;

use crate::{config::SmtpConfig, domain::otp::OtpPurpose};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "smtp not configured, email logged only"
        );
        Ok(())
    }
}

pub fn otp_email(to: &str, code: &str, purpose: OtpPurpose, ttl_minutes: i64) -> OutgoingEmail {
    let subject = match purpose {
        OtpPurpose::Login => "Giriş doğrulama kodunuz",
        OtpPurpose::Register => "Üyelik doğrulama kodunuz",
        OtpPurpose::PasswordReset => "Şifre sıfırlama kodunuz",
    };
    OutgoingEmail {
        to: to.to_string(),
        subject: subject.to_string(),
        body: format!(
            "Doğrulama kodunuz: {code}\n\nKod {ttl_minutes} dakika boyunca geçerlidir. \
             Bu isteği siz yapmadıysanız bu e-postayı dikkate almayın."
        ),
    }
}

pub fn order_confirmation_email(
    to: &str,
    invoice_number: &str,
    total_amount: i64,
    delivery: &str,
    bank_instructions: Option<&str>,
) -> OutgoingEmail {
    let mut body = format!(
        "Siparişiniz alındı.\n\nSipariş no: {invoice_number}\nToplam: {}\nTeslimat: {delivery}\n",
        format_try(total_amount)
    );
    if let Some(instructions) = bank_instructions {
        body.push('\n');
        body.push_str(instructions);
        body.push('\n');
    }
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Siparişiniz alındı ({invoice_number})"),
        body,
    }
}

/// Renders kuruş as `1.234,50 TL`.
pub fn format_try(kurus: i64) -> String {
    let sign = if kurus < 0 { "-" } else { "" };
    let abs = kurus.unsigned_abs();
    let lira = (abs / 100).to_string();
    let mut grouped = String::with_capacity(lira.len() + lira.len() / 3);
    for (i, ch) in lira.chars().enumerate() {
        if i > 0 && (lira.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped},{:02} TL", abs % 100)
}
