use chrono::Utc;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::MailConfig;
use crate::logger::{Level, Logger};
use crate::shell::{program_available, run_with_input_bounded, BoundedExit};

/// Operator addresses an alert is sent to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Recipients {
    pub(crate) to: Vec<String>,
    pub(crate) cc: Vec<String>,
    pub(crate) bcc: Vec<String>,
}

impl Recipients {
    pub(crate) fn from_config(config: &MailConfig) -> Self {
        Self {
            to: config.to.clone(),
            cc: config.cc.clone(),
            bcc: config.bcc.clone(),
        }
    }
}

/// One operator alert. Has no identity beyond the send attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Mail {
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) to: Vec<String>,
    pub(crate) cc: Vec<String>,
    pub(crate) bcc: Vec<String>,
}

impl Mail {
    pub(crate) fn new(subject: &str, body: &str, recipients: &Recipients) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
            to: recipients.to.clone(),
            cc: recipients.cc.clone(),
            bcc: recipients.bcc.clone(),
        }
    }

    pub(crate) fn has_recipient(&self) -> bool {
        [&self.to, &self.cc, &self.bcc]
            .iter()
            .any(|list| list.iter().any(|address| !address.trim().is_empty()))
    }

    pub(crate) fn compose(&self) -> String {
        let mut message = String::new();
        for (header, list) in [("To", &self.to), ("Cc", &self.cc), ("Bcc", &self.bcc)] {
            if !list.is_empty() {
                message.push_str(&format!("{}: {}\n", header, list.join(", ")));
            }
        }
        message.push_str(&format!("Subject: {}\n\n{}\n", self.subject, self.body));
        message
    }
}

/// Why a message went to the fallback log instead of the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("mail transport {command:?} is not available")]
    Unavailable { command: String },
    #[error("mail transport exited with code {code}")]
    ExitCode { code: i32 },
    #[error("mail transport did not take the whole message: {message}")]
    InputUnread { message: String },
    #[error("mail transport gave no confirmation within {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },
    #[error("mail transport failed: {message}")]
    Launch { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    FallbackLogged { reason: TransportError },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum NotifyError {
    #[error("notification {subject:?} has no recipient")]
    RecipientMissing { subject: String },
    #[error("failed to append undelivered mail to {}: {source}", .path.display())]
    Fallback {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Seam between the status checker and whatever delivers alerts.
pub(crate) trait Notify {
    fn send(&self, mail: &Mail) -> Result<Delivery, NotifyError>;
}

impl<T: Notify + ?Sized> Notify for &T {
    fn send(&self, mail: &Mail) -> Result<Delivery, NotifyError> {
        (**self).send(mail)
    }
}

/// Delivers through an external mail command, or appends to a local log.
#[derive(Debug)]
pub(crate) struct MailNotifier<'a> {
    command: String,
    fallback_log: PathBuf,
    timeout: Duration,
    logger: &'a Logger,
}

impl<'a> MailNotifier<'a> {
    pub(crate) fn new(config: &MailConfig, logger: &'a Logger) -> Self {
        Self {
            command: config.command.clone(),
            fallback_log: config.fallback_log.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            logger,
        }
    }

    fn transmit(&self, message: &str) -> Result<(), TransportError> {
        if !program_available(&self.command) {
            return Err(TransportError::Unavailable {
                command: self.command.clone(),
            });
        }
        match run_with_input_bounded(&self.command, "mail", message, self.timeout, self.logger) {
            Ok(BoundedExit::Exited(0)) => Ok(()),
            Ok(BoundedExit::Exited(code)) => Err(TransportError::ExitCode { code }),
            Ok(BoundedExit::InputUnread(message)) => {
                Err(TransportError::InputUnread { message })
            }
            Ok(BoundedExit::TimedOut) => Err(TransportError::TimedOut {
                timeout_secs: self.timeout.as_secs(),
            }),
            Err(message) => Err(TransportError::Launch { message }),
        }
    }

    fn append_fallback(&self, message: &str, reason: &TransportError) -> Result<(), NotifyError> {
        let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let entry = format!("--- {} undelivered ({}) ---\n{}\n", ts, reason, message);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.fallback_log)
            .and_then(|mut file| file.write_all(entry.as_bytes()))
            .map_err(|source| NotifyError::Fallback {
                path: self.fallback_log.clone(),
                source,
            })
    }
}

impl Notify for MailNotifier<'_> {
    fn send(&self, mail: &Mail) -> Result<Delivery, NotifyError> {
        if !mail.has_recipient() {
            return Err(NotifyError::RecipientMissing {
                subject: mail.subject.clone(),
            });
        }

        let message = mail.compose();
        match self.transmit(&message) {
            Ok(()) => {
                self.logger
                    .log_transition(&format!("mail sent subject={}", mail.subject));
                Ok(Delivery::Sent)
            }
            Err(reason) => {
                self.append_fallback(&message, &reason)?;
                self.logger.output(
                    Level::Warning,
                    &format!(
                        "mail not delivered ({}); written to {}",
                        reason,
                        self.fallback_log.display()
                    ),
                );
                Ok(Delivery::FallbackLogged { reason })
            }
        }
    }
}
