//! Outgoing messages and send receipts.

use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::transport::TransportError;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

/// An email message to send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingMessage {
    /// Account to send through; None uses the default binding.
    pub account_id: Option<AccountId>,
    /// Sender override; defaults to the sending account's email.
    pub from: Option<String>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Routes the message through a specific account.
    #[must_use]
    pub const fn via(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Overrides the sender address.
    #[must_use]
    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            content,
        });
        self
    }

    /// Returns true if at least one to/cc/bcc recipient is set.
    #[must_use]
    pub fn has_recipients(&self) -> bool {
        !(self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty())
    }

    /// Assembles the RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no recipients, an address does not
    /// parse, or an attachment has an invalid content type.
    pub fn to_email(
        &self,
        from: &str,
        message_id: &str,
    ) -> Result<lettre::Message, TransportError> {
        if !self.has_recipients() {
            return Err(TransportError::NoRecipients);
        }

        let mut builder = lettre::Message::builder()
            .from(from.parse::<Mailbox>()?)
            .subject(self.subject.clone())
            .message_id(Some(message_id.to_string()));

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
        }
        for addr in &self.to {
            builder = builder.to(addr.parse::<Mailbox>()?);
        }
        for addr in &self.cc {
            builder = builder.cc(addr.parse::<Mailbox>()?);
        }
        for addr in &self.bcc {
            builder = builder.bcc(addr.parse::<Mailbox>()?);
        }

        let email = match self.body()? {
            Body::Single(part) => builder.singlepart(part)?,
            Body::Multi(parts) => builder.multipart(parts)?,
        };
        Ok(email)
    }

    fn body(&self) -> Result<Body, TransportError> {
        let content = match (&self.text, &self.html) {
            (Some(text), Some(html)) => Body::Multi(MultiPart::alternative_plain_html(
                text.clone(),
                html.clone(),
            )),
            (None, Some(html)) => Body::Single(SinglePart::html(html.clone())),
            (text, None) => Body::Single(SinglePart::plain(text.clone().unwrap_or_default())),
        };

        if self.attachments.is_empty() {
            return Ok(content);
        }

        let mut mixed = match content {
            Body::Single(part) => MultiPart::mixed().singlepart(part),
            Body::Multi(parts) => MultiPart::mixed().multipart(parts),
        };
        for attachment in &self.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| TransportError::ContentType(attachment.content_type.clone()))?;
            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }
        Ok(Body::Multi(mixed))
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

/// Generates a `Message-ID` in the sender's domain.
#[must_use]
pub fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>'))
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{domain}>", Uuid::new_v4())
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    /// `Message-ID` header of the submitted message.
    pub message_id: String,
    /// Final server reply lines.
    pub response: Vec<String>,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn formatted(message: &OutgoingMessage) -> String {
        let email = message
            .to_email("sender@example.com", "<id-1@example.com>")
            .unwrap();
        String::from_utf8(email.formatted()).unwrap()
    }

    #[test]
    fn builder_collects_fields() {
        let message = OutgoingMessage::new("Quarterly report")
            .via(AccountId::new(3))
            .to("a@example.com")
            .cc("b@example.com")
            .bcc("c@example.com")
            .text("See attached.");
        assert_eq!(message.account_id, Some(AccountId::new(3)));
        assert_eq!(message.to, ["a@example.com"]);
        assert_eq!(message.cc, ["b@example.com"]);
        assert_eq!(message.bcc, ["c@example.com"]);
        assert!(message.has_recipients());
    }

    #[test]
    fn plain_message_headers() {
        let text = formatted(
            &OutgoingMessage::new("Hello")
                .to("rcpt@example.com")
                .reply_to("replies@example.com")
                .text("Hi there"),
        );
        assert!(text.contains("From: sender@example.com"));
        assert!(text.contains("To: rcpt@example.com"));
        assert!(text.contains("Reply-To: replies@example.com"));
        assert!(text.contains("Subject: Hello"));
        assert!(text.contains("Message-ID: <id-1@example.com>"));
        assert!(text.contains("Hi there"));
    }

    #[test]
    fn text_and_html_become_alternative() {
        let text = formatted(
            &OutgoingMessage::new("Both")
                .to("rcpt@example.com")
                .text("plain")
                .html("<p>rich</p>"),
        );
        assert!(text.contains("multipart/alternative"));
    }

    #[test]
    fn attachments_become_mixed() {
        let text = formatted(
            &OutgoingMessage::new("Files")
                .to("rcpt@example.com")
                .text("see file")
                .attach("notes.txt", "text/plain", b"line one".to_vec()),
        );
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("notes.txt"));
    }

    #[test]
    fn missing_recipients_rejected() {
        let err = OutgoingMessage::new("Nobody")
            .text("x")
            .to_email("sender@example.com", "<id@example.com>")
            .unwrap_err();
        assert!(matches!(err, TransportError::NoRecipients));
    }

    #[test]
    fn invalid_address_rejected() {
        let err = OutgoingMessage::new("Bad")
            .to("not an address")
            .to_email("sender@example.com", "<id@example.com>")
            .unwrap_err();
        assert!(matches!(err, TransportError::Address(_)));
    }

    #[test]
    fn invalid_content_type_rejected() {
        let err = OutgoingMessage::new("Bad attachment")
            .to("rcpt@example.com")
            .attach("x.bin", "not a mime type", vec![1, 2, 3])
            .to_email("sender@example.com", "<id@example.com>")
            .unwrap_err();
        assert!(matches!(err, TransportError::ContentType(_)));
    }

    #[test]
    fn message_id_uses_sender_domain() {
        let id = generate_message_id("ops@mail.example.com");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@mail.example.com>"));
        assert!(generate_message_id("").ends_with("@localhost>"));
        assert_ne!(
            generate_message_id("a@example.com"),
            generate_message_id("a@example.com")
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let message: OutgoingMessage =
            serde_json::from_str(r#"{"to":["a@example.com"],"subject":"Hi","account_id":4}"#)
                .unwrap();
        assert_eq!(message.account_id, Some(AccountId::new(4)));
        assert!(message.cc.is_empty());
        assert!(message.text.is_none());
    }
}
