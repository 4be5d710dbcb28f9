//! Outbound message model and its `sendMail` payload.

// self
use crate::{_prelude::*, error::DeliveryError};

/// File attached to an outbound message. Attachments are rejected before any network call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
	/// File name presented to recipients.
	pub filename: String,
	/// MIME type.
	pub content_type: String,
	/// Raw content.
	pub data: Vec<u8>,
}

/// Message handed to a [`MailTransport`](crate::transport::MailTransport).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundMessage {
	/// Subject line.
	pub subject: String,
	/// Plain-text body.
	pub body: Option<String>,
	/// HTML body, preferred over `body` when both are set.
	pub html: Option<String>,
	/// Primary recipients.
	pub to: Vec<String>,
	/// Carbon-copy recipients.
	pub cc: Vec<String>,
	/// Blind carbon-copy recipients.
	pub bcc: Vec<String>,
	/// Reply-to addresses.
	pub reply_to: Vec<String>,
	/// Envelope sender supplied by the host.
	pub sender: String,
	/// Attached files.
	pub attachments: Vec<Attachment>,
}
impl OutboundMessage {
	/// Creates a message with the given subject and sender.
	pub fn new(subject: impl Into<String>, sender: impl Into<String>) -> Self {
		Self { subject: subject.into(), sender: sender.into(), ..Default::default() }
	}

	/// Adds a primary recipient.
	pub fn with_to(mut self, address: impl Into<String>) -> Self {
		self.to.push(address.into());

		self
	}

	/// Adds a carbon-copy recipient.
	pub fn with_cc(mut self, address: impl Into<String>) -> Self {
		self.cc.push(address.into());

		self
	}

	/// Adds a blind carbon-copy recipient.
	pub fn with_bcc(mut self, address: impl Into<String>) -> Self {
		self.bcc.push(address.into());

		self
	}

	/// Adds a reply-to address.
	pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
		self.reply_to.push(address.into());

		self
	}

	/// Sets the plain-text body.
	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Sets the HTML body.
	pub fn with_html(mut self, html: impl Into<String>) -> Self {
		self.html = Some(html.into());

		self
	}

	/// Attaches a file.
	pub fn with_attachment(mut self, attachment: Attachment) -> Self {
		self.attachments.push(attachment);

		self
	}

	/// Number of addressed recipients across to/cc/bcc.
	pub fn recipient_count(&self) -> usize {
		self.to.len() + self.cc.len() + self.bcc.len()
	}

	/// Rejects messages that cannot be delivered, in the order recipients, sender, header
	/// injection, attachments.
	pub fn check(&self) -> Result<(), DeliveryError> {
		if self.recipient_count() == 0 {
			return Err(DeliveryError::NoRecipients);
		}
		if self.sender.trim().is_empty() {
			return Err(DeliveryError::MissingSender);
		}

		let headers = [
			("subject", std::slice::from_ref(&self.subject)),
			("sender", std::slice::from_ref(&self.sender)),
			("recipients", self.to.as_slice()),
			("recipients", self.cc.as_slice()),
			("recipients", self.bcc.as_slice()),
			("reply-to", self.reply_to.as_slice()),
		];

		for (field, values) in headers {
			if values.iter().any(|value| value.contains(['\r', '\n'])) {
				return Err(DeliveryError::BadHeader { field });
			}
		}

		if !self.attachments.is_empty() {
			return Err(DeliveryError::AttachmentsUnsupported { subject: self.subject.clone() });
		}

		Ok(())
	}

	/// Builds the `sendMail` request body, sent from `sender`.
	pub fn payload<'a>(&'a self, sender: &'a str) -> SendMailPayload<'a> {
		let (content_type, content) = match (&self.html, &self.body) {
			(Some(html), _) => ("HTML", html.as_str()),
			(None, body) => ("Text", body.as_deref().unwrap_or_default()),
		};

		SendMailPayload {
			message: GraphMessage {
				subject: &self.subject,
				body: ItemBody { content_type, content },
				to_recipients: recipients(&self.to),
				cc_recipients: recipients(&self.cc),
				bcc_recipients: recipients(&self.bcc),
				from: Recipient::new(sender),
				reply_to: recipients(&self.reply_to),
			},
			save_to_sent_items: false,
		}
	}
}

/// `sendMail` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailPayload<'a> {
	message: GraphMessage<'a>,
	save_to_sent_items: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage<'a> {
	subject: &'a str,
	body: ItemBody<'a>,
	to_recipients: Vec<Recipient<'a>>,
	cc_recipients: Vec<Recipient<'a>>,
	bcc_recipients: Vec<Recipient<'a>>,
	from: Recipient<'a>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	reply_to: Vec<Recipient<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody<'a> {
	content_type: &'static str,
	content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
	email_address: EmailAddress<'a>,
}
impl<'a> Recipient<'a> {
	fn new(address: &'a str) -> Self {
		Self { email_address: EmailAddress { address } }
	}
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
	address: &'a str,
}

fn recipients(addresses: &[String]) -> Vec<Recipient<'_>> {
	addresses.iter().map(|address| Recipient::new(address)).collect()
}
