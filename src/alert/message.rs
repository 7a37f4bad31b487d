//! Alert message composition and MIME rendering

use crate::context::AccountContext;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use std::path::Path;

/// Base64 line length required by RFC 2045
const BASE64_LINE: usize = 76;

/// Raw bytes per RFC 2047 encoded word, so a folded "Subject:" line stays
/// within 78 chars
const ENCODED_WORD_BYTES: usize = 39;

/// A file carried along with the alert
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Read a file for attaching. Missing or unreadable files yield `None`.
    pub async fn load(path: &Path) -> Option<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        match tokio::fs::read(path).await {
            Ok(data) => Some(Self { filename, data }),
            Err(e) => {
                tracing::warn!("Skipping alert attachment {:?}: {}", path, e);
                None
            }
        }
    }
}

/// A composed mail ready for a transport
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub date: DateTime<Local>,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl MailMessage {
    /// Build the "service account unavailable" alert
    pub fn unavailable(
        from: &str,
        to: &[String],
        context: &AccountContext,
        date: DateTime<Local>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_vec(),
            subject: format!(
                "[Service Account Alert]: Intersight Service Account {} is Unavailable",
                context.name
            ),
            date,
            html: unavailable_body(context, date),
            attachments,
        }
    }

    /// Render as a multipart/mixed RFC 5322 message using `boundary`
    pub fn to_mime(&self, boundary: &str) -> String {
        let mut out = String::new();
        let to: Vec<String> = self.to.iter().map(|a| header_text(a)).collect();
        out.push_str(&format!("From: {}\r\n", header_text(&self.from)));
        out.push_str(&format!("To: {}\r\n", to.join(", ")));
        out.push_str(&format!("Date: {}\r\n", self.date.to_rfc2822()));
        out.push_str(&format!("Subject: {}\r\n", encode_header(&header_text(&self.subject))));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        push_base64(&mut out, self.html.as_bytes());

        for attachment in &self.attachments {
            out.push_str(&format!("--{}\r\n", boundary));
            out.push_str("Content-Type: application/octet-stream\r\n");
            out.push_str("Content-Transfer-Encoding: base64\r\n");
            out.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
                attachment.filename.replace('"', "")
            ));
            push_base64(&mut out, &attachment.data);
        }

        out.push_str(&format!("--{}--\r\n", boundary));
        out
    }
}

/// Collapse control characters so a value cannot start a new header line
fn header_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// RFC 2047 B-encoding for non-ASCII header values
fn encode_header(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in s.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(chunk.as_bytes())));
    }
    // Folded continuation lines; whitespace between encoded words is dropped on decode
    words.join("\r\n ")
}

fn push_base64(out: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unavailable_body(context: &AccountContext, date: DateTime<Local>) -> String {
    let name = escape_html(&context.name);
    let session = escape_html(&context.session_id);
    let location = escape_html(&context.location);
    let when = date.format("%m/%d/%Y %H:%M:%S");

    let mut summary = String::new();
    for (label, value) in context.summary() {
        summary.push_str(&format!("{}: {}\n<br>\n", label, escape_html(value)));
    }

    format!(
        "<html>\n<body>\n\
<b>BRIEF SUMMARY ON AFFECTED SERVICE ACCOUNT:</b>\n<br>\n{summary}<br>\n\
<b>ISSUE:</b> Please be advised that on {when}, the Intersight service account named {name} \
did not pass the availability test for session ID #{session} located in {location}. \
Please directly check the Intersight service account at https://intersight.com to verify \
the account status and that all permitted users are present. See the attached files for \
additional details on the session and the service account.\n<br><br>\n\
<b>RESOLUTION:</b> Verify that the HyperFlex Edge cluster was actually assigned to the session, \
as the service account will not be assigned without a matching cluster. If the service account \
type, name, email, cluster and location in the above summary are blank, an oversubscription of \
resources has likely occurred. Other causes may be that an Intersight cloud service is down. \
Visit https://status.intersight.com to check the status of Intersight cloud services.\n\
</body>\n</html>\n"
    )
}
