//! Plain SMTP relay transport
//!
//! Speaks just enough SMTP (RFC 5321) to hand one message to an internal,
//! unauthenticated relay: greeting, EHLO/HELO, MAIL, RCPT, DATA, QUIT.

use super::message::MailMessage;
use super::MailTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// One SMTP reply: code plus the text of its last line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

/// Parse one reply line into (code, is_last, text)
pub fn parse_reply_line(line: &str) -> Option<(u16, bool, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() < 3 {
        return None;
    }
    let code: u16 = line.get(..3)?.parse().ok()?;
    let rest = &line[3..];
    let is_last = !rest.starts_with('-');
    let text = rest.get(1..).unwrap_or("").to_string();
    Some((code, is_last, text))
}

/// Escape lines starting with '.' and normalise line endings to CRLF
pub fn dot_stuff(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + 16);
    for line in data.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Check a mailbox before it is placed in a `MAIL FROM`/`RCPT TO` command
pub fn check_address(address: &str) -> Result<()> {
    if address.is_empty() {
        anyhow::bail!("Empty mail address");
    }
    if address
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || c == '<' || c == '>')
    {
        anyhow::bail!("Invalid mail address {:?}", address);
    }
    match address.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => anyhow::bail!("Invalid mail address {:?}", address),
    }
}

/// SMTP relay configuration
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    pub host: String,
    pub port: u16,
    pub helo_name: String,
    pub timeout: Duration,
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .context("Failed to read SMTP reply")?;
            if n == 0 {
                anyhow::bail!("SMTP server closed the connection");
            }
            let (code, is_last, text) = parse_reply_line(&line)
                .ok_or_else(|| anyhow::anyhow!("Malformed SMTP reply: {:?}", line.trim_end()))?;
            if is_last {
                return Ok(Reply { code, text });
            }
        }
    }

    async fn expect(&mut self, accepted: &[u16]) -> Result<Reply> {
        let reply = self.read_reply().await?;
        if !accepted.contains(&reply.code) {
            anyhow::bail!("Unexpected SMTP reply {} {}", reply.code, reply.text);
        }
        Ok(reply)
    }

    async fn command(&mut self, line: &str, accepted: &[u16]) -> Result<Reply> {
        tracing::trace!("SMTP > {}", line);
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .context("Failed to write SMTP command")?;
        self.expect(accepted).await
    }
}

impl SmtpRelay {
    async fn deliver(&self, message: &MailMessage, boundary: &str) -> Result<()> {
        check_address(&message.from)?;
        for rcpt in &message.to {
            check_address(rcpt)?;
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Unable to reach the SMTP server at {}:{}", self.host, self.port))?;
        let (read, write) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(read),
            writer: write,
        };

        session.expect(&[220]).await?;

        let ehlo = format!("EHLO {}", self.helo_name);
        if session.command(&ehlo, &[250]).await.is_err() {
            session
                .command(&format!("HELO {}", self.helo_name), &[250])
                .await?;
        }

        session
            .command(&format!("MAIL FROM:<{}>", message.from), &[250])
            .await?;
        for rcpt in &message.to {
            session
                .command(&format!("RCPT TO:<{}>", rcpt), &[250, 251])
                .await?;
        }

        session.command("DATA", &[354]).await?;
        let data = dot_stuff(&message.to_mime(boundary));
        session
            .writer
            .write_all(data.as_bytes())
            .await
            .context("Failed to write message data")?;
        session.command(".", &[250]).await?;

        // The message is accepted at this point; a failed QUIT does not matter.
        if let Err(e) = session.command("QUIT", &[221]).await {
            tracing::debug!("SMTP QUIT failed: {:#}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl MailTransport for SmtpRelay {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let boundary = format!("hxpolicy-{}", uuid::Uuid::new_v4().simple());
        tokio::time::timeout(self.timeout, self.deliver(message, &boundary))
            .await
            .map_err(|_| anyhow::anyhow!("SMTP dialog timed out after {:?}", self.timeout))?
    }
}
