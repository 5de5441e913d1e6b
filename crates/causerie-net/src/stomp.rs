//! Minimal STOMP 1.2 frame codec.
//!
//! Only the commands this client exchanges with the broker are modelled.
//! A frame is `COMMAND\nheader:value\n...\n\nbody\0`; a bare `\n` is a
//! heart-beat.  Header names and values are escaped on every frame except
//! `CONNECT`/`CONNECTED`, as the STOMP spec requires.

use std::fmt;

use crate::error::TransportError;

/// Frame commands used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
}

impl Command {
    fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(Command::Connect),
            "CONNECTED" => Some(Command::Connected),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "SEND" => Some(Command::Send),
            "MESSAGE" => Some(Command::Message),
            "ERROR" => Some(Command::Error),
            "DISCONNECT" => Some(Command::Disconnect),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire representation, NUL-terminated.
    pub fn encode(&self) -> String {
        let escaped = !matches!(self.command, Command::Connect | Command::Connected);
        let mut out = String::new();
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escaped {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one wire frame.  Returns `None` for a heart-beat.
    pub fn parse(raw: &str) -> Result<Option<Frame>, TransportError> {
        let raw = raw.trim_end_matches('\0');
        if raw.is_empty() || raw == "\n" || raw == "\r\n" {
            return Ok(None);
        }

        let (head, body) = match raw.split_once("\n\n") {
            Some(parts) => parts,
            None => {
                return Err(TransportError::MalformedFrame(
                    "missing header terminator".into(),
                ))
            }
        };

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| TransportError::MalformedFrame("empty frame".into()))?;
        let command = Command::parse(command_line.trim_end_matches('\r')).ok_or_else(|| {
            TransportError::MalformedFrame(format!("unknown command {command_line:?}"))
        })?;

        let escaped = !matches!(command, Command::Connect | Command::Connected);
        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                TransportError::MalformedFrame(format!("header without colon: {line:?}"))
            })?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_owned(),
        }))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::MalformedFrame(format!(
                    "invalid escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
