//! SMTP command parsing and reply formatting.
//!
//! Only the verbs the sink reacts to are distinguished; envelope addresses
//! in MAIL and RCPT are deliberately not parsed, they are never consulted.

/// One client command line, already stripped of its CRLF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    /// `AUTH PLAIN`, with the optional inline initial response.
    AuthPlain(Option<String>),
    /// `AUTH` with any other mechanism name.
    AuthOther(String),
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Vrfy,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((v, r)) => (v, r.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_uppercase().as_str() {
        "HELO" => Command::Helo(rest.to_string()),
        "EHLO" => Command::Ehlo(rest.to_string()),
        "AUTH" => parse_auth(rest),
        "MAIL" => Command::Mail,
        "RCPT" => Command::Rcpt,
        "DATA" => Command::Data,
        "RSET" => Command::Rset,
        "NOOP" => Command::Noop,
        "VRFY" => Command::Vrfy,
        "QUIT" => Command::Quit,
        _ => Command::Unknown(verb.to_string()),
    }
}

fn parse_auth(rest: &str) -> Command {
    let (mechanism, initial) = match rest.split_once(char::is_whitespace) {
        Some((m, i)) => (m, Some(i.trim().to_string())),
        None => (rest, None),
    };
    if mechanism.eq_ignore_ascii_case("PLAIN") {
        Command::AuthPlain(initial)
    } else {
        Command::AuthOther(mechanism.to_string())
    }
}

/// One server reply, possibly spanning several lines with the usual
/// `250-...` continuation rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i + 1 == self.lines.len() { ' ' } else { '-' };
            out.push_str(&format!("{}{}{}\r\n", self.code, sep, line));
        }
        out
    }
}
