//! Basic message information extracted from the Internet Message Format
//! headers (RFC 822 - RFC 2822 - RFC 5322).

use mail_parser::{Address, MessageParser};

use crate::view::ParseError;

/// Essential header fields, for listing messages without delving into the
/// depths of their body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicInfo {
    pub subject: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

/// Extracts basic information from the raw bytes of a message.
pub fn read_basic(raw: &[u8]) -> Result<BasicInfo, ParseError> {
    let msg = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Message)?;

    Ok(BasicInfo {
        subject: msg.subject().unwrap_or_default().to_string(),
        from: format_address_list(msg.from(), "From"),
        to: format_address_list(msg.to(), "To"),
    })
}

/// Renders an address list as `"name <addr>"`, or `"<addr>"` when the
/// display name is empty. A header that does not parse as an address list
/// yields an empty list, not a hard error.
fn format_address_list(list: Option<&Address>, header: &str) -> Vec<String> {
    let list = match list {
        Some(v) => v,
        None => {
            tracing::debug!(header, "header absent or not an address list");
            return Vec::new();
        }
    };

    let mut result = Vec::new();
    for addr in list.iter() {
        let address = match addr.address() {
            Some(a) => a,
            None => continue,
        };
        match addr.name() {
            Some(name) if !name.is_empty() => result.push(format!("{} <{}>", name, address)),
            _ => result.push(format!("<{}>", address)),
        }
    }
    result
}
