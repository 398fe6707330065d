//! Aggregated message contents, computed by walking the MIME part tree.

use mail_parser::{Message, MessagePartId, MessageParser, PartType};

use crate::view::ParseError;

/// Everything required to render the contents of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentInfo {
    /// HTML contents. `None` means the message has no HTML parts.
    pub html: Option<String>,
    /// Plain-text contents. `None` means the message has no text parts.
    pub plain: Option<String>,
    /// The raw message, headers included.
    pub raw: String,
}

/// Extracts the aggregated contents of a message from its raw bytes.
///
/// Multiple text parts of the same kind are concatenated in traversal
/// order. A message with neither HTML nor plain-text parts gets an empty
/// plain-text body, so there is always something to render.
pub fn read_contents(raw: &[u8]) -> Result<ContentInfo, ParseError> {
    let msg = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Message)?;

    let (mut plain, html) = walk(&msg)?;

    if html.is_none() && plain.is_none() {
        plain = Some(String::new());
    }

    Ok(ContentInfo {
        html,
        plain,
        raw: String::from_utf8_lossy(raw).into_owned(),
    })
}

/// One level of multipart nesting: the sibling list and the position of
/// the next sibling to visit.
struct Level<'a> {
    children: &'a [MessagePartId],
    index: usize,
}

/// Depth-first traversal of the part tree, iterative on purpose: the
/// nesting depth is attacker-controlled, so the pending multiparts live on
/// an explicit stack instead of the call stack.
///
/// Returns the accumulated `(plain, html)` contents. Media types other
/// than `text/plain` and `text/html` are skipped, including nested
/// `message/rfc822` parts.
fn walk(msg: &Message) -> Result<(Option<String>, Option<String>), ParseError> {
    let mut plain: Option<String> = None;
    let mut html: Option<String> = None;
    let mut stack: Vec<Level> = Vec::new();

    // (part, its sibling position); the root is its own only sibling.
    let mut current: Option<(MessagePartId, usize)> = Some((0, 0));

    loop {
        if let Some((part_id, index)) = current.take() {
            let part = msg.part(part_id).ok_or(ParseError::Structure {
                depth: stack.len(),
                index,
            })?;

            match &part.body {
                PartType::Multipart(children) => stack.push(Level { children, index: 0 }),
                PartType::Text(text) => append(&mut plain, text),
                PartType::Html(text) => append(&mut html, text),
                _ => {}
            }
        }

        match stack.last_mut() {
            Some(level) => {
                if level.index < level.children.len() {
                    current = Some((level.children[level.index], level.index));
                    level.index += 1;
                } else {
                    stack.pop();
                }
            }
            None => break,
        }
    }

    Ok((plain, html))
}

fn append(slot: &mut Option<String>, chunk: &str) {
    slot.get_or_insert_with(String::new).push_str(chunk);
}
