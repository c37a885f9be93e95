use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::error::{InvalidInputError, ReportError, SanplanError, SanplanResultExt};

use super::{Document, NodeId};

/// Builds a [`Document`] from XML text. Comments, processing instructions and
/// the declaration are dropped.
pub(super) fn parse(text: &str) -> Result<Document, SanplanError> {
    let mut reader = Reader::from_str(text);
    let mut document = Document::default();
    let mut open: Vec<NodeId> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .structured(InvalidInputError::ParseProject)
            .message(format!(
                "Malformed XML near byte {}",
                reader.buffer_position()
            ))?;

        match event {
            Event::Start(element) => {
                let id = push_element(&mut document, &open, &element)?;
                open.push(id);
            }
            Event::Empty(element) => {
                push_element(&mut document, &open, &element)?;
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(content) => {
                if let Some(current) = open.last() {
                    let content = content
                        .unescape()
                        .structured(InvalidInputError::ParseProject)
                        .message("Failed to unescape character data")?;
                    document.append_text(*current, &content);
                }
            }
            Event::CData(content) => {
                if let Some(current) = open.last() {
                    let content = content.into_inner();
                    document.append_text(*current, &String::from_utf8_lossy(&content));
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(SanplanError::new(InvalidInputError::ParseProject)).message(format!(
            "Element '{}' is never closed",
            document.tag(*unclosed)
        ));
    }

    if document.root().is_none() {
        return Err(SanplanError::new(InvalidInputError::ParseProject))
            .message("Document has no root element");
    }

    Ok(document)
}

fn push_element(
    document: &mut Document,
    open: &[NodeId],
    element: &BytesStart,
) -> Result<NodeId, SanplanError> {
    let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let parent = open.last().copied();
    if parent.is_none() && document.root().is_some() {
        return Err(SanplanError::new(InvalidInputError::ParseProject)).message(format!(
            "Element '{tag}' is outside of the root element"
        ));
    }

    let mut attributes = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute
            .structured(InvalidInputError::ParseProject)
            .message(format!("Invalid attribute on element '{tag}'"))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .structured(InvalidInputError::ParseProject)
            .message(format!("Invalid value for attribute '{key}' on '{tag}'"))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(document.push_element(parent, &tag, attributes))
}
