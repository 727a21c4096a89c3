//! Minimal element tree built from `quick-xml` events.
//!
//! XML-RPC documents are small and strictly nested, so the codec reads the
//! whole body into a tree first and interprets it afterwards. Text nodes are
//! kept verbatim because untyped `<value>` content is significant whitespace.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::codec::DecodeError;

/// Deepest element nesting a document may use.
///
/// Decoding and dropping the tree both recurse per level, so the limit also
/// bounds stack use.
pub(super) const MAX_DEPTH: usize = 256;

/// An element with its child nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Element {
    name: String,
    children: Vec<Node>,
}

/// Element content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    pub(super) fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(super) fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given name.
    pub(super) fn child(&self, name: &str) -> Option<&Self> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated text of the direct text children.
    pub(super) fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

/// Parses a complete document and returns its root element.
pub(super) fn parse_document(body: &[u8]) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_reader(body);
    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|error| {
            DecodeError::malformed(format!(
                "{error} (near byte {})",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => {
                ensure_single_root(root.as_ref())?;
                if open.len() >= MAX_DEPTH {
                    return Err(DecodeError::malformed(format!(
                        "document nests deeper than {MAX_DEPTH} elements"
                    )));
                }
                open.push(Element::new(element_name(&start)?));
            }
            Event::Empty(start) => {
                ensure_single_root(root.as_ref())?;
                let element = Element::new(element_name(&start)?);
                attach(element, &mut open, &mut root);
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| DecodeError::malformed("unexpected closing tag"))?;
                attach(element, &mut open, &mut root);
            }
            Event::Text(raw) => {
                let text = raw
                    .unescape()
                    .map_err(|error| DecodeError::malformed(error.to_string()))?;
                push_text(text.into_owned(), &mut open)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|error| DecodeError::malformed(error.to_string()))?;
                push_text(text, &mut open)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !open.is_empty() {
        return Err(DecodeError::malformed("document ends inside an element"));
    }
    root.ok_or_else(|| DecodeError::malformed("document has no root element"))
}

fn element_name(start: &BytesStart<'_>) -> Result<String, DecodeError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_owned)
        .map_err(|error| DecodeError::malformed(error.to_string()))
}

fn ensure_single_root(root: Option<&Element>) -> Result<(), DecodeError> {
    match root {
        Some(_) => Err(DecodeError::malformed("content after the root element")),
        None => Ok(()),
    }
}

fn attach(element: Element, open: &mut [Element], root: &mut Option<Element>) {
    match open.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(text: String, open: &mut [Element]) -> Result<(), DecodeError> {
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(DecodeError::malformed("text outside the root element")),
    }
}
