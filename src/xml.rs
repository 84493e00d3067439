//! Generic attribute tree built from X4 XML documents
//!
//! The extractors never look at raw XML events; they walk [`Element`]
//! values instead. Text content is dropped since none of the game data
//! read here lives in text nodes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};

use crate::error::{CatalogueError, Result};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("document has no root element")]
    Empty,

    #[error("closing tag without matching opening tag")]
    Unbalanced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attribute value, trimmed. Empty values count as absent.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element with this name anywhere below `self`, depth first.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every element with this name below `self`, in document order.
    pub fn descendants_named(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_named(self, name, &mut out);
        out
    }
}

fn collect_named<'a>(el: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in &el.children {
        if child.name == name {
            out.push(child);
        }
        collect_named(child, name, out);
    }
}

fn element_from(start: &BytesStart<'_>) -> std::result::Result<Element, ParseError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.insert(key, value);
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    } else if root.is_none() {
        *root = Some(el);
    }
}

/// Parse a whole document into its root element.
pub fn parse_str(text: &str) -> std::result::Result<Element, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let el = element_from(&start)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack.pop().ok_or(ParseError::Unbalanced)?;
                attach(&mut stack, &mut root, el);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or(ParseError::Empty)
}

/// Read and parse one file, mapping failures to [`CatalogueError`].
pub fn parse_file(path: &Path) -> Result<Element> {
    let bytes = fs::read(path).map_err(|source| CatalogueError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|e| CatalogueError::Xml {
        path: path.to_path_buf(),
        detail: format!("not valid UTF-8: {e}"),
    })?;
    parse_str(&text).map_err(|e| CatalogueError::Xml {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
