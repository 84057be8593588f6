//! Owned XML tree for mannequin asset files.
//!
//! The animation database code never talks to a parser directly. It reads a
//! file into an [`XmlNode`], walks and edits the tree through a handful of
//! accessors, and writes the tree back out:
//!
//! ```
//! use mannequin_xml::XmlNode;
//!
//! let mut root = XmlNode::new("AnimDB");
//! root.set_attr("FragDef", "Animations/Mannequin/ADB/FragmentIds.xml");
//! root.create_child("FragmentList");
//!
//! let text = root.to_xml_string();
//! let parsed = mannequin_xml::parse_str(&text).unwrap();
//! assert_eq!(parsed, root);
//! ```
//!
//! Parsing is backed by `quick-xml`. Only elements, attributes and text are
//! kept; comments, processing instructions and the XML declaration are dropped.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while reading, writing or interpreting a document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed xml: {0}")]
    Malformed(String),
    #[error("invalid value '{value}' for attribute '{name}' on <{tag}>")]
    InvalidAttribute {
        tag: String,
        name: String,
        value: String,
    },
}

/// A single element: tag, ordered attributes, child elements and text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlNode {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Case-insensitive tag comparison.
    #[inline]
    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    #[inline]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value, treating a missing attribute as the empty string.
    #[inline]
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    #[inline]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Parse an attribute into `T`.
    ///
    /// Returns `Ok(None)` if the attribute is absent and an
    /// [`XmlError::InvalidAttribute`] if it is present but does not parse.
    pub fn parse_attr<T: FromStr>(&self, name: &str) -> Result<Option<T>, XmlError> {
        let Some(raw) = self.attr(name) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| self.invalid_attr(name, raw))
    }

    /// Boolean attribute accepting `true/false` and `1/0`.
    pub fn bool_attr(&self, name: &str) -> Result<Option<bool>, XmlError> {
        match self.attr(name).map(str::trim) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
            Some(v) => Err(self.invalid_attr(name, v)),
        }
    }

    /// Set (or overwrite) an attribute, keeping insertion order.
    pub fn set_attr(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn invalid_attr(&self, name: &str, value: &str) -> XmlError {
        XmlError::InvalidAttribute {
            tag: self.tag.clone(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    // =========================================================================
    // Children
    // =========================================================================

    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut [XmlNode] {
        &mut self.children
    }

    #[inline]
    pub fn child(&self, index: usize) -> Option<&XmlNode> {
        self.children.get(index)
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// First child with the given tag (case-insensitive).
    pub fn find_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.is(tag))
    }

    pub fn find_child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|c| c.is(tag))
    }

    /// All children with the given tag (case-insensitive).
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.is(tag))
    }

    /// Append an existing node and return a handle to it.
    pub fn add_child(&mut self, node: XmlNode) -> &mut XmlNode {
        self.children.push(node);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append a new empty element.
    pub fn create_child(&mut self, tag: impl Into<String>) -> &mut XmlNode {
        self.add_child(XmlNode::new(tag))
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    pub fn with_attr(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder form of [`add_child`](Self::add_child).
    pub fn with_child(mut self, node: XmlNode) -> Self {
        self.children.push(node);
        self
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Serialize with two-space indentation.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    /// Write the document to disk, creating parent directories as needed.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), XmlError> {
        let path = path.as_ref();
        let write_err = |source| XmlError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.to_xml_string()).map_err(write_err)
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}<{}", self.tag);
        for (key, value) in &self.attrs {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>\n");
            return;
        }

        out.push('>');
        if self.children.is_empty() {
            let _ = writeln!(out, "{}</{}>", escape(self.text.as_str()), self.tag);
            return;
        }

        out.push('\n');
        if !self.text.is_empty() {
            let _ = writeln!(out, "{indent}  {}", escape(self.text.as_str()));
        }
        for child in &self.children {
            child.write_into(out, depth + 1);
        }
        let _ = writeln!(out, "{indent}</{}>", self.tag);
    }
}

// =============================================================================
// Input
// =============================================================================

/// Parse a document held in memory.
pub fn parse_str(content: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            XmlError::Malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let node = element_from(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Malformed(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or_else(|| XmlError::Malformed("document has no root element".into()))
}

/// Read and parse a document from disk.
pub fn read_file(path: impl AsRef<Path>) -> Result<XmlNode, XmlError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| XmlError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content)
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Malformed(e.to_string()))?
        .to_string();
    let mut node = XmlNode::new(tag);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(XmlError::Malformed(format!(
            "second root element <{}>",
            node.tag
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
