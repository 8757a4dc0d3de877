//! XML element tree and serialization helpers for package parts.
//!
//! XML parts hold their content as a parsed element tree rather than raw bytes,
//! so higher-level code can read and mutate the document before it is serialized
//! back into the package. Parsing uses quick-xml streaming events; serialization
//! builds the output directly with escaping, matching the relationships-part and
//! content-types emitters below.

use crate::constants::namespace;
use crate::error::{OpcError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// A single element in a parsed XML tree.
///
/// Attribute encounter order is preserved. Text content from all text nodes
/// directly inside the element is concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    /// Create a new element with no attributes, children, or text.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Get the (qualified) tag name of this element.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get an attribute value by its qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing any existing value for the same name.
    pub fn set_attr<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Iterate over the attributes in encounter order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Get the concatenated text content directly inside this element.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text content of this element.
    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        self.text = text.into();
    }

    /// Get the direct children of this element.
    #[inline]
    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// Get mutable access to the direct children of this element.
    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlElement> {
        &mut self.children
    }

    /// Append a child element, returning a mutable reference to it.
    pub fn add_child(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(child);
        // Safe to unwrap since we just pushed it
        self.children.last_mut().unwrap()
    }

    /// Find the first direct child whose local name matches.
    ///
    /// The namespace prefix of the child's qualified name is ignored, so
    /// `find("sldSz")` matches a `<p:sldSz>` child.
    pub fn find(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| {
            let name = child.name.as_str();
            let local = match name.rfind(':') {
                Some(pos) => &name[pos + 1..],
                None => name,
            };
            local == local_name
        })
    }
}

/// Parse serialized XML into an element tree.
///
/// The input must hold exactly one root element; declarations, comments, and
/// processing instructions are skipped.
pub fn parse_xml(xml: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    let raw = std::str::from_utf8(e.as_ref())?;
                    let text = quick_xml::escape::unescape(raw)
                        .map_err(|err| OpcError::XmlError(format!("escape error: {}", err)))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(std::str::from_utf8(e.as_ref())?);
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| OpcError::XmlError("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(OpcError::XmlError(format!("XML parse error: {}", e))),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(OpcError::XmlError("unclosed element".to_string()));
    }
    root.ok_or_else(|| OpcError::XmlError("no root element".to_string()))
}

/// Serialize an element tree into part XML form.
///
/// Output carries the standard XML declaration and no pretty-printing, so the
/// result is byte-stable for unchanged trees.
pub fn serialize_part_xml(element: &XmlElement) -> Vec<u8> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    write_element(&mut xml, element);
    xml.into_bytes()
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut element = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        element.attrs.push((key.to_string(), value.to_string()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(OpcError::XmlError("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn write_element(xml: &mut String, element: &XmlElement) {
    xml.push('<');
    xml.push_str(&element.name);
    for (key, value) in &element.attrs {
        xml.push(' ');
        xml.push_str(key);
        xml.push_str("=\"");
        xml.push_str(&escape_xml(value));
        xml.push('"');
    }
    if element.children.is_empty() && element.text.is_empty() {
        xml.push_str("/>");
        return;
    }
    xml.push('>');
    xml.push_str(&escape_xml(&element.text));
    for child in &element.children {
        write_element(xml, child);
    }
    xml.push_str("</");
    xml.push_str(&element.name);
    xml.push('>');
}

/// Builder for the relationships-part XML form (a .rels item).
///
/// Entries are emitted in the order added.
#[derive(Debug, Default)]
pub struct CtRelationships {
    rels: Vec<RelEntry>,
}

#[derive(Debug)]
struct RelEntry {
    r_id: String,
    reltype: String,
    target_ref: String,
    is_external: bool,
}

impl CtRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one relationship entry.
    pub fn add_rel(&mut self, r_id: &str, reltype: &str, target_ref: &str, is_external: bool) {
        self.rels.push(RelEntry {
            r_id: r_id.to_string(),
            reltype: reltype.to_string(),
            target_ref: target_ref.to_string(),
            is_external,
        });
    }

    /// Generate the XML for the .rels item.
    pub fn xml(&self) -> Vec<u8> {
        let mut xml = String::with_capacity(1024);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<Relationships xmlns="{}">"#,
            namespace::OPC_RELATIONSHIPS
        ));
        xml.push('\n');

        for rel in &self.rels {
            let target_mode = if rel.is_external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            xml.push_str(&format!(
                r#"  <Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(&rel.r_id),
                escape_xml(&rel.reltype),
                escape_xml(&rel.target_ref),
                target_mode
            ));
            xml.push('\n');
        }

        xml.push_str("</Relationships>");
        xml.into_bytes()
    }
}

/// Builder for the [Content_Types].xml form.
///
/// Default elements precede Override elements; each group is sorted by key
/// for reproducible output.
#[derive(Debug, Default)]
pub struct CtTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl CtTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Default element mapping a file extension to a content type.
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .push((extension.to_string(), content_type.to_string()));
    }

    /// Add an Override element mapping a partname to a content type.
    pub fn add_override(&mut self, partname: &str, content_type: &str) {
        self.overrides
            .push((partname.to_string(), content_type.to_string()));
    }

    /// Generate the XML for [Content_Types].xml.
    pub fn xml(&self) -> Vec<u8> {
        let mut defaults: Vec<_> = self.defaults.iter().collect();
        defaults.sort_by(|a, b| a.0.cmp(&b.0));
        let mut overrides: Vec<_> = self.overrides.iter().collect();
        overrides.sort_by(|a, b| a.0.cmp(&b.0));

        let mut xml = String::with_capacity(4096);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<Types xmlns="{}">"#, namespace::OPC_CONTENT_TYPES));
        xml.push('\n');

        for (ext, content_type) in defaults {
            xml.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(content_type)
            ));
            xml.push('\n');
        }

        for (partname, content_type) in overrides {
            xml.push_str(&format!(
                r#"  <Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(partname),
                escape_xml(content_type)
            ));
            xml.push('\n');
        }

        xml.push_str("</Types>");
        xml.into_bytes()
    }
}

/// Escape XML special characters.
#[inline]
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
