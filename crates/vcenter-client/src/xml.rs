//! Minimal element tree for vim25 SOAP responses.
//!
//! Element names are stored without their namespace prefix; attribute keys
//! keep theirs, so `type` (managed object references) and `xsi:type` stay
//! distinct.

use crate::error::{VcenterError, VcenterResult};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// First descendant (self included) named `name`, depth-first.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Parse a whole document into its root element.
pub fn parse(xml: &str) -> VcenterResult<XmlElement> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => stack.push(element_from(e)?),
            Event::Empty(ref e) => {
                let element = element_from(e)?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(ref t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| VcenterError::parse("Unbalanced XML end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(VcenterError::parse("Truncated XML document"));
    }
    root.ok_or_else(|| VcenterError::parse("Empty XML document"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, mut element: XmlElement) {
    // Indentation between child elements is not content; leaf text is kept verbatim
    if !element.children.is_empty() && element.text.trim().is_empty() {
        element.text.clear();
    }
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> VcenterResult<XmlElement> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| VcenterError::parse(format!("XML attribute error: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name: String::from_utf8_lossy(start.local_name().as_ref()).to_string(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

/// Escape special characters for XML content.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_strips_prefixes() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <FindByUuidResponse xmlns="urn:vim25">
      <returnval type="VirtualMachine">vm-42</returnval>
    </FindByUuidResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "Envelope");
        let rv = root.find("returnval").unwrap();
        assert_eq!(rv.attr("type"), Some("VirtualMachine"));
        assert_eq!(rv.text, "vm-42");
    }

    #[test]
    fn keeps_attribute_prefixes_and_unescapes_text() {
        let doc = r#"<val xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="TaskInfoState"><name>a &amp; b</name><empty/></val>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.attr("xsi:type"), Some("TaskInfoState"));
        assert_eq!(root.attr("type"), None);
        assert_eq!(root.child_text("name"), Some("a & b"));
        assert!(root.child("empty").is_some());
        assert_eq!(root.children_named("name").count(), 1);
    }

    #[test]
    fn leaf_text_is_not_trimmed() {
        let doc = "<node>\n  <name> nightly </name>\n  <description>\t</description>\n</node>";
        let root = parse(doc).unwrap();
        assert_eq!(root.text, "");
        assert_eq!(root.child_text("name"), Some(" nightly "));
        assert_eq!(root.child_text("description"), Some("\t"));
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn rejects_truncated_and_empty_documents() {
        assert!(parse("<a><b>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn escape_round_trip_through_parser() {
        let escaped = xml_escape("<snap & 'one'>");
        let root = parse(&format!("<name>{escaped}</name>")).unwrap();
        assert_eq!(root.text, "<snap & 'one'>");
    }
}
