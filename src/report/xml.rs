use std::io::Write;

use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};

/// A node in the report document: a child element, escaped text, or a CDATA
/// block.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

/// Minimal in-memory XML element. Attributes keep insertion order so the
/// serialized output is stable across runs.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((name.into(), value.into()));
    }

    pub fn append(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn append_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    pub fn append_cdata(&mut self, text: impl Into<String>) {
        self.children.push(Node::CData(text.into()));
    }
}

/// Serialize `root` with the fixed UTF-8 declaration and 2-space indentation.
pub fn write_document<W: Write>(root: &Element, mut out: W) -> Result<()> {
    out.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n")?;
    {
        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        write_element(&mut writer, root)?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (name, value) in &element.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(nested) => write_element(writer, nested)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Node::CData(text) => {
                writer.write_event(Event::CData(BytesCData::new(text.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
