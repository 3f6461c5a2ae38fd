use std::io::BufRead;
use std::str;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use xavro_document::DocumentNode;

use crate::XmlError;

/// Suffix appended to an attribute's key when a child element already
/// claimed its name.
const ATTRIBUTE_ALTERNATE_SUFFIX: &str = "_attr";

/// Parses an XML document into its tree representation.
///
/// The returned node is the document node: its single field holds the root
/// element under the element's local name, which is how a top-level record
/// schema addresses the root element.
pub fn parse(xml: &str) -> Result<DocumentNode, XmlError> {
    read_document(Reader::from_str(xml))
}

/// Like [`parse`], reading from a buffered reader.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<DocumentNode, XmlError> {
    read_document(Reader::from_reader(reader))
}

enum TextKind {
    Plain,
    Verbatim,
}

/// An element still open on the reader stack: the node under construction
/// plus what is needed to classify it and attach its attributes on close.
struct Frame {
    name: String,
    node: DocumentNode,
    /// Child constructs seen so far: elements, text blocks, CDATA blocks,
    /// comments and processing instructions all count, matching DOM
    /// child-node semantics.
    constructs: usize,
    /// The most recent text construct; only consulted when it was the sole
    /// construct.
    text: Option<(String, TextKind)>,
    attributes: Vec<(String, String)>,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = local_name(start.name().as_ref())?;
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = local_name(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            node: DocumentNode::new(),
            constructs: 0,
            text: None,
            attributes,
        })
    }

    /// The pure-text check: exactly one child construct, and that construct
    /// is either a CDATA block (whitespace is significant there) or a text
    /// block that is non-empty after trimming. Trimming is only part of the
    /// test; the stored value stays verbatim. Anything else — element
    /// children, several constructs, whitespace-only text — is structural
    /// formatting, not a scalar.
    fn pure_text(&mut self) -> Option<String> {
        if self.constructs != 1 {
            return None;
        }
        match self.text.take() {
            Some((content, TextKind::Verbatim)) => Some(content),
            Some((content, TextKind::Plain)) if !content.trim().is_empty() => Some(content),
            _ => None,
        }
    }
}

fn read_document<R: BufRead>(mut reader: Reader<R>) -> Result<DocumentNode, XmlError> {
    let mut document = DocumentNode::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                note_construct(&mut stack);
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                note_construct(&mut stack);
                let frame = Frame::open(&start)?;
                attach(frame, parent_of(&mut stack, &mut document));
            }
            Event::End(_) => {
                // Mismatched tags never get here; the reader rejects them.
                if let Some(frame) = stack.pop() {
                    attach(frame, parent_of(&mut stack, &mut document));
                }
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.constructs += 1;
                    frame.text = Some((text.unescape()?.into_owned(), TextKind::Plain));
                }
            }
            Event::CData(cdata) => {
                if let Some(frame) = stack.last_mut() {
                    frame.constructs += 1;
                    let content = str::from_utf8(&cdata.into_inner())?.to_string();
                    frame.text = Some((content, TextKind::Verbatim));
                }
            }
            Event::Comment(_) | Event::PI(_) => note_construct(&mut stack),
            Event::Eof => break,
            // Declarations and doctypes live in the prolog, outside any
            // element content.
            _ => {}
        }
        buf.clear();
    }

    if document.is_empty() {
        return Err(XmlError::MissingRoot);
    }
    Ok(document)
}

fn note_construct(stack: &mut [Frame]) {
    if let Some(frame) = stack.last_mut() {
        frame.constructs += 1;
    }
}

fn parent_of<'a>(stack: &'a mut [Frame], document: &'a mut DocumentNode) -> &'a mut DocumentNode {
    match stack.last_mut() {
        Some(open) => &mut open.node,
        None => document,
    }
}

/// Classifies the closed element, attaches its attributes, and hands the
/// finished node to its parent.
///
/// Attributes go in after the child elements so that an attribute losing a
/// name collision against an element is the one that gets renamed.
fn attach(mut frame: Frame, parent: &mut DocumentNode) {
    if let Some(scalar) = frame.pure_text() {
        frame.node.set_scalar(scalar);
    }
    for (name, value) in frame.attributes.drain(..) {
        let alternate = format!("{name}{ATTRIBUTE_ALTERNATE_SUFFIX}");
        frame
            .node
            .push_field_or(name, alternate, DocumentNode::scalar(value));
    }
    parent.push_field(frame.name, frame.node);
}

/// Reduces a possibly namespace-prefixed name to its local part; the target
/// schema format only allows identifier characters, so `ns:local` becomes
/// `local`.
fn local_name(qualified: &[u8]) -> Result<String, XmlError> {
    let name = str::from_utf8(qualified)?;
    Ok(name.rsplit(':').next().unwrap_or(name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root<'a>(document: &'a DocumentNode, name: &str) -> &'a DocumentNode {
        &document.values(name)[0]
    }

    #[test]
    fn text_element_becomes_scalar() {
        let document = parse("<a>42</a>").unwrap();
        let a = root(&document, "a");
        assert_eq!(a.scalar_text(), Some("42"));
        assert_eq!(a.keys().count(), 0);
    }

    #[test]
    fn document_node_wraps_the_root_element() {
        let document = parse("<root><child>1</child></root>").unwrap();
        let keys: Vec<_> = document.keys().collect();
        assert_eq!(keys, ["root"]);
        assert!(document.scalar_text().is_none());
    }

    #[test]
    fn formatting_whitespace_is_not_a_scalar() {
        let document = parse("<a>\n  <b>1</b>\n</a>").unwrap();
        let a = root(&document, "a");
        assert_eq!(a.scalar_text(), None);
        assert_eq!(a.values("b")[0].scalar_text(), Some("1"));
    }

    #[test]
    fn cdata_is_a_scalar_even_when_blank() {
        let document = parse("<a><![CDATA[  ]]></a>").unwrap();
        assert_eq!(root(&document, "a").scalar_text(), Some("  "));
    }

    #[test]
    fn cdata_content_is_verbatim() {
        let document = parse("<a><![CDATA[<not>parsed</not>]]></a>").unwrap();
        assert_eq!(
            root(&document, "a").scalar_text(),
            Some("<not>parsed</not>")
        );
    }

    #[test]
    fn whitespace_only_text_is_not_a_scalar() {
        let document = parse("<a>   </a>").unwrap();
        assert_eq!(root(&document, "a").scalar_text(), None);
    }

    #[test]
    fn scalar_text_is_stored_untrimmed() {
        let document = parse("<a>  padded  </a>").unwrap();
        assert_eq!(root(&document, "a").scalar_text(), Some("  padded  "));
    }

    #[test]
    fn comment_defeats_pure_text_classification() {
        let document = parse("<a>42<!-- note --></a>").unwrap();
        assert_eq!(root(&document, "a").scalar_text(), None);
    }

    #[test]
    fn repeated_tags_accumulate_in_document_order() {
        let document = parse("<r><item>1</item><item>2</item><item>3</item></r>").unwrap();
        let items = root(&document, "r").values("item");
        let texts: Vec<_> = items.iter().filter_map(DocumentNode::scalar_text).collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn attribute_colliding_with_element_gets_renamed() {
        let document = parse(r#"<r x="attribute"><x>element</x></r>"#).unwrap();
        let r = root(&document, "r");
        assert_eq!(r.values("x")[0].scalar_text(), Some("element"));
        assert_eq!(r.values("x_attr")[0].scalar_text(), Some("attribute"));
    }

    #[test]
    fn attribute_without_collision_keeps_its_name() {
        let document = parse(r#"<r x="1"/>"#).unwrap();
        let r = root(&document, "r");
        assert_eq!(r.values("x")[0].scalar_text(), Some("1"));
        assert!(!r.contains_field("x_attr"));
    }

    #[test]
    fn attributes_coexist_with_a_scalar() {
        let document = parse(r#"<a unit="ms">42</a>"#).unwrap();
        let a = root(&document, "a");
        assert_eq!(a.scalar_text(), Some("42"));
        assert_eq!(a.values("unit")[0].scalar_text(), Some("ms"));
    }

    #[test]
    fn namespace_prefixes_reduce_to_local_names() {
        let document = parse(r#"<ns:a xmlns:ns="http://example.com">1</ns:a>"#).unwrap();
        let a = root(&document, "a");
        assert_eq!(a.scalar_text(), Some("1"));
    }

    #[test]
    fn entities_are_unescaped_in_text() {
        let document = parse("<a>4 &amp; 2</a>").unwrap();
        assert_eq!(root(&document, "a").scalar_text(), Some("4 & 2"));
    }

    #[test]
    fn entities_are_unescaped_in_attributes() {
        let document = parse(r#"<a x="4 &amp; 2"/>"#).unwrap();
        assert_eq!(
            root(&document, "a").values("x")[0].scalar_text(),
            Some("4 & 2")
        );
    }

    #[test]
    fn nested_structure_round_trips() {
        let xml = "<order><lines><line><sku>A1</sku></line><line><sku>B2</sku></line></lines></order>";
        let document = parse(xml).unwrap();
        let lines = root(&document, "order").values("lines");
        assert_eq!(lines.len(), 1);
        let line = lines[0].values("line");
        assert_eq!(line.len(), 2);
        assert_eq!(line[1].values("sku")[0].scalar_text(), Some("B2"));
    }

    #[test]
    fn empty_input_has_no_root() {
        assert!(matches!(parse(""), Err(XmlError::MissingRoot)));
    }

    #[test]
    fn malformed_markup_is_rejected() {
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn parse_reader_matches_parse() {
        let xml = r#"<r x="1"><y>2</y></r>"#;
        let from_str = parse(xml).unwrap();
        let from_reader = parse_reader(xml.as_bytes()).unwrap();
        assert_eq!(from_str, from_reader);
    }
}
