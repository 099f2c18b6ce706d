//! Markup builder: an XML element tree mapped onto controls.
//!
//! ```xml
//! <Form Title="Main" Padding="10">
//!   <StackLayout>
//!     <Label>Name</Label>
//!     <TextBox Enabled="false"/>
//!   </StackLayout>
//! </Form>
//! ```
//!
//! Element names are type names, attributes are properties and text becomes
//! the `Text` property.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{BuildCx, BuildError, Builder, MAX_DEPTH, nesting_too_deep};
use crate::control::{Control, ControlTypes, Padding, PropValue};

#[derive(Debug, Default)]
pub struct MarkupBuilder;

impl MarkupBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl Builder for MarkupBuilder {
    fn kind(&self) -> &'static str {
        "markup"
    }

    fn create(&mut self, source: &str, cx: &BuildCx<'_>) -> Result<Control, BuildError> {
        parse(source, cx.types)
    }
}

/// 1-based line and column of a byte offset.
fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let before = &source.as_bytes()[..offset.min(source.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = before.iter().rev().take_while(|&&b| b != b'\n').count() + 1;
    (
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    )
}

struct Cursor<'s> {
    source: &'s str,
    offset: usize,
}

impl Cursor<'_> {
    fn error(&self, message: impl Into<String>) -> BuildError {
        let (line, column) = line_col(self.source, self.offset);
        BuildError::located(message, line, column)
    }
}

pub fn parse(source: &str, types: &ControlTypes) -> Result<Control, BuildError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Control> = Vec::new();
    let mut root: Option<Control> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let cursor = Cursor {
                    source,
                    offset: usize::try_from(reader.error_position()).unwrap_or(0),
                };
                return Err(cursor.error(format!("malformed markup: {e}")));
            }
        };
        // Start of the tag just read
        let after = usize::try_from(reader.buffer_position()).unwrap_or(0);
        let cursor = Cursor {
            source,
            offset: source
                .get(..after)
                .and_then(|read| read.rfind('<'))
                .unwrap_or(after),
        };

        if matches!(event, Event::Start(_) | Event::Empty(_)) && stack.len() >= MAX_DEPTH {
            return Err(cursor.error(nesting_too_deep()));
        }

        match event {
            Event::Start(elem) => {
                stack.push(open(&elem, types, &cursor)?);
            }
            Event::Empty(elem) => {
                let control = open(&elem, types, &cursor)?;
                close(control, &mut stack, &mut root, &cursor)?;
            }
            Event::End(_) => {
                let Some(control) = stack.pop() else {
                    return Err(cursor.error("unbalanced closing tag"));
                };
                close(control, &mut stack, &mut root, &cursor)?;
            }
            Event::Text(text) => {
                let Some(current) = stack.last_mut() else {
                    return Err(cursor.error("text outside of the root element"));
                };
                let text = String::from_utf8_lossy(&text).into_owned();
                current.props.insert("Text".to_string(), PropValue::Str(text));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        let cursor = Cursor {
            source,
            offset: source.len(),
        };
        return Err(cursor.error(format!("{} is never closed", open.kind)));
    }
    root.ok_or_else(|| BuildError::new("markup defines no control"))
}

fn open(
    elem: &BytesStart<'_>,
    types: &ControlTypes,
    cursor: &Cursor<'_>,
) -> Result<Control, BuildError> {
    let name = String::from_utf8_lossy(elem.local_name().as_ref()).into_owned();
    let mut control = types.instantiate(&name).ok_or_else(|| {
        let (line, column) = line_col(cursor.source, cursor.offset);
        BuildError::undefined(&name, line, column)
    })?;

    for attr in elem.attributes() {
        let attr = attr.map_err(|e| cursor.error(format!("bad attribute on {name}: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let raw = String::from_utf8_lossy(&attr.value);
        let value: Cow<'_, str> = quick_xml::escape::unescape(&raw)
            .map_err(|e| cursor.error(format!("bad value for {key}: {e}")))?;

        if key == "Padding" {
            control.padding = Padding::parse(&value)
                .ok_or_else(|| cursor.error(format!("invalid padding `{value}`")))?;
            continue;
        }
        control.props.insert(key, scalar(&value));
    }
    Ok(control)
}

fn close(
    control: Control,
    stack: &mut [Control],
    root: &mut Option<Control>,
    cursor: &Cursor<'_>,
) -> Result<(), BuildError> {
    match stack.last_mut() {
        Some(parent) => {
            if !parent.base.is_container() {
                let message = format!("{} cannot contain {}", parent.kind, control.kind);
                return Err(cursor.error(message));
            }
            if parent.base.single_content() && !parent.children.is_empty() {
                let message = format!("{} can only hold a single control", parent.kind);
                return Err(cursor.error(message));
            }
            parent.children.push(control);
        }
        None if root.is_some() => {
            return Err(cursor.error("markup has more than one root element"));
        }
        None => *root = Some(control),
    }
    Ok(())
}

fn scalar(value: &str) -> PropValue {
    match value {
        "true" => PropValue::Bool(true),
        "false" => PropValue::Bool(false),
        _ => value
            .parse()
            .map_or_else(|_| PropValue::Str(value.to_string()), PropValue::Int),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> ControlTypes {
        ControlTypes::for_platform("headless").unwrap()
    }

    #[test]
    fn test_line_col() {
        let source = "ab\ncd";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 4), (2, 2));
    }

    #[test]
    fn test_scalar() {
        assert_eq!(scalar("true"), PropValue::Bool(true));
        assert_eq!(scalar("42"), PropValue::Int(42));
        assert_eq!(scalar("a &amp; b"), PropValue::Str("a &amp; b".into()));
    }

    #[test]
    fn test_nested_tree() {
        let source = r#"
            <Form Title="Main" Padding="10">
              <StackLayout>
                <Label>Name</Label>
                <TextBox Enabled="false"/>
              </StackLayout>
            </Form>
        "#;
        let form = parse(source, &types()).unwrap();
        assert!(form.is_window());
        assert_eq!(form.padding, Padding::uniform(10));
        let stack = &form.children[0];
        assert_eq!(stack.children.len(), 2);
        assert_eq!(stack.children[0].prop("Text"), Some(&PropValue::Str("Name".into())));
        assert_eq!(stack.children[1].prop("Enabled"), Some(&PropValue::Bool(false)));
    }

    #[test]
    fn test_escaped_attribute() {
        let label = parse(r#"<Label Text="a &amp; b"/>"#, &types()).unwrap();
        assert_eq!(label.prop("Text"), Some(&PropValue::Str("a & b".into())));
    }

    #[test]
    fn test_unknown_element() {
        let err = parse("<Panel>\n  <Labl/>\n</Panel>", &types()).unwrap_err();
        assert_eq!(err.message, "Labl is undefined");
        assert!(err.detail.starts_with("line 2"), "{}", err.detail);
    }

    #[test]
    fn test_single_content_rejects_second_child() {
        let err = parse("<Panel><Label/><Label/></Panel>", &types()).unwrap_err();
        assert!(err.message.contains("single control"));
    }

    #[test]
    fn test_leaf_rejects_children() {
        let err = parse("<Label><Button/></Label>", &types()).unwrap_err();
        assert!(err.message.contains("cannot contain"));
    }

    fn stacks(levels: usize) -> String {
        "<StackLayout>".repeat(levels) + &"</StackLayout>".repeat(levels)
    }

    #[test]
    fn test_nesting_limit() {
        assert!(parse(&stacks(MAX_DEPTH), &types()).is_ok());
        let err = parse(&stacks(MAX_DEPTH + 1), &types()).unwrap_err();
        assert!(err.message.starts_with("nesting too deep"), "{}", err.message);

        let err = parse(&stacks(200_000), &types()).unwrap_err();
        assert!(err.message.starts_with("nesting too deep"), "{}", err.message);
    }

    #[test]
    fn test_empty_markup() {
        assert!(parse("", &types()).is_err());
    }
}
