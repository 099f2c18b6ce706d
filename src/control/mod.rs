//! Control model shared by builders, isolates and preview surfaces.
//!
//! A `Control` is plain owned data. It is what crosses the isolation boundary:
//! the isolate retains its own instance and hands the host a snapshot.

mod types;

pub use types::{ControlType, ControlTypes, PLATFORMS};

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Builtin control families every type ultimately derives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlBase {
    Label,
    Button,
    TextBox,
    CheckBox,
    Panel,
    StackLayout,
    Drawable,
    /// Top-level shell (`Form`, `Dialog`). Cannot be reparented as-is.
    Window,
}

impl ControlBase {
    /// Can hold child controls.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Panel | Self::StackLayout | Self::Window)
    }

    /// Containers with a single content slot (`Content = ...`).
    pub const fn single_content(self) -> bool {
        matches!(self, Self::Panel | Self::Window)
    }
}

/// Uniform or per-side padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Padding {
    pub const fn uniform(value: i32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Parse `"8"` or `"1,2,3,4"` (left, top, right, bottom).
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<i32> = text
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            [all] => Some(Self::uniform(*all)),
            [h, v] => Some(Self {
                left: *h,
                top: *v,
                right: *h,
                bottom: *v,
            }),
            [left, top, right, bottom] => Some(Self {
                left: *left,
                top: *top,
                right: *right,
                bottom: *bottom,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for Padding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.left == self.top && self.top == self.right && self.right == self.bottom {
            write!(f, "{}", self.left)
        } else {
            write!(f, "{},{},{},{}", self.left, self.top, self.right, self.bottom)
        }
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl std::fmt::Display for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// A live control instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Type name it was constructed as (`Label`, `Banner`, ...)
    pub kind: String,
    pub base: ControlBase,
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub children: Vec<Control>,
}

impl Control {
    pub fn new(kind: impl Into<String>, base: ControlBase) -> Self {
        Self {
            kind: kind.into(),
            base,
            props: BTreeMap::new(),
            padding: Padding::default(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Control) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_window(&self) -> bool {
        self.base == ControlBase::Window
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    /// Make the control embeddable into a surface layout.
    ///
    /// Window shells are replaced by a `Panel` carrying the window's content and
    /// padding; everything else is returned unchanged.
    pub fn into_embeddable(self) -> Control {
        if !self.is_window() {
            return self;
        }
        Control {
            kind: "Panel".to_string(),
            base: ControlBase::Panel,
            props: BTreeMap::new(),
            padding: self.padding,
            children: self.children,
        }
    }

    /// Indented text rendering, one control per line.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out.truncate(out.trim_end().len());
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = write!(out, "{:indent$}{}", "", self.kind, indent = depth * 2);
        if !self.padding.is_zero() {
            let _ = write!(out, " padding={}", self.padding);
        }
        for (name, value) in &self.props {
            let _ = write!(out, " {name}={value}");
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }

    /// Total number of controls in this tree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Control::count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_parse() {
        assert_eq!(Padding::parse("8"), Some(Padding::uniform(8)));
        assert_eq!(
            Padding::parse("1, 2"),
            Some(Padding {
                left: 1,
                top: 2,
                right: 1,
                bottom: 2
            })
        );
        assert_eq!(Padding::parse("1,2,3,4").map(|p| p.bottom), Some(4));
        assert_eq!(Padding::parse("1,2,3"), None);
        assert_eq!(Padding::parse("wide"), None);
    }

    #[test]
    fn test_window_unwraps_to_panel_with_padding() {
        let mut form = Control::new("Form", ControlBase::Window);
        form.padding = Padding::uniform(10);
        form.props
            .insert("Title".into(), PropValue::Str("Main".into()));
        let form = form.with_child(Control::new("Label", ControlBase::Label));

        let panel = form.into_embeddable();
        assert_eq!(panel.base, ControlBase::Panel);
        assert_eq!(panel.kind, "Panel");
        assert_eq!(panel.padding, Padding::uniform(10));
        assert_eq!(panel.children.len(), 1);
        assert_eq!(panel.children[0].kind, "Label");
        assert!(panel.props.is_empty());
    }

    #[test]
    fn test_non_window_is_unchanged() {
        let label = Control::new("Label", ControlBase::Label);
        assert_eq!(label.clone().into_embeddable(), label);
    }

    #[test]
    fn test_render_tree() {
        let mut label = Control::new("Label", ControlBase::Label);
        label
            .props
            .insert("Text".into(), PropValue::Str("Hi".into()));
        let mut panel = Control::new("Panel", ControlBase::Panel).with_child(label);
        panel.padding = Padding::uniform(4);

        assert_eq!(panel.render_tree(), "Panel padding=4\n  Label Text=\"Hi\"");
        assert_eq!(panel.count(), 2);
    }
}
