//! Type table consulted by builders.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{Control, ControlBase, Padding, PropValue};

/// Platform descriptors the toolkit attachment understands.
pub const PLATFORMS: &[&str] = &["headless", "gtk", "mac", "wpf", "winforms"];

const BUILTINS: &[(&str, ControlBase)] = &[
    ("Label", ControlBase::Label),
    ("Button", ControlBase::Button),
    ("TextBox", ControlBase::TextBox),
    ("CheckBox", ControlBase::CheckBox),
    ("Panel", ControlBase::Panel),
    ("StackLayout", ControlBase::StackLayout),
    ("Drawable", ControlBase::Drawable),
    ("Form", ControlBase::Window),
    ("Dialog", ControlBase::Window),
];

/// A constructible control type: builtin or exported by a loaded module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlType {
    pub name: String,
    /// Builtin or previously defined type this one derives from
    pub base: String,
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
    #[serde(default)]
    pub padding: Option<i32>,
}

/// Resolved entry: builtin family plus inherited defaults.
#[derive(Debug, Clone)]
struct Entry {
    base: ControlBase,
    props: BTreeMap<String, PropValue>,
    padding: Padding,
    /// Module that exported the type (`None` for builtins)
    module: Option<String>,
}

/// Type table for one isolation context.
#[derive(Debug, Clone)]
pub struct ControlTypes {
    platform: String,
    entries: FxHashMap<String, Entry>,
}

impl ControlTypes {
    /// Builtin types for `platform`; `None` if the platform is unknown.
    pub fn for_platform(platform: &str) -> Option<Self> {
        if !PLATFORMS.contains(&platform) {
            return None;
        }
        let entries = BUILTINS
            .iter()
            .map(|(name, base)| {
                let entry = Entry {
                    base: *base,
                    props: BTreeMap::new(),
                    padding: Padding::default(),
                    module: None,
                };
                ((*name).to_string(), entry)
            })
            .collect();
        Some(Self {
            platform: platform.to_string(),
            entries,
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Register types exported by `module`.
    ///
    /// Types may derive from builtins or from types registered earlier.
    /// Returns the name of the first type whose base is unknown.
    pub fn register(&mut self, module: &str, types: &[ControlType]) -> Result<(), String> {
        for ty in types {
            let Some(parent) = self.entries.get(&ty.base) else {
                return Err(format!("{} (base of {})", ty.base, ty.name));
            };
            let mut props = parent.props.clone();
            props.extend(ty.props.iter().map(|(k, v)| (k.clone(), v.clone())));
            let entry = Entry {
                base: parent.base,
                props,
                padding: ty.padding.map_or(parent.padding, Padding::uniform),
                module: Some(module.to_string()),
            };
            self.entries.insert(ty.name.clone(), entry);
        }
        Ok(())
    }

    /// Construct a fresh instance of `name`.
    pub fn instantiate(&self, name: &str) -> Option<Control> {
        let entry = self.entries.get(name)?;
        Some(Control {
            kind: name.to_string(),
            base: entry.base,
            props: entry.props.clone(),
            padding: entry.padding,
            children: Vec::new(),
        })
    }

    /// Module that exported `name`, if not a builtin.
    pub fn origin(&self, name: &str) -> Option<&str> {
        self.entries.get(name)?.module.as_deref()
    }
}
