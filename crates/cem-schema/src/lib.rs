//! Data model for the Custom Elements Manifest (schema version 2.1.0).
//!
//! The structs here serialize straight to the manifest JSON. Internal
//! bookkeeping fields (byte offsets used for stable sorting) are marked
//! `#[serde(skip)]` and never reach the output.

use serde::{Deserialize, Serialize};

pub mod declarations;
pub mod deprecated;
pub mod features;

pub use declarations::{
    ClassDeclaration, ClassField, ClassMember, CustomElementDeclaration, Declaration,
    FunctionDeclaration, Method, Parameter, Privacy, Return, Type, VariableDeclaration,
};
pub use deprecated::Deprecated;
pub use features::{Attribute, CssCustomProperty, CssPart, CssState, Demo, Event, Slot};

/// The manifest schema version this generator emits.
pub const SCHEMA_VERSION: &str = "2.1.0";

/// Top-level manifest: one package, many modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema_version: String,
    pub modules: Vec<Module>,
}

impl Package {
    #[must_use]
    pub fn new(modules: Vec<Module>) -> Self {
        let mut package = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            modules,
        };
        package.sort_modules();
        package
    }

    /// Deterministic module order: by path ascending.
    pub fn sort_modules(&mut self) {
        self.modules.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Serialize to the manifest JSON text, terminated by a single newline.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

/// Always serializes as `"javascript-module"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    #[default]
    #[serde(rename = "javascript-module")]
    JavascriptModule,
}

/// One source module. Identity is the workspace-relative path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub kind: ModuleKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<Declaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
}

impl Module {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Cross-module symbol pointer used by exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl Reference {
    #[must_use]
    pub fn local(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: Some(module.into()),
        }
    }
}

/// Link to the source-control hosted line a declaration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    pub href: String,
}

/// A module's exported symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Export {
    /// A `customElements.define(...)` registration.
    #[serde(rename = "custom-element-definition")]
    CustomElementDefinition { name: String, declaration: Reference },
    /// A plain JavaScript export.
    #[serde(rename = "js")]
    JavaScript { name: String, declaration: Reference },
}

impl Export {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::CustomElementDefinition { name, .. } | Self::JavaScript { name, .. } => name,
        }
    }

    #[must_use]
    pub fn declaration(&self) -> &Reference {
        match self {
            Self::CustomElementDefinition { declaration, .. }
            | Self::JavaScript { declaration, .. } => declaration,
        }
    }
}
