//! Declaration variants: classes, custom elements, functions, variables.

use serde::{Deserialize, Serialize};

use crate::deprecated::Deprecated;
use crate::features::{
    Attribute, CssCustomProperty, CssPart, CssState, Demo, Event, Slot, sort_by_start_byte,
};
use crate::{Reference, SourceReference};

/// A type annotation, kept as source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Type {
    pub text: String,
}

impl Type {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Member visibility, emitted only when the source is explicit about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Protected,
    Private,
}

/// A function or method parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Return type of a function or method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Return {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A class field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassField {
    pub name: String,
    #[serde(default, rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub static_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Attribute name this field maps to, when it observes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflects: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
}

/// A class method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    pub name: String,
    #[serde(default, rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub static_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_: Option<Return>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
}

/// Heterogeneous class member list, discriminated by `kind` in the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClassMember {
    #[serde(rename = "field")]
    Field(ClassField),
    #[serde(rename = "method")]
    Method(Method),
}

impl ClassMember {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => &field.name,
            Self::Method(method) => &method.name,
        }
    }
}

/// Always serializes as `"class"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    #[default]
    #[serde(rename = "class")]
    Class,
}

/// Always serializes as `"function"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    #[default]
    #[serde(rename = "function")]
    Function,
}

/// Always serializes as `"variable"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    #[default]
    #[serde(rename = "variable")]
    Variable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDeclaration {
    pub kind: ClassKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ClassMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
}

/// A class registered as a custom element: a [`ClassDeclaration`] plus the
/// tag name and the element's public surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomElementDeclaration {
    #[serde(flatten)]
    pub class: ClassDeclaration,
    /// Distinguishes a custom element from a plain class in the JSON.
    pub custom_element: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css_properties: Vec<CssCustomProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css_parts: Vec<CssPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css_states: Vec<CssState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demos: Vec<Demo>,
}

impl CustomElementDeclaration {
    #[must_use]
    pub fn new(class: ClassDeclaration) -> Self {
        Self {
            class,
            custom_element: true,
            ..Self::default()
        }
    }

    /// Apply the stable `(startByte, name)` order to every offset-carrying
    /// feature sequence.
    pub fn sort_features(&mut self) {
        sort_by_start_byte(&mut self.slots, |s| (s.start_byte, s.name.as_str()));
        sort_by_start_byte(&mut self.css_parts, |p| (p.start_byte, p.name.as_str()));
        sort_by_start_byte(&mut self.css_states, |s| (s.start_byte, s.name.as_str()));
        sort_by_start_byte(&mut self.css_properties, |p| {
            (p.start_byte, p.name.as_str())
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub kind: FunctionKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_: Option<Return>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
}

/// Tagged declaration variant.
///
/// Custom elements and plain classes share `kind: "class"` in the schema;
/// the `customElement` flag tells them apart, so deserialization tries the
/// custom-element shape first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Declaration {
    CustomElement(CustomElementDeclaration),
    Class(ClassDeclaration),
    Function(FunctionDeclaration),
    Variable(VariableDeclaration),
}

impl Declaration {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::CustomElement(decl) => &decl.class.name,
            Self::Class(decl) => &decl.name,
            Self::Function(decl) => &decl.name,
            Self::Variable(decl) => &decl.name,
        }
    }

    #[must_use]
    pub fn as_custom_element(&self) -> Option<&CustomElementDeclaration> {
        match self {
            Self::CustomElement(decl) => Some(decl),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_class_like(&self) -> bool {
        matches!(self, Self::CustomElement(_) | Self::Class(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_element_flattens_class_fields() {
        let mut decl = CustomElementDeclaration::new(ClassDeclaration {
            name: "MyEl".into(),
            ..ClassDeclaration::default()
        });
        decl.tag_name = Some("my-el".into());

        let value = serde_json::to_value(&decl).unwrap();
        assert_eq!(value["kind"], "class");
        assert_eq!(value["name"], "MyEl");
        assert_eq!(value["customElement"], true);
        assert_eq!(value["tagName"], "my-el");
    }

    #[test]
    fn member_kind_discriminates_fields_and_methods() {
        let member = ClassMember::Field(ClassField {
            name: "open".into(),
            ..ClassField::default()
        });
        let value = serde_json::to_value(&member).unwrap();
        assert_eq!(value["kind"], "field");

        let back: ClassMember = serde_json::from_value(value).unwrap();
        assert_eq!(back.name(), "open");
    }

    #[test]
    fn static_false_is_omitted() {
        let value = serde_json::to_value(Method {
            name: "render".into(),
            ..Method::default()
        })
        .unwrap();
        assert!(value.get("static").is_none());
    }

    #[test]
    fn feature_sort_is_stable_by_byte_then_name() {
        let mut decl = CustomElementDeclaration::new(ClassDeclaration::default());
        decl.css_properties = vec![
            CssCustomProperty {
                name: "--late".into(),
                start_byte: 90,
                ..CssCustomProperty::default()
            },
            CssCustomProperty {
                name: "--b".into(),
                start_byte: 10,
                ..CssCustomProperty::default()
            },
            CssCustomProperty {
                name: "--a".into(),
                start_byte: 10,
                ..CssCustomProperty::default()
            },
        ];
        decl.sort_features();
        let names: Vec<&str> = decl.css_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["--a", "--b", "--late"]);
    }
}
