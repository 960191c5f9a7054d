//! The compiled query catalog.
//!
//! Every query the extractors run is compiled exactly once, at session
//! setup, and reused for all module processing. A compile failure here is
//! fatal: without the catalog there is no usable engine.
//!
//! Captured text is filtered in code (`customElements`, `define`, `css`,
//! `html`, ...) instead of `#eq?` predicates; the streaming cursor does not
//! apply them.

use tree_sitter::Query;

use cem_common::{Error, Result};

use crate::pool::Grammar;

// ---------------------------------------------------------------------------
// TypeScript
// ---------------------------------------------------------------------------

/// Import statements: default/named bindings and the source specifier.
const TS_IMPORTS: &str = r"
(import_statement
  (import_clause (identifier) @import.default)?
  source: (string (string_fragment) @import.source)) @import

(import_statement
  (import_clause
    (named_imports
      (import_specifier
        name: (identifier) @import.named)))
  source: (string (string_fragment) @import.source)) @import
";

/// Class declarations with name and optional heritage.
const TS_CLASSES: &str = r"
(class_declaration
  name: (type_identifier) @class.name) @class

(class_declaration
  name: (type_identifier) @class.name
  (class_heritage
    (extends_clause
      value: (_) @class.superclass))) @class
";

/// Decorators on classes and members.
const TS_DECORATORS: &str = r"
(decorator
  (call_expression
    function: (identifier) @decorator.name
    arguments: (arguments) @decorator.arguments)) @decorator

(decorator
  (call_expression
    function: (identifier) @decorator.name
    arguments: (arguments (string (string_fragment) @decorator.string)))) @decorator

(decorator (identifier) @decorator.name) @decorator
";

/// `key: value` pairs inside a decorator's options object.
const TS_DECORATOR_OPTIONS: &str = r"
(pair
  key: (property_identifier) @option.key
  value: (_) @option.value) @option
";

/// Class fields and methods.
const TS_CLASS_MEMBERS: &str = r#"
(class_body
  (public_field_definition
    (accessibility_modifier)? @field.access
    "static"? @field.static
    name: [(property_identifier) (private_property_identifier)] @field.name
    type: (type_annotation (_) @field.type)?
    value: (_)? @field.value) @field)

(class_body
  (method_definition
    (accessibility_modifier)? @method.access
    "static"? @method.static
    "get"? @method.getter
    "set"? @method.setter
    name: [(property_identifier) (private_property_identifier)] @method.name
    parameters: (formal_parameters) @method.params
    return_type: (type_annotation (_) @method.return)?) @method)
"#;

/// Top-level `customElements.define('x-y', Klass)` calls.
const TS_CUSTOM_ELEMENTS_DEFINE: &str = r"
(call_expression
  function: (member_expression
    object: (identifier) @define.object
    property: (property_identifier) @define.property)
  arguments: (arguments
    (string (string_fragment) @define.tag)
    (identifier) @define.class)) @define
";

/// `static styles` values: inline tagged templates, identifier references,
/// and arrays mixing both.
const TS_STATIC_STYLES: &str = r#"
(public_field_definition
  "static" @styles.static
  name: (property_identifier) @styles.name
  value: (call_expression
    function: (identifier) @styles.tag
    arguments: (template_string) @styles.template)) @styles

(public_field_definition
  "static" @styles.static
  name: (property_identifier) @styles.name
  value: (identifier) @styles.reference) @styles

(public_field_definition
  "static" @styles.static
  name: (property_identifier) @styles.name
  value: (array (identifier) @styles.reference)) @styles

(public_field_definition
  "static" @styles.static
  name: (property_identifier) @styles.name
  value: (array
    (call_expression
      function: (identifier) @styles.tag
      arguments: (template_string) @styles.template))) @styles
"#;

/// The tagged template returned by a `render()` method.
const TS_RENDER_TEMPLATE: &str = r"
(method_definition
  name: (property_identifier) @render.name
  body: (statement_block
    (return_statement
      (call_expression
        function: (identifier) @render.tag
        arguments: (template_string) @render.template)))) @render
";

/// Any tagged template literal.
const TS_TAGGED_TEMPLATES: &str = r"
(call_expression
  function: (identifier) @template.tag
  arguments: (template_string) @template.string) @template
";

/// Export statements: declarations and named re-export clauses.
const TS_EXPORTS: &str = r"
(export_statement
  declaration: (class_declaration
    name: (type_identifier) @export.class)) @export

(export_statement
  declaration: (function_declaration
    name: (identifier) @export.function)) @export

(export_statement
  declaration: (lexical_declaration
    (variable_declarator
      name: (identifier) @export.variable))) @export

(export_statement
  (export_clause
    (export_specifier
      name: (identifier) @export.named
      alias: (identifier)? @export.alias))) @export
";

/// Top-level function declarations (exported or not).
const TS_FUNCTIONS: &str = r"
(program
  (function_declaration
    name: (identifier) @function.name
    parameters: (formal_parameters) @function.params
    return_type: (type_annotation (_) @function.return)?) @function)

(program
  (export_statement
    declaration: (function_declaration
      name: (identifier) @function.name
      parameters: (formal_parameters) @function.params
      return_type: (type_annotation (_) @function.return)?) @function))
";

/// Top-level lexical declarations (exported or not).
const TS_VARIABLES: &str = r"
(program
  (lexical_declaration
    (variable_declarator
      name: (identifier) @variable.name
      type: (type_annotation (_) @variable.type)?
      value: (_)? @variable.value) @variable))

(program
  (export_statement
    declaration: (lexical_declaration
      (variable_declarator
        name: (identifier) @variable.name
        type: (type_annotation (_) @variable.type)?
        value: (_)? @variable.value) @variable)))
";

/// Every comment, for JSDoc association by adjacency.
const TS_COMMENTS: &str = r"
(comment) @comment
";

// ---------------------------------------------------------------------------
// CSS
// ---------------------------------------------------------------------------

/// Property declarations and comments; custom properties are the `--`
/// prefixed subset, filtered in code.
const CSS_CUSTOM_PROPERTIES: &str = r"
(declaration
  (property_name) @property.name) @property

(comment) @comment
";

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// `<slot>` elements, `part=` attributes, and comments for doc association.
const HTML_SLOTS_AND_PARTS: &str = r"
(element
  (start_tag
    (tag_name) @slot.tag
    (attribute
      (attribute_name) @slot.attr.name
      (quoted_attribute_value (attribute_value) @slot.attr.value)?)?)) @slot

(element
  (self_closing_tag
    (tag_name) @slot.tag
    (attribute
      (attribute_name) @slot.attr.name
      (quoted_attribute_value (attribute_value) @slot.attr.value)?)?)) @slot

(element
  (start_tag
    (attribute
      (attribute_name) @part.attr.name
      (quoted_attribute_value (attribute_value) @part.attr.value)))) @part

(element
  (self_closing_tag
    (attribute
      (attribute_name) @part.attr.name
      (quoted_attribute_value (attribute_value) @part.attr.value)))) @part

(comment) @comment
";

// ---------------------------------------------------------------------------
// JSDoc
// ---------------------------------------------------------------------------

/// The block description and each tag with optional type and description.
const JSDOC_DOCUMENT: &str = r"
(document (description) @doc.description)

(tag
  (tag_name) @tag.name
  (type)? @tag.type
  (description)? @tag.description) @tag
";

pub struct TypeScriptQueries {
    pub imports: Query,
    pub classes: Query,
    pub decorators: Query,
    pub decorator_options: Query,
    pub class_members: Query,
    pub custom_elements_define: Query,
    pub static_styles: Query,
    pub render_template: Query,
    pub tagged_templates: Query,
    pub exports: Query,
    pub functions: Query,
    pub variables: Query,
    pub comments: Query,
}

pub struct CssQueries {
    pub custom_properties: Query,
}

pub struct HtmlQueries {
    pub slots_and_parts: Query,
}

pub struct JsdocQueries {
    pub document: Query,
}

/// Owns every compiled query, shared read-only across workers.
pub struct QueryManager {
    pub typescript: TypeScriptQueries,
    pub css: CssQueries,
    pub html: HtmlQueries,
    pub jsdoc: JsdocQueries,
}

impl QueryManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            typescript: TypeScriptQueries {
                imports: compile(Grammar::TypeScript, "imports", TS_IMPORTS)?,
                classes: compile(Grammar::TypeScript, "classes", TS_CLASSES)?,
                decorators: compile(Grammar::TypeScript, "decorators", TS_DECORATORS)?,
                decorator_options: compile(
                    Grammar::TypeScript,
                    "decoratorOptions",
                    TS_DECORATOR_OPTIONS,
                )?,
                class_members: compile(Grammar::TypeScript, "classMembers", TS_CLASS_MEMBERS)?,
                custom_elements_define: compile(
                    Grammar::TypeScript,
                    "customElementsDefine",
                    TS_CUSTOM_ELEMENTS_DEFINE,
                )?,
                static_styles: compile(Grammar::TypeScript, "staticStyles", TS_STATIC_STYLES)?,
                render_template: compile(
                    Grammar::TypeScript,
                    "renderTemplate",
                    TS_RENDER_TEMPLATE,
                )?,
                tagged_templates: compile(
                    Grammar::TypeScript,
                    "taggedTemplates",
                    TS_TAGGED_TEMPLATES,
                )?,
                exports: compile(Grammar::TypeScript, "exports", TS_EXPORTS)?,
                functions: compile(Grammar::TypeScript, "functions", TS_FUNCTIONS)?,
                variables: compile(Grammar::TypeScript, "variables", TS_VARIABLES)?,
                comments: compile(Grammar::TypeScript, "comments", TS_COMMENTS)?,
            },
            css: CssQueries {
                custom_properties: compile(
                    Grammar::Css,
                    "cssCustomProperties",
                    CSS_CUSTOM_PROPERTIES,
                )?,
            },
            html: HtmlQueries {
                slots_and_parts: compile(Grammar::Html, "slotsAndParts", HTML_SLOTS_AND_PARTS)?,
            },
            jsdoc: JsdocQueries {
                document: compile(Grammar::Jsdoc, "jsdoc", JSDOC_DOCUMENT)?,
            },
        })
    }
}

fn compile(grammar: Grammar, name: &str, source: &str) -> Result<Query> {
    Query::new(&grammar.language(), source).map_err(|e| Error::QueryCompile {
        name: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_catalog_compiles() {
        let manager = QueryManager::new().unwrap();
        assert!(
            manager
                .typescript
                .imports
                .capture_names()
                .contains(&"import.source")
        );
        assert!(
            manager
                .css
                .custom_properties
                .capture_names()
                .contains(&"property.name")
        );
        assert!(
            manager
                .html
                .slots_and_parts
                .capture_names()
                .contains(&"slot.tag")
        );
        assert!(manager.jsdoc.document.capture_names().contains(&"tag.name"));
    }
}
