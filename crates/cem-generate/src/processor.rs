//! The module processor: one source file in, one manifest module out.
//!
//! Errors never abort a module; everything extractable is kept and the
//! aggregated error list travels alongside the partial module.

use once_cell::unsync::OnceCell;
use rustc_hash::FxHashMap;

use cem_common::{Error, ErrorList, LineMap};
use cem_query::{CaptureGroup, CaptureMap, CaptureRecord, Grammar, parent_captures};
use cem_schema::{
    Attribute, ClassDeclaration, ClassField, ClassMember, CssCustomProperty,
    CustomElementDeclaration, Declaration, Export, FunctionDeclaration, Method, Module, Reference,
    Return, SourceReference, Type, VariableDeclaration,
};
use cem_workspace::Workspace;

use crate::jsdoc::{self, JsdocInfo};
use crate::members::{AttributeOption, derive_attribute_name, parse_parameters, privacy_of};
use crate::setup::SetupContext;
use crate::source_refs::source_href;
use crate::styles::{StyleCache, StyleSource, resolve_style_sources};
use crate::template::extract_template_features;

/// What one processing job produced.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub module: Module,
    /// Module paths of imported `.css` files (feeds the reverse edge).
    pub style_imports: Vec<String>,
    /// Module paths of all resolved relative imports (forward edges).
    pub imported_files: Vec<String>,
    pub errors: ErrorList,
}

/// A local name bound to a style source during import scanning.
enum StyleBinding {
    /// `import sheet from './styles.css'`
    CssFile(String),
    /// `const styles = css\`...\``
    CssTemplate { css: String, offset: u32 },
}

pub struct ModuleProcessor<'a> {
    setup: &'a SetupContext,
    workspace: &'a Workspace,
    style_cache: &'a StyleCache,
    module_path: String,
    source: String,
    line_map: OnceCell<LineMap>,
    style_bindings: FxHashMap<String, StyleBinding>,
}

impl<'a> ModuleProcessor<'a> {
    pub fn new(
        setup: &'a SetupContext,
        workspace: &'a Workspace,
        style_cache: &'a StyleCache,
        module_path: impl Into<String>,
        source: String,
    ) -> Self {
        Self {
            setup,
            workspace,
            style_cache,
            module_path: module_path.into(),
            source,
            line_map: OnceCell::new(),
            style_bindings: FxHashMap::default(),
        }
    }

    /// Extract the module. Always returns a module, however partial.
    pub fn process(mut self) -> ProcessOutcome {
        let mut module = Module::new(self.module_path.clone());
        let mut errors = ErrorList::new();

        let tree = match self.setup.pools.parse(Grammar::TypeScript, self.source.as_bytes()) {
            Ok(tree) => tree,
            Err(error) => {
                errors.push(Error::module(&self.module_path, error));
                return ProcessOutcome {
                    module,
                    style_imports: Vec::new(),
                    imported_files: Vec::new(),
                    errors,
                };
            }
        };
        let root = tree.root_node();
        let source = self.source.clone();
        let bytes = source.as_bytes();
        // `setup` outlives `self`; borrowing through it directly keeps the
        // query references independent of the `&mut self` scans below.
        let setup = self.setup;
        let queries = &setup.queries.typescript;

        let comments: Vec<CaptureRecord> =
            CaptureMap::collect(&queries.comments, root, bytes, None)
                .all("comment")
                .to_vec();

        // 1. Imports: forward deps plus the style-binding map.
        let (style_imports, imported_files) = self.scan_imports(root, bytes);

        // 2. Local `css` tagged-template bindings.
        self.scan_template_bindings(root, bytes);

        // 3. Top-level customElements.define calls.
        let defines = self.scan_defines(root, bytes);

        // 4. Decorators, associated to their classes below.
        let decorators = parent_captures(&queries.decorators, root, bytes, "decorator", None);

        // 5. Classes.
        let classes = parent_captures(&queries.classes, root, bytes, "class", None);
        let class_ranges: Vec<(u32, u32)> = classes
            .iter()
            .map(|c| (c.anchor.start_byte, c.anchor.end_byte))
            .collect();
        // Declarations carry their anchor byte until the final source-order
        // sort.
        let mut declarations: Vec<(u32, Declaration)> = Vec::new();
        let mut used_tags: Vec<String> = Vec::new();
        for class in &classes {
            match self.process_class(
                root,
                bytes,
                class,
                &class_ranges,
                &decorators,
                &defines,
                &comments,
                &mut errors,
            ) {
                Some(declaration) => {
                    if let Declaration::CustomElement(decl) = &declaration {
                        if let Some(tag) = &decl.tag_name {
                            if used_tags.contains(tag) {
                                errors.push(Error::component(
                                    "custom element",
                                    decl.class.name.clone(),
                                    Error::other(format!(
                                        "tag name '{tag}' is already declared in this module"
                                    )),
                                ));
                                // Keep the class, drop the duplicate binding.
                                declarations.push((
                                    class.anchor.start_byte,
                                    Declaration::Class(decl.class.clone()),
                                ));
                                continue;
                            }
                            used_tags.push(tag.clone());
                        }
                    }
                    declarations.push((class.anchor.start_byte, declaration));
                }
                None => continue,
            }
        }

        // 6. Exported functions and variables.
        let export_names = self.scan_exports(root, bytes);
        self.collect_functions(root, bytes, &comments, &export_names, &mut declarations);
        self.collect_variables(root, bytes, &comments, &export_names, &mut declarations);

        declarations.sort_by_key(|(start, _)| *start);
        module.declarations = declarations
            .into_iter()
            .map(|(_, declaration)| declaration)
            .collect();

        // 7. Exports: definitions first, then js exports in source order.
        for declaration in &module.declarations {
            if let Declaration::CustomElement(decl) = declaration {
                if let Some(tag) = &decl.tag_name {
                    module.exports.push(Export::CustomElementDefinition {
                        name: tag.clone(),
                        declaration: Reference::local(&decl.class.name, &self.module_path),
                    });
                }
            }
        }
        for (exported, local) in &export_names {
            module.exports.push(Export::JavaScript {
                name: exported.clone(),
                declaration: Reference::local(local, &self.module_path),
            });
        }

        ProcessOutcome {
            module,
            style_imports,
            imported_files,
            errors,
        }
    }

    fn scan_imports(
        &mut self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
    ) -> (Vec<String>, Vec<String>) {
        let mut style_imports = Vec::new();
        let mut imported_files = Vec::new();
        let queries = &self.setup.queries.typescript;

        for import in parent_captures(&queries.imports, root, bytes, "import", None) {
            let Some(spec) = import.first("import.source") else {
                continue;
            };
            let Some(resolved) = self
                .workspace
                .resolve_module_dependency(&self.module_path, &spec.text)
            else {
                continue;
            };
            if !imported_files.contains(&resolved) {
                imported_files.push(resolved.clone());
            }
            if spec.text.ends_with(".css") {
                if !style_imports.contains(&resolved) {
                    style_imports.push(resolved.clone());
                }
                for binding in import
                    .all("import.default")
                    .iter()
                    .chain(import.all("import.named"))
                {
                    self.style_bindings
                        .insert(binding.text.clone(), StyleBinding::CssFile(resolved.clone()));
                }
            }
        }
        (style_imports, imported_files)
    }

    fn scan_template_bindings(&mut self, root: tree_sitter::Node<'_>, bytes: &[u8]) {
        let queries = &self.setup.queries.typescript;
        for variable in parent_captures(&queries.variables, root, bytes, "variable", None) {
            let (Some(name), Some(value)) =
                (variable.first("variable.name"), variable.first("variable.value"))
            else {
                continue;
            };
            let templates = parent_captures(
                &queries.tagged_templates,
                root,
                bytes,
                "template",
                Some((value.start_byte, value.end_byte)),
            );
            for template in templates {
                let (Some(tag), Some(string)) =
                    (template.first("template.tag"), template.first("template.string"))
                else {
                    continue;
                };
                if tag.text == "css" {
                    let (css, offset) = strip_template_record(string);
                    self.style_bindings.insert(
                        name.text.clone(),
                        StyleBinding::CssTemplate { css, offset },
                    );
                }
            }
        }
    }

    /// `(tag, class identifier, call start byte)` for each define call.
    fn scan_defines(&self, root: tree_sitter::Node<'_>, bytes: &[u8]) -> Vec<(String, String)> {
        let queries = &self.setup.queries.typescript;
        let mut defines = Vec::new();
        for define in parent_captures(&queries.custom_elements_define, root, bytes, "define", None)
        {
            let object = define.first("define.object").map(|r| r.text.as_str());
            let property = define.first("define.property").map(|r| r.text.as_str());
            if object != Some("customElements") || property != Some("define") {
                continue;
            }
            if let (Some(tag), Some(class)) =
                (define.first("define.tag"), define.first("define.class"))
            {
                defines.push((tag.text.clone(), class.text.clone()));
            }
        }
        defines
    }

    fn process_class(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        class: &CaptureGroup,
        class_ranges: &[(u32, u32)],
        decorators: &[CaptureGroup],
        defines: &[(String, String)],
        comments: &[CaptureRecord],
        errors: &mut ErrorList,
    ) -> Option<Declaration> {
        let name = match class.required("class.name", "classes") {
            Ok(name) => name.clone(),
            Err(error) => {
                errors.push(Error::module(&self.module_path, error));
                return None;
            }
        };
        let range = (class.anchor.start_byte, class.anchor.end_byte);

        // Decorators addressed at this class (not at one of its members).
        let class_decorators: Vec<&CaptureGroup> = decorators
            .iter()
            .filter(|d| decorator_targets_class(d, &name, range, class_ranges))
            .collect();

        // The JSDoc block sits above any decorators.
        let doc_anchor = class_decorators
            .iter()
            .map(|d| d.anchor.start_byte)
            .min()
            .unwrap_or(range.0);
        let doc = self.adjacent_doc(comments, doc_anchor, errors);

        let mut decl = ClassDeclaration {
            name: name.text.clone(),
            summary: doc.summary.clone(),
            description: doc.description.clone(),
            deprecated: doc.deprecated.clone(),
            superclass: class
                .first("class.superclass")
                .map(|s| Reference {
                    name: s.text.clone(),
                    module: None,
                }),
            ..ClassDeclaration::default()
        };
        if let Some(href) = self.declaration_href(range.0, errors) {
            decl.source = Some(SourceReference { href });
        }

        // Members and field-derived attributes.
        let mut attributes: Vec<Attribute> = Vec::new();
        self.collect_members(root, bytes, range, comments, &mut decl, &mut attributes, errors);

        // Tag binding: the decorator wins over customElements.define.
        let decorator_tag = class_decorators.iter().find_map(|d| {
            (d.first("decorator.name")?.text == "customElement")
                .then(|| d.first("decorator.string").map(|s| s.text.clone()))
                .flatten()
        });
        let define_tag = defines
            .iter()
            .find(|(_, class_name)| *class_name == name.text)
            .map(|(tag, _)| tag.clone());
        let tag = match (&decorator_tag, &define_tag) {
            (Some(decorated), Some(defined)) if decorated != defined => {
                errors.push(Error::component(
                    "custom element",
                    name.text.clone(),
                    Error::other(format!(
                        "decorator tag '{decorated}' conflicts with customElements.define '{defined}'"
                    )),
                ));
                decorator_tag.clone()
            }
            (Some(_), _) => decorator_tag.clone(),
            (None, Some(_)) => define_tag,
            (None, None) => None,
        };

        let Some(tag) = tag else {
            return Some(Declaration::Class(decl));
        };

        let mut element = CustomElementDeclaration::new(decl);
        element.tag_name = Some(tag);
        element.attributes = attributes;

        // Class JSDoc contributes element features alongside the template.
        element.events = doc.events.clone();
        element.css_states = doc.css_states.clone();
        merge_jsdoc_attributes(&mut element.attributes, &doc.attributes);

        // static styles -> CSS custom properties.
        self.collect_styles(root, bytes, range, &doc, &mut element, errors);

        // render() template -> slots and parts, enriched by class JSDoc.
        self.collect_template_features(root, bytes, range, &doc, &mut element, errors);

        element.sort_features();
        Some(Declaration::CustomElement(element))
    }

    fn collect_members(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        range: (u32, u32),
        comments: &[CaptureRecord],
        decl: &mut ClassDeclaration,
        attributes: &mut Vec<Attribute>,
        errors: &mut ErrorList,
    ) {
        let queries = &self.setup.queries.typescript;
        let decorators = parent_captures(&queries.decorators, root, bytes, "decorator", Some(range));

        for field in parent_captures(&queries.class_members, root, bytes, "field", Some(range)) {
            let Some(name) = field.first("field.name") else {
                continue;
            };
            let is_static = field.first("field.static").is_some();
            if is_static && name.text == "styles" {
                continue; // infrastructure, resolved through the style pass
            }

            // @property / @state on this field. Depending on grammar
            // version a member decorator is a child of the definition or a
            // sibling directly before it; accept both shapes.
            let field_range = (field.anchor.start_byte, field.anchor.end_byte);
            let property = decorators.iter().find(|d| {
                self.decorator_targets_member(d, field_range)
                    && d.first("decorator.name")
                        .is_some_and(|n| n.text == "property" || n.text == "state")
            });

            let doc_anchor = property
                .map(|d| d.anchor.start_byte.min(field_range.0))
                .unwrap_or(field_range.0);
            let doc = self.adjacent_doc(comments, doc_anchor, errors);

            let mut class_field = ClassField {
                name: name.text.clone(),
                static_: is_static,
                privacy: privacy_of(
                    &name.text,
                    field.first("field.access").map(|a| a.text.as_str()),
                ),
                type_: field.first("field.type").map(|t| Type::new(&t.text)),
                default: field.first("field.value").map(|v| v.text.clone()),
                summary: doc.summary.clone(),
                description: doc.description.clone(),
                deprecated: doc.deprecated.clone(),
                ..ClassField::default()
            };

            if let Some(property) = property {
                let is_state = property
                    .first("decorator.name")
                    .is_some_and(|n| n.text == "state");
                let (attribute_option, reflects) =
                    self.decorator_property_options(root, bytes, property);
                if !is_state {
                    if let Some(attribute_name) =
                        derive_attribute_name(&name.text, attribute_option.as_ref())
                    {
                        class_field.attribute = Some(attribute_name.clone());
                        class_field.reflects = reflects.then_some(true);
                        attributes.push(Attribute {
                            name: attribute_name,
                            field_name: Some(name.text.clone()),
                            type_: class_field.type_.clone(),
                            default: class_field.default.clone(),
                            reflects: reflects.then_some(true),
                            summary: class_field.summary.clone(),
                            description: class_field.description.clone(),
                            deprecated: class_field.deprecated.clone(),
                        });
                    }
                }
            }
            decl.members.push(ClassMember::Field(class_field));
        }

        let mut getter_names: Vec<String> = Vec::new();
        for method in parent_captures(&queries.class_members, root, bytes, "method", Some(range)) {
            let Some(name) = method.first("method.name") else {
                continue;
            };
            if name.text == "constructor" {
                continue;
            }
            let doc = self.adjacent_doc(comments, method.anchor.start_byte, errors);
            let privacy = privacy_of(
                &name.text,
                method.first("method.access").map(|a| a.text.as_str()),
            );
            let is_static = method.first("method.static").is_some();

            if method.first("method.getter").is_some() {
                // Accessors surface as fields.
                if getter_names.contains(&name.text) {
                    continue;
                }
                getter_names.push(name.text.clone());
                decl.members.push(ClassMember::Field(ClassField {
                    name: name.text.clone(),
                    static_: is_static,
                    privacy,
                    type_: method.first("method.return").map(|r| Type::new(&r.text)),
                    summary: doc.summary.clone(),
                    description: doc.description.clone(),
                    deprecated: doc.deprecated.clone(),
                    ..ClassField::default()
                }));
                continue;
            }
            if method.first("method.setter").is_some() {
                continue; // the getter half carries the accessor
            }

            let mut parameters = method
                .first("method.params")
                .map(|p| parse_parameters(&p.text))
                .unwrap_or_default();
            for parameter in &mut parameters {
                if let Some(param_doc) = doc.params.iter().find(|p| p.name == parameter.name) {
                    parameter.description = param_doc.description.clone();
                    if parameter.type_.is_none() {
                        parameter.type_ = param_doc.type_.clone().map(Type::new);
                    }
                }
            }
            let return_ = match (method.first("method.return"), &doc.returns) {
                (Some(annotated), doc_return) => Some(Return {
                    type_: Some(Type::new(&annotated.text)),
                    description: doc_return.as_ref().and_then(|r| r.description.clone()),
                }),
                (None, Some(doc_return)) => Some(Return {
                    type_: doc_return.type_.clone().map(Type::new),
                    description: doc_return.description.clone(),
                }),
                (None, None) => None,
            };

            decl.members.push(ClassMember::Method(Method {
                name: name.text.clone(),
                static_: is_static,
                privacy,
                parameters,
                return_,
                summary: doc.summary.clone(),
                description: doc.description.clone(),
                deprecated: doc.deprecated.clone(),
                ..Method::default()
            }));
        }
    }

    /// `(attribute option, reflects)` from a `@property({...})` decorator.
    fn decorator_property_options(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        decorator: &CaptureGroup,
    ) -> (Option<AttributeOption>, bool) {
        let queries = &self.setup.queries.typescript;
        let Some(arguments) = decorator.first("decorator.arguments") else {
            return (None, false);
        };
        let mut attribute = None;
        let mut reflects = false;
        for option in parent_captures(
            &queries.decorator_options,
            root,
            bytes,
            "option",
            Some((arguments.start_byte, arguments.end_byte)),
        ) {
            let (Some(key), Some(value)) = (option.first("option.key"), option.first("option.value"))
            else {
                continue;
            };
            match key.text.as_str() {
                "attribute" => {
                    attribute = if value.text == "false" {
                        Some(AttributeOption::Suppressed)
                    } else {
                        Some(AttributeOption::Named(unquote(&value.text)))
                    };
                }
                "reflect" => reflects = value.text == "true",
                _ => {}
            }
        }
        (attribute, reflects)
    }

    fn collect_styles(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        range: (u32, u32),
        doc: &JsdocInfo,
        element: &mut CustomElementDeclaration,
        errors: &mut ErrorList,
    ) {
        let queries = &self.setup.queries.typescript;
        let mut inline: Vec<(String, u32)> = Vec::new();
        let mut files: Vec<std::path::PathBuf> = Vec::new();

        for styles in parent_captures(&queries.static_styles, root, bytes, "styles", Some(range)) {
            if styles.first("styles.name").is_none_or(|n| n.text != "styles") {
                continue;
            }
            let tags = styles.all("styles.tag");
            for template in styles.all("styles.template") {
                let tagged_css = tags
                    .iter()
                    .filter(|t| t.end_byte <= template.start_byte)
                    .next_back()
                    .is_some_and(|t| t.text == "css");
                if tagged_css {
                    let (css, offset) = strip_template_record(template);
                    inline.push((css, offset));
                }
            }
            for reference in styles.all("styles.reference") {
                match self.style_bindings.get(&reference.text) {
                    Some(StyleBinding::CssFile(module_path)) => {
                        files.push(self.workspace.module_path_to_fs(module_path));
                    }
                    Some(StyleBinding::CssTemplate { css, offset }) => {
                        inline.push((css.clone(), *offset));
                    }
                    None => {
                        // A binding we cannot resolve in this module; skip
                        // without error.
                        tracing::trace!(
                            module = %self.module_path,
                            binding = %reference.text,
                            "unresolved style binding"
                        );
                    }
                }
            }
        }

        let mut sources: Vec<StyleSource<'_>> = Vec::new();
        for (css, offset) in &inline {
            sources.push(StyleSource::Inline {
                css,
                offset: *offset,
            });
        }
        for path in &files {
            sources.push(StyleSource::File(path));
        }
        let (merged, style_errors) = resolve_style_sources(self.setup, self.style_cache, &sources);
        for error in style_errors.0 {
            errors.push(Error::module(&self.module_path, error));
        }

        let mut properties: Vec<CssCustomProperty> = merged.into_values().collect();
        // Class JSDoc @cssprop entries enrich parsed properties or add new
        // ones.
        for doc_property in &doc.css_properties {
            match properties.iter_mut().find(|p| p.name == doc_property.name) {
                Some(existing) => {
                    if existing.summary.is_none() {
                        existing.summary = doc_property.summary.clone();
                    }
                    if existing.description.is_none() {
                        existing.description = doc_property.description.clone();
                    }
                    if existing.default.is_none() {
                        existing.default = doc_property.default.clone();
                    }
                    if existing.deprecated.is_none() {
                        existing.deprecated = doc_property.deprecated.clone();
                    }
                }
                None => properties.push(doc_property.clone()),
            }
        }
        element.css_properties = properties;
    }

    fn collect_template_features(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        range: (u32, u32),
        doc: &JsdocInfo,
        element: &mut CustomElementDeclaration,
        errors: &mut ErrorList,
    ) {
        let queries = &self.setup.queries.typescript;
        for render in parent_captures(&queries.render_template, root, bytes, "render", Some(range))
        {
            let name_ok = render.first("render.name").is_some_and(|n| n.text == "render");
            let tag_ok = render.first("render.tag").is_some_and(|t| t.text == "html");
            if !name_ok || !tag_ok {
                continue;
            }
            let Some(template) = render.first("render.template") else {
                continue;
            };
            let (html, offset) = strip_template_record(template);
            let (features, template_errors) =
                extract_template_features(self.setup, &html, offset);
            for error in template_errors.0 {
                errors.push(Error::module(&self.module_path, error));
            }
            element.slots.extend(features.slots);
            element.css_parts.extend(features.parts);
        }

        // Class JSDoc slots/parts merge in addition to the template's.
        for doc_slot in &doc.slots {
            match element.slots.iter_mut().find(|s| s.name == doc_slot.name) {
                Some(existing) => {
                    if existing.description.is_none() {
                        existing.description = doc_slot.description.clone();
                    }
                    if existing.summary.is_none() {
                        existing.summary = doc_slot.summary.clone();
                    }
                }
                None => element.slots.push(doc_slot.clone()),
            }
        }
        for doc_part in &doc.css_parts {
            match element.css_parts.iter_mut().find(|p| p.name == doc_part.name) {
                Some(existing) => {
                    if existing.description.is_none() {
                        existing.description = doc_part.description.clone();
                    }
                    if existing.summary.is_none() {
                        existing.summary = doc_part.summary.clone();
                    }
                }
                None => element.css_parts.push(doc_part.clone()),
            }
        }
    }

    /// Exported names: `(exported name, local name)` in source order.
    fn scan_exports(&self, root: tree_sitter::Node<'_>, bytes: &[u8]) -> Vec<(String, String)> {
        let queries = &self.setup.queries.typescript;
        let mut names = Vec::new();
        for export in parent_captures(&queries.exports, root, bytes, "export", None) {
            for capture in ["export.class", "export.function", "export.variable"] {
                for record in export.all(capture) {
                    push_unique(&mut names, (record.text.clone(), record.text.clone()));
                }
            }
            // Pair aliases with their specifier by byte position; not every
            // specifier carries one.
            let aliases = export.all("export.alias");
            let named = export.all("export.named");
            for (i, record) in named.iter().enumerate() {
                let limit = named
                    .get(i + 1)
                    .map_or(export.anchor.end_byte, |next| next.start_byte);
                let exported = aliases
                    .iter()
                    .find(|alias| alias.start_byte > record.end_byte && alias.start_byte < limit)
                    .map_or(record.text.clone(), |alias| alias.text.clone());
                push_unique(&mut names, (exported, record.text.clone()));
            }
        }
        names
    }

    fn collect_functions(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        comments: &[CaptureRecord],
        export_names: &[(String, String)],
        declarations: &mut Vec<(u32, Declaration)>,
    ) {
        let queries = &self.setup.queries.typescript;
        let mut errors = ErrorList::new();
        for function in parent_captures(&queries.functions, root, bytes, "function", None) {
            let Some(name) = function.first("function.name") else {
                continue;
            };
            if !export_names.iter().any(|(_, local)| *local == name.text) {
                continue;
            }
            let doc = self.adjacent_doc(comments, function.anchor.start_byte, &mut errors);
            let mut parameters = function
                .first("function.params")
                .map(|p| parse_parameters(&p.text))
                .unwrap_or_default();
            for parameter in &mut parameters {
                if let Some(param_doc) = doc.params.iter().find(|p| p.name == parameter.name) {
                    parameter.description = param_doc.description.clone();
                }
            }
            let mut declaration = FunctionDeclaration {
                name: name.text.clone(),
                parameters,
                return_: function.first("function.return").map(|r| Return {
                    type_: Some(Type::new(&r.text)),
                    description: doc.returns.as_ref().and_then(|d| d.description.clone()),
                }),
                summary: doc.summary,
                description: doc.description,
                deprecated: doc.deprecated,
                ..FunctionDeclaration::default()
            };
            if let Some(href) = self.declaration_href(function.anchor.start_byte, &mut errors) {
                declaration.source = Some(SourceReference { href });
            }
            declarations.push((
                function.anchor.start_byte,
                Declaration::Function(declaration),
            ));
        }
        // Doc errors on functions are non-fatal and rare; keep them quiet.
        for error in errors.0 {
            tracing::debug!(%error, module = %self.module_path, "function doc error");
        }
    }

    fn collect_variables(
        &self,
        root: tree_sitter::Node<'_>,
        bytes: &[u8],
        comments: &[CaptureRecord],
        export_names: &[(String, String)],
        declarations: &mut Vec<(u32, Declaration)>,
    ) {
        let queries = &self.setup.queries.typescript;
        let mut errors = ErrorList::new();
        for variable in parent_captures(&queries.variables, root, bytes, "variable", None) {
            let Some(name) = variable.first("variable.name") else {
                continue;
            };
            if !export_names.iter().any(|(_, local)| *local == name.text) {
                continue;
            }
            let doc = self.adjacent_doc(comments, variable.anchor.start_byte, &mut errors);
            let mut declaration = VariableDeclaration {
                name: name.text.clone(),
                type_: variable.first("variable.type").map(|t| Type::new(&t.text)),
                default: variable.first("variable.value").map(|v| v.text.clone()),
                summary: doc.summary,
                description: doc.description,
                deprecated: doc.deprecated,
                ..VariableDeclaration::default()
            };
            if let Some(href) = self.declaration_href(variable.anchor.start_byte, &mut errors) {
                declaration.source = Some(SourceReference { href });
            }
            declarations.push((
                variable.anchor.start_byte,
                Declaration::Variable(declaration),
            ));
        }
        for error in errors.0 {
            tracing::debug!(%error, module = %self.module_path, "variable doc error");
        }
    }

    /// A member decorator either lies inside the member's own range or
    /// ends directly before it with nothing but whitespace in between.
    fn decorator_targets_member(&self, decorator: &CaptureGroup, member: (u32, u32)) -> bool {
        let (start, end) = (decorator.anchor.start_byte, decorator.anchor.end_byte);
        if start >= member.0 && end <= member.1 {
            return true;
        }
        if end > member.0 {
            return false;
        }
        self.source[end as usize..member.0 as usize]
            .chars()
            .all(char::is_whitespace)
    }

    /// JSDoc for an anchor: the nearest preceding `/** */` comment with
    /// only whitespace in between.
    fn adjacent_doc(
        &self,
        comments: &[CaptureRecord],
        anchor_start: u32,
        errors: &mut ErrorList,
    ) -> JsdocInfo {
        let candidate = comments
            .iter()
            .rev()
            .find(|comment| comment.end_byte <= anchor_start);
        let Some(comment) = candidate else {
            return JsdocInfo::default();
        };
        if !comment.text.starts_with("/**") {
            return JsdocInfo::default();
        }
        let between = &self.source[comment.end_byte as usize..anchor_start as usize];
        if !between.chars().all(char::is_whitespace) {
            return JsdocInfo::default();
        }
        jsdoc::parse_jsdoc_lenient(self.setup, comment, errors)
    }

    /// Source href for an anchor byte when a source-control root is
    /// configured.
    fn declaration_href(&self, anchor_start: u32, errors: &mut ErrorList) -> Option<String> {
        let base = self
            .workspace
            .config()
            .source_control_root_url
            .as_deref()
            .filter(|base| !base.is_empty())?;
        let line_map = self
            .line_map
            .get_or_init(|| LineMap::build(self.source.as_bytes()));
        match source_href(base, &self.module_path, line_map.line_at(anchor_start)) {
            Ok(href) => Some(href),
            Err(error) => {
                errors.push(Error::module(&self.module_path, error));
                None
            }
        }
    }
}

/// A class decorator either sits inside its class's range (before the class
/// name) or, when hoisted onto an export statement, directly precedes the
/// class with no other class in between.
fn decorator_targets_class(
    decorator: &CaptureGroup,
    class_name: &CaptureRecord,
    class_range: (u32, u32),
    class_ranges: &[(u32, u32)],
) -> bool {
    let (start, end) = (decorator.anchor.start_byte, decorator.anchor.end_byte);
    if start >= class_range.0 && end <= class_range.1 {
        return end <= class_name.start_byte;
    }
    if end > class_range.0 {
        return false;
    }
    // Outside every class: the next class after the decorator must be ours.
    if class_ranges
        .iter()
        .any(|(other_start, other_end)| start >= *other_start && end <= *other_end)
    {
        return false;
    }
    class_ranges
        .iter()
        .filter(|(s, _)| *s >= end)
        .min_by_key(|(s, _)| *s)
        .is_some_and(|(s, _)| *s == class_range.0)
}

fn merge_jsdoc_attributes(attributes: &mut Vec<Attribute>, doc_attributes: &[Attribute]) {
    for doc_attribute in doc_attributes {
        match attributes.iter_mut().find(|a| a.name == doc_attribute.name) {
            Some(existing) => {
                if existing.description.is_none() {
                    existing.description = doc_attribute.description.clone();
                }
                if existing.type_.is_none() {
                    existing.type_ = doc_attribute.type_.clone();
                }
            }
            None => attributes.push(doc_attribute.clone()),
        }
    }
}

/// Strip the backticks off a captured template string; the returned offset
/// translates inner positions back into file coordinates.
fn strip_template_record(record: &CaptureRecord) -> (String, u32) {
    let text = record.text.as_str();
    let inner = text
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
        .unwrap_or(text);
    (inner.to_string(), record.start_byte + 1)
}

fn push_unique(names: &mut Vec<(String, String)>, entry: (String, String)) {
    if !names.contains(&entry) {
        names.push(entry);
    }
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_schema::Deprecated;
    use cem_workspace::Config;
    use tempfile::TempDir;

    fn process(files: &[(&str, &str)], entry: &str, config: Config) -> ProcessOutcome {
        let temp = TempDir::new().unwrap();
        for (name, content) in files {
            let path = temp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
        }
        let workspace = Workspace::new(temp.path(), config).unwrap();
        let setup = SetupContext::new(1).unwrap();
        let cache = StyleCache::new();
        let source = std::fs::read_to_string(temp.path().join(entry)).unwrap();
        ModuleProcessor::new(&setup, &workspace, &cache, entry, source).process()
    }

    fn element(outcome: &ProcessOutcome) -> &CustomElementDeclaration {
        outcome
            .module
            .declarations
            .iter()
            .find_map(Declaration::as_custom_element)
            .expect("expected a custom element declaration")
    }

    #[test]
    fn minimal_decorated_element() {
        let source = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('my-el')
export class MyEl extends LitElement {}
";
        let outcome = process(&[("src/my-el.ts", source)], "src/my-el.ts", Config::default());
        assert!(outcome.errors.is_empty());

        let decl = element(&outcome);
        assert_eq!(decl.tag_name.as_deref(), Some("my-el"));
        assert_eq!(decl.class.name, "MyEl");
        assert_eq!(
            decl.class.superclass.as_ref().map(|s| s.name.as_str()),
            Some("LitElement")
        );

        assert_eq!(outcome.module.exports.len(), 2);
        assert!(matches!(
            &outcome.module.exports[0],
            Export::CustomElementDefinition { name, declaration }
                if name == "my-el" && declaration.name == "MyEl"
        ));
        assert!(matches!(
            &outcome.module.exports[1],
            Export::JavaScript { name, .. } if name == "MyEl"
        ));
    }

    #[test]
    fn reflected_property_derives_attribute() {
        let source = "\
import { LitElement } from 'lit';
import { customElement, property } from 'lit/decorators.js';

@customElement('x-toggle')
export class XToggle extends LitElement {
  @property({reflect: true}) open: boolean = false;
}
";
        let outcome = process(&[("src/toggle.ts", source)], "src/toggle.ts", Config::default());
        let decl = element(&outcome);
        assert_eq!(decl.attributes.len(), 1);
        let attribute = &decl.attributes[0];
        assert_eq!(attribute.name, "open");
        assert_eq!(attribute.field_name.as_deref(), Some("open"));
        assert_eq!(attribute.type_.as_ref().unwrap().text, "boolean");
        assert_eq!(attribute.default.as_deref(), Some("false"));
        assert_eq!(attribute.reflects, Some(true));

        let field = decl
            .class
            .members
            .iter()
            .find_map(|m| match m {
                ClassMember::Field(f) => Some(f),
                ClassMember::Method(_) => None,
            })
            .unwrap();
        assert_eq!(field.attribute.as_deref(), Some("open"));
        assert_eq!(field.reflects, Some(true));
    }

    #[test]
    fn attribute_option_and_suppression() {
        let source = "\
import { LitElement } from 'lit';
import { customElement, property } from 'lit/decorators.js';

@customElement('x-opts')
export class XOpts extends LitElement {
  @property({attribute: 'aria-kind'}) kind = 'plain';
  @property({attribute: false}) hidden = false;
  @property() longName = '';
}
";
        let outcome = process(&[("src/opts.ts", source)], "src/opts.ts", Config::default());
        let decl = element(&outcome);
        let names: Vec<&str> = decl.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["aria-kind", "long-name"]);
    }

    #[test]
    fn css_from_imported_file() {
        let element_source = "\
import styles from './styles.css';
import { LitElement } from 'lit';

export class AEl extends LitElement {
  static styles = styles;
}
customElements.define('a-el', AEl);
";
        let css = ":host{--foo:red;}\n/** @summary red foo */\n";
        let outcome = process(
            &[("src/a-el.ts", element_source), ("src/styles.css", css)],
            "src/a-el.ts",
            Config::default(),
        );
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.style_imports, ["src/styles.css"]);

        let decl = element(&outcome);
        assert_eq!(decl.tag_name.as_deref(), Some("a-el"));
        assert_eq!(decl.css_properties.len(), 1);
        let foo = &decl.css_properties[0];
        assert_eq!(foo.name, "--foo");
        assert_eq!(foo.default.as_deref(), Some("red"));
        assert_eq!(foo.summary.as_deref(), Some("red foo"));
    }

    #[test]
    fn inline_css_template_binding_resolves() {
        let source = "\
import { LitElement, css } from 'lit';

const styles = css`:host { --gap: 4px; }`;

export class GapEl extends LitElement {
  static styles = [styles, css`:host { --pad: 2px; }`];
}
customElements.define('gap-el', GapEl);
";
        let outcome = process(&[("src/gap.ts", source)], "src/gap.ts", Config::default());
        let decl = element(&outcome);
        let names: Vec<&str> = decl.css_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["--gap", "--pad"]);
    }

    #[test]
    fn render_template_slots_and_parts() {
        let source = "\
import { LitElement, html } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('card-el')
export class CardEl extends LitElement {
  render() {
    return html`
      <!-- slot: { summary: \"header slot\", deprecated: \"use heading\" } -->
      <slot name=\"header\"></slot>
      <div part=\"a b\"></div>
    `;
  }
}
";
        let outcome = process(&[("src/card.ts", source)], "src/card.ts", Config::default());
        assert!(outcome.errors.is_empty());
        let decl = element(&outcome);

        assert_eq!(decl.slots.len(), 1);
        assert_eq!(decl.slots[0].name, "header");
        assert_eq!(decl.slots[0].summary.as_deref(), Some("header slot"));
        assert_eq!(
            decl.slots[0].deprecated,
            Some(Deprecated::Reason("use heading".into()))
        );

        let parts: Vec<&str> = decl.css_parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(parts, ["a", "b"]);
    }

    #[test]
    fn class_jsdoc_contributes_element_features() {
        let source = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

/**
 * A busy element.
 * @summary busy
 * @slot footer - sticky footer
 * @cssprop [--busy-color=pink] - spinner color
 * @csspart spinner - the spinner
 * @cssstate loading - shown while loading
 * @fires busy-change - fired when busyness flips
 */
@customElement('busy-el')
export class BusyEl extends LitElement {}
";
        let outcome = process(&[("src/busy.ts", source)], "src/busy.ts", Config::default());
        assert!(outcome.errors.is_empty());
        let decl = element(&outcome);
        assert_eq!(decl.class.summary.as_deref(), Some("busy"));
        assert_eq!(decl.class.description.as_deref(), Some("A busy element."));
        assert_eq!(decl.slots[0].name, "footer");
        assert_eq!(decl.css_properties[0].name, "--busy-color");
        assert_eq!(decl.css_properties[0].default.as_deref(), Some("pink"));
        assert_eq!(decl.css_parts[0].name, "spinner");
        assert_eq!(decl.css_states[0].name, "loading");
        assert_eq!(decl.events[0].name, "busy-change");
    }

    #[test]
    fn decorator_beats_conflicting_define() {
        let source = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('x-one')
export class XEl extends LitElement {}
customElements.define('x-two', XEl);
";
        let outcome = process(&[("src/x.ts", source)], "src/x.ts", Config::default());
        assert_eq!(element(&outcome).tag_name.as_deref(), Some("x-one"));
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors.iter().next().unwrap().to_string().contains("conflicts"));
    }

    #[test]
    fn source_hrefs_point_at_declaration_lines() {
        let source = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('ref-el')
export class RefEl extends LitElement {}
";
        let config = Config {
            source_control_root_url: Some("https://github.com/acme/widgets/tree/main".into()),
            ..Config::default()
        };
        let outcome = process(&[("src/ref.ts", source)], "src/ref.ts", config);
        let decl = element(&outcome);
        let href = decl.class.source.as_ref().unwrap().href.as_str();
        assert_eq!(
            href,
            "https://github.com/acme/widgets/tree/main/src/ref.ts#L5"
        );
    }

    #[test]
    fn exported_function_and_variable_declarations() {
        let source = "\
/** Format a label. */
export function formatLabel(value: string): string {
  return value.trim();
}

export const VERSION: string = '1.0.0';
const internal = 1;
";
        let outcome = process(&[("src/util.ts", source)], "src/util.ts", Config::default());
        let names: Vec<&str> = outcome
            .module
            .declarations
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(names, ["formatLabel", "VERSION"]);
        let exports: Vec<&str> = outcome.module.exports.iter().map(|e| e.name()).collect();
        assert_eq!(exports, ["formatLabel", "VERSION"]);
    }

    #[test]
    fn duplicate_tags_keep_first_binding() {
        let source = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('dup-el')
export class FirstEl extends LitElement {}

@customElement('dup-el')
export class SecondEl extends LitElement {}
";
        let outcome = process(&[("src/dup.ts", source)], "src/dup.ts", Config::default());
        let tags: Vec<_> = outcome
            .module
            .declarations
            .iter()
            .filter_map(Declaration::as_custom_element)
            .filter_map(|d| d.tag_name.as_deref())
            .collect();
        assert_eq!(tags, ["dup-el"]);
        assert_eq!(outcome.errors.len(), 1);
    }
}
