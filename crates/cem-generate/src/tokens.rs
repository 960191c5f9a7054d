//! Design-token enrichment.
//!
//! Reads a DTCG-style design-tokens JSON (nested groups, `$value` /
//! `$description` / `$type` leaves) and annotates matching CSS custom
//! properties across the manifest. A property matches when its name is
//! `--<prefix>-<dash-joined token path>`.

use rustc_hash::FxHashMap;
use serde_json::Value;

use cem_common::{Error, ErrorList};
use cem_schema::{Declaration, Package};
use cem_workspace::Workspace;

#[derive(Debug, Clone)]
struct Token {
    description: Option<String>,
    syntax: Option<String>,
}

/// Annotate the package's CSS custom properties from the configured token
/// spec. No-op without configuration; failures surface as errors but never
/// drop modules.
pub fn apply_design_tokens(workspace: &Workspace, package: &mut Package) -> ErrorList {
    let mut errors = ErrorList::new();
    let Some(config) = workspace.config().generate.design_tokens.clone() else {
        return errors;
    };

    let spec_path = workspace.module_path_to_fs(&config.spec);
    let text = match std::fs::read_to_string(&spec_path) {
        Ok(text) => text,
        Err(error) => {
            errors.push(Error::file_read("read design tokens", spec_path, error));
            return errors;
        }
    };
    let document: Value = match serde_json::from_str(&text) {
        Ok(document) => document,
        Err(error) => {
            errors.push(Error::other(format!(
                "design tokens {}: {error}",
                spec_path.display()
            )));
            return errors;
        }
    };

    let mut tokens = FxHashMap::default();
    flatten_tokens(&document, &config.prefix, &mut Vec::new(), &mut tokens);
    tracing::debug!(tokens = tokens.len(), "design tokens loaded");

    for module in &mut package.modules {
        for declaration in &mut module.declarations {
            let Declaration::CustomElement(element) = declaration else {
                continue;
            };
            for property in &mut element.css_properties {
                let Some(token) = tokens.get(&property.name) else {
                    continue;
                };
                if let Some(description) = &token.description {
                    property.description = Some(match &property.description {
                        Some(existing) => format!("{existing}\n\n{description}"),
                        None => description.clone(),
                    });
                }
                if property.syntax.is_none() {
                    property.syntax = token.syntax.clone();
                }
            }
        }
    }
    errors
}

fn flatten_tokens(
    value: &Value,
    prefix: &str,
    path: &mut Vec<String>,
    out: &mut FxHashMap<String, Token>,
) {
    let Some(object) = value.as_object() else {
        return;
    };
    if object.contains_key("$value") {
        let name = format!("--{prefix}-{}", path.join("-"));
        out.insert(
            name,
            Token {
                description: object
                    .get("$description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                syntax: object
                    .get("$type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        );
        return;
    }
    for (key, child) in object {
        if key.starts_with('$') {
            continue;
        }
        path.push(key.clone());
        flatten_tokens(child, prefix, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_schema::{
        ClassDeclaration, CssCustomProperty, CustomElementDeclaration, Module,
    };
    use cem_workspace::{Config, DesignTokensConfig, GenerateConfig};
    use tempfile::TempDir;

    fn package_with_property(name: &str) -> Package {
        let mut element = CustomElementDeclaration::new(ClassDeclaration {
            name: "El".into(),
            ..ClassDeclaration::default()
        });
        element.tag_name = Some("x-el".into());
        element.css_properties.push(CssCustomProperty {
            name: name.into(),
            ..CssCustomProperty::default()
        });
        let mut module = Module::new("src/el.ts");
        module.declarations.push(Declaration::CustomElement(element));
        Package::new(vec![module])
    }

    #[test]
    fn matching_property_gains_description_and_syntax() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("tokens.json"),
            r##"{ "color": { "primary": {
                "$value": "#663399",
                "$description": "Brand primary",
                "$type": "color"
            } } }"##,
        )
        .unwrap();
        let config = Config {
            generate: GenerateConfig {
                design_tokens: Some(DesignTokensConfig {
                    spec: "tokens.json".into(),
                    prefix: "token".into(),
                }),
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Workspace::new(temp.path(), config).unwrap();

        let mut package = package_with_property("--token-color-primary");
        let errors = apply_design_tokens(&workspace, &mut package);
        assert!(errors.is_empty());

        let Declaration::CustomElement(element) = &package.modules[0].declarations[0] else {
            panic!("expected custom element");
        };
        let property = &element.css_properties[0];
        assert_eq!(property.description.as_deref(), Some("Brand primary"));
        assert_eq!(property.syntax.as_deref(), Some("color"));
    }

    #[test]
    fn missing_spec_surfaces_error_and_keeps_modules() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            generate: GenerateConfig {
                design_tokens: Some(DesignTokensConfig {
                    spec: "absent.json".into(),
                    prefix: "token".into(),
                }),
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Workspace::new(temp.path(), config).unwrap();
        let mut package = package_with_property("--token-x");
        let errors = apply_design_tokens(&workspace, &mut package);
        assert_eq!(errors.len(), 1);
        assert_eq!(package.modules.len(), 1);
    }

    #[test]
    fn non_matching_properties_are_untouched() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("tokens.json"),
            r#"{ "gap": { "$value": "4px" } }"#,
        )
        .unwrap();
        let config = Config {
            generate: GenerateConfig {
                design_tokens: Some(DesignTokensConfig {
                    spec: "tokens.json".into(),
                    prefix: "token".into(),
                }),
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Workspace::new(temp.path(), config).unwrap();
        let mut package = package_with_property("--unrelated");
        apply_design_tokens(&workspace, &mut package);

        let Declaration::CustomElement(element) = &package.modules[0].declarations[0] else {
            panic!("expected custom element");
        };
        assert!(element.css_properties[0].description.is_none());
    }
}
