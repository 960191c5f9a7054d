//! The generate driver: configuration to manifest on disk.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use cem_common::CancelToken;
use cem_generate::GenerateSession;
use cem_schema::Package;
use cem_workspace::{Workspace, load_config};

use crate::args::CliArgs;
use crate::watch::WatchSession;

/// Default output path when watch mode needs one and none is configured.
const DEFAULT_WATCH_OUTPUT: &str = "custom-elements.json";

pub fn run(args: CliArgs) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let mut config = load_config(&root, args.config.as_deref())?;
    if let Some(output) = &args.output {
        config.generate.output = Some(output.clone());
    }
    config.generate.files.extend(args.files.iter().cloned());

    let workspace = Arc::new(Workspace::new(root, config)?);
    let session = Arc::new(GenerateSession::new(Arc::clone(&workspace))?);
    tracing::debug!(workers = session.worker_count(), "session ready");

    // Output precedence: flag/config, then the package.json
    // customElements field, then (in watch mode) the conventional name.
    let mut output = workspace.config().generate.output.clone().or_else(|| {
        workspace
            .package_json()
            .and_then(|package| package.custom_elements)
    });
    if args.watch && output.is_none() {
        tracing::info!("no output configured; watch mode writes {DEFAULT_WATCH_OUTPUT}");
        output = Some(DEFAULT_WATCH_OUTPUT.to_string());
    }

    let token = CancelToken::new();
    let errors = session.generate_full_manifest(&token)?;
    for error in errors.iter() {
        tracing::warn!(%error, "generation");
    }

    let Some(manifest) = session.in_memory_manifest() else {
        bail!("full build produced no manifest");
    };
    match &output {
        Some(output) => {
            write_manifest(&workspace, output, &manifest)?;
            tracing::info!(%output, modules = manifest.modules.len(), "manifest written");
        }
        None => {
            let text = manifest.to_json_pretty()?;
            std::io::stdout().write_all(text.as_bytes())?;
        }
    }

    if args.watch {
        WatchSession::new(session, output)?.run()?;
    }
    Ok(())
}

/// Serialize and write the manifest, ending with a single newline.
pub(crate) fn write_manifest(
    workspace: &Workspace,
    output: &str,
    manifest: &Package,
) -> Result<Vec<u8>> {
    let text = manifest.to_json_pretty()?;
    let mut writer = workspace.output_writer(output)?;
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn end_to_end_generate_writes_manifest() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("my-el.ts"),
            "import { LitElement } from 'lit';\n\
             import { customElement } from 'lit/decorators.js';\n\n\
             @customElement('my-el')\n\
             export class MyEl extends LitElement {}\n",
        )
        .unwrap();
        std::fs::create_dir_all(temp.path().join(".config")).unwrap();
        std::fs::write(
            temp.path().join(".config/cem.yaml"),
            "generate:\n  files:\n    - \"src/**/*.ts\"\n  output: custom-elements.json\n",
        )
        .unwrap();

        let args = CliArgs {
            root: Some(temp.path().to_path_buf()),
            ..CliArgs::default()
        };
        run(args).unwrap();

        let written = std::fs::read_to_string(temp.path().join("custom-elements.json")).unwrap();
        assert!(written.ends_with('\n'));
        let manifest: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(manifest["schemaVersion"], "2.1.0");
        assert_eq!(manifest["modules"][0]["path"], "src/my-el.ts");
        assert_eq!(
            manifest["modules"][0]["declarations"][0]["tagName"],
            "my-el"
        );
    }
}
