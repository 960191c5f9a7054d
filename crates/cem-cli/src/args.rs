use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the cem binary.
#[derive(Parser, Debug, Default)]
#[command(
    name = "cem",
    version,
    about = "Generate a custom elements manifest from TypeScript sources"
)]
pub struct CliArgs {
    /// Path to the configuration file (default: .config/cem.yaml).
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Workspace root directory (default: current directory).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Manifest output path; overrides the configured one.
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Watch input files and regenerate on changes.
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,

    /// Extra input globs, appended to the configured ones.
    #[arg(value_name = "GLOB")]
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let args = CliArgs::parse_from(["cem"]);
        assert!(!args.watch);
        assert!(args.config.is_none());
        assert!(args.files.is_empty());
    }

    #[test]
    fn flags_and_globs_parse() {
        let args = CliArgs::parse_from([
            "cem",
            "--watch",
            "-o",
            "dist/custom-elements.json",
            "src/**/*.ts",
        ]);
        assert!(args.watch);
        assert_eq!(args.output.as_deref(), Some("dist/custom-elements.json"));
        assert_eq!(args.files, ["src/**/*.ts"]);
    }
}
