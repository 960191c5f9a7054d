//! Source-control href construction.

use cem_common::{Error, Result};
use url::Url;

/// Build the hosted-source URL for `module_path` at 1-based `line`.
///
/// The base must carry a scheme and host. The fragment is `L<line>`.
pub fn source_href(base: &str, module_path: &str, line: u32) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::other(format!("invalid source control root url '{base}': {e}")))?;
    if url.scheme().is_empty() || url.host_str().is_none() {
        return Err(Error::other(format!(
            "source control root url '{base}' needs a scheme and host"
        )));
    }
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }

    let relative = module_path
        .trim_start_matches("./")
        .trim_start_matches('/');
    let mut joined = url
        .join(relative)
        .map_err(|e| Error::other(format!("cannot resolve '{relative}' against '{base}': {e}")))?;
    joined.set_fragment(Some(&format!("L{line}")));
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_line_anchored_href() {
        let href = source_href(
            "https://github.com/acme/widgets/tree/main",
            "src/my-el.ts",
            42,
        )
        .unwrap();
        assert_eq!(
            href,
            "https://github.com/acme/widgets/tree/main/src/my-el.ts#L42"
        );
    }

    #[test]
    fn trims_leading_dot_slash() {
        let href = source_href("https://example.com/r/", "./src/el.ts", 1).unwrap();
        assert_eq!(href, "https://example.com/r/src/el.ts#L1");
    }

    #[test]
    fn rejects_baseless_urls() {
        assert!(source_href("not a url", "src/el.ts", 1).is_err());
        assert!(source_href("file:///local/only", "src/el.ts", 1).is_err());
    }
}
