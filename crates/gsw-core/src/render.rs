use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::store::HostStatusStore;

static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ansi escape pattern")
});

const FULL_PAGE_HEADER: &str = concat!(
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
    "<style>body { background: #0f0f0f; color: #d0d0d0; } ",
    "pre { font-family: monospace; }</style></head><body><pre>",
);
const FULL_PAGE_FOOTER: &str = "</pre></body></html>";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported output format: {0:?}")]
    InvalidFormat(String),
    #[error("ansi conversion failed: {0}")]
    Conversion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ANSI converted to HTML markup.
    #[default]
    Html,
    /// Control codes left intact.
    Ansi,
    /// Control codes stripped.
    Plain,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Ansi => "ansi",
            OutputFormat::Plain => "plain",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "ansi" => Ok(OutputFormat::Ansi),
            "plain" | "txt" => Ok(OutputFormat::Plain),
            other => Err(RenderError::InvalidFormat(other.to_string())),
        }
    }
}

/// Per-request rendering options.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub host_filter: Option<HashSet<String>>,
    pub wrap_full: bool,
}

pub fn strip_ansi(text: &str) -> String {
    RE_ANSI.replace_all(text, "").into_owned()
}

/// Takes a point-in-time snapshot of the store and renders it.
pub fn render(store: &HostStatusStore, options: &RenderOptions) -> Result<String, RenderError> {
    let snapshot = store.snapshot(options.host_filter.as_ref());
    render_snapshot(&snapshot, options)
}

/// Renders an already-taken snapshot. Block ordering and the blank-line
/// boundaries between hosts are preserved exactly as stored.
pub fn render_snapshot(
    snapshot: &[(String, String)],
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let mut body = String::new();
    for (_, text) in snapshot {
        body.push_str(text);
    }

    match options.format {
        OutputFormat::Ansi => Ok(body),
        OutputFormat::Plain => Ok(strip_ansi(&body)),
        OutputFormat::Html => {
            let converted =
                ansi_to_html::convert(&body).map_err(|err| RenderError::Conversion(err.to_string()))?;
            if options.wrap_full {
                Ok(format!("{FULL_PAGE_HEADER}{converted}{FULL_PAGE_FOOTER}"))
            } else {
                Ok(converted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style;

    fn sample_store() -> HostStatusStore {
        let store = HostStatusStore::new();
        store.set_output("node1", "gpu 0: busy");
        store.set_message("node2", &style::red("ConnectError: unreachable"), true);
        store
    }

    #[test]
    fn raw_then_strip_equals_plain() {
        let store = sample_store();
        let raw = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Ansi,
                ..Default::default()
            },
        )
        .expect("ansi render");
        let plain = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Plain,
                ..Default::default()
            },
        )
        .expect("plain render");
        assert_eq!(strip_ansi(&raw), plain);
    }

    #[test]
    fn plain_removes_all_control_codes() {
        let store = sample_store();
        let plain = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Plain,
                ..Default::default()
            },
        )
        .expect("plain render");
        assert!(!plain.contains('\x1b'));
        assert!(plain.contains("(node2) ConnectError: unreachable"));
    }

    #[test]
    fn ansi_preserves_block_order_and_boundaries() {
        let store = sample_store();
        let raw = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Ansi,
                ..Default::default()
            },
        )
        .expect("ansi render");
        let busy = raw.find("busy").expect("node1 block");
        let error = raw.find("ConnectError").expect("node2 block");
        assert!(busy < error);
        assert!(raw.contains("busy\n\n\n\n"));
    }

    #[test]
    fn html_output_has_no_raw_escapes() {
        let store = sample_store();
        let html = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Html,
                ..Default::default()
            },
        )
        .expect("html render");
        assert!(!html.contains('\x1b'));
        assert!(html.contains("ConnectError: unreachable"));
    }

    #[test]
    fn wrap_full_produces_a_document() {
        let store = sample_store();
        let html = render(
            &store,
            &RenderOptions {
                format: OutputFormat::Html,
                wrap_full: true,
                ..Default::default()
            },
        )
        .expect("html render");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn unknown_format_is_invalid_and_leaves_store_untouched() {
        let store = sample_store();
        let before = store.snapshot(None);

        let err = "yaml".parse::<OutputFormat>();
        assert!(matches!(err, Err(RenderError::InvalidFormat(_))));

        assert_eq!(store.snapshot(None), before);
    }
}
