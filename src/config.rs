//! Configuration types for the conversion service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built once
//! at startup via [`ServiceConfigBuilder`] and then shared read-only (behind
//! an `Arc`) by every request. Nothing in the pipeline reads the environment
//! directly; the binary maps flags and env vars onto the builder.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default converter wall-clock timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default chunk size for streaming artifacts back to the client.
pub const DEFAULT_STREAM_CHUNK_BYTES: usize = 64 * 1024;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use office_convert::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .temp_dir("/var/tmp/office-convert")
///     .max_upload_bytes(5 * 1024 * 1024)
///     .timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout().as_secs(), 120);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding per-request artifacts. Created at startup. Default: `tmp/`.
    pub temp_dir: PathBuf,

    /// Maximum accepted upload size in bytes. Default: 10 MiB.
    ///
    /// Checked against the declared size before the body is read, and again
    /// as a hard ceiling while the body is written to disk.
    pub max_upload_bytes: u64,

    /// Converter wall-clock timeout in seconds. Default: 300.
    pub timeout_secs: u64,

    /// Command for `.doc` → `.docx`. Default: `Wordconv -ocie -nme {input} {output}`.
    pub doc_converter: CommandTemplate,

    /// Command for `.docx` → `.pdf`. Default: `uvx docx2pdf --keep-active {input} {output}`.
    pub pdf_converter: CommandTemplate,

    /// Read size used when streaming the output artifact. Default: 64 KiB.
    pub stream_chunk_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("tmp/"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            doc_converter: CommandTemplate::wordconv(),
            pdf_converter: CommandTemplate::docx2pdf(),
            stream_chunk_bytes: DEFAULT_STREAM_CHUNK_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Converter deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The command template bound to a conversion variant.
    pub fn converter_for(&self, kind: ConversionKind) -> &CommandTemplate {
        match kind {
            ConversionKind::DocToDocx => &self.doc_converter,
            ConversionKind::DocxToPdf => &self.pdf_converter,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn doc_converter(mut self, template: CommandTemplate) -> Self {
        self.config.doc_converter = template;
        self
    }

    pub fn pdf_converter(mut self, template: CommandTemplate) -> Self {
        self.config.pdf_converter = template;
        self
    }

    pub fn stream_chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.stream_chunk_bytes = bytes.clamp(1024, 8 * 1024 * 1024);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum upload size must be ≥ 1 byte".into(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Converter timeout must be ≥ 1 second".into(),
            ));
        }
        if c.temp_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Temp directory must not be empty".into(),
            ));
        }
        c.doc_converter.check()?;
        c.pdf_converter.check()?;
        Ok(self.config)
    }
}

// ── Command templates ────────────────────────────────────────────────────

/// An external converter invocation with `{input}` / `{output}` placeholders.
///
/// Placeholders may stand alone (`{input}`) or be embedded in a longer
/// argument (`--out={output}`). Standalone placeholders are substituted with
/// the raw OS path, so non-UTF-8 temp roots still work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Microsoft Office Compatibility Pack converter.
    pub fn wordconv() -> Self {
        Self::new("Wordconv", ["-ocie", "-nme", INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER])
    }

    /// The `docx2pdf` CLI run through `uvx`.
    pub fn docx2pdf() -> Self {
        Self::new(
            "uvx",
            ["docx2pdf", "--keep-active", INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER],
        )
    }

    /// Parse a whitespace-separated template such as
    /// `"Wordconv -ocie -nme {input} {output}"`.
    pub fn parse(s: &str) -> Result<Self, ConvertError> {
        let mut parts = s.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ConvertError::InvalidConfig("Converter command is empty".into()))?;
        let template = Self::new(program, parts);
        template.check()?;
        Ok(template)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Substitute the artifact paths into the argument list.
    pub fn render(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_os_string(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_os_string(),
                other => OsString::from(
                    other
                        .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                        .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
                ),
            })
            .collect()
    }

    fn check(&self) -> Result<(), ConvertError> {
        if self.program.trim().is_empty() {
            return Err(ConvertError::InvalidConfig("Converter program is empty".into()));
        }
        for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
            if !self.args.iter().any(|a| a.contains(placeholder)) {
                return Err(ConvertError::InvalidConfig(format!(
                    "Converter '{}' template is missing the {} placeholder",
                    self.program, placeholder
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ── Conversion variants ──────────────────────────────────────────────────

/// The two conversions the service offers.
///
/// Each variant fixes the accepted source extension, the output artifact's
/// extension, and the media type of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionKind {
    /// Legacy binary Word (`.doc`) → Office Open XML (`.docx`).
    DocToDocx,
    /// Office Open XML (`.docx`) → PDF.
    DocxToPdf,
}

impl ConversionKind {
    /// Extension the uploaded filename must carry (lower-case, with dot).
    pub fn source_extension(self) -> &'static str {
        match self {
            ConversionKind::DocToDocx => ".doc",
            ConversionKind::DocxToPdf => ".docx",
        }
    }

    /// Extension of the produced artifact and of the download filename.
    pub fn target_extension(self) -> &'static str {
        match self {
            ConversionKind::DocToDocx => ".docx",
            ConversionKind::DocxToPdf => ".pdf",
        }
    }

    /// `Content-Type` of a successful response.
    pub fn media_type(self) -> &'static str {
        match self {
            ConversionKind::DocToDocx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ConversionKind::DocxToPdf => "application/pdf",
        }
    }
}

impl std::fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionKind::DocToDocx => write!(f, "doc→docx"),
            ConversionKind::DocxToPdf => write!(f, "docx→pdf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = ServiceConfig::default();
        assert_eq!(c.max_upload_bytes, 10_485_760);
        assert_eq!(c.timeout_secs, 300);
        assert_eq!(c.temp_dir, PathBuf::from("tmp/"));
        assert_eq!(c.doc_converter.program(), "Wordconv");
        assert_eq!(c.pdf_converter.program(), "uvx");
    }

    #[test]
    fn build_rejects_zero_timeout_and_size() {
        assert!(ServiceConfig::builder().timeout_secs(0).build().is_err());
        assert!(ServiceConfig::builder().max_upload_bytes(0).build().is_err());
        assert!(ServiceConfig::builder().timeout_secs(1).build().is_ok());
    }

    #[test]
    fn chunk_size_is_clamped() {
        let c = ServiceConfig::builder()
            .stream_chunk_bytes(1)
            .build()
            .unwrap();
        assert_eq!(c.stream_chunk_bytes, 1024);
    }

    #[test]
    fn parse_template_requires_both_placeholders() {
        let t = CommandTemplate::parse("Wordconv -ocie -nme {input} {output}").unwrap();
        assert_eq!(t, CommandTemplate::wordconv());
        assert!(CommandTemplate::parse("Wordconv {input}").is_err());
        assert!(CommandTemplate::parse("   ").is_err());
    }

    #[test]
    fn render_substitutes_standalone_and_embedded() {
        let t = CommandTemplate::new("soffice", ["{input}", "--outdir={output}"]);
        let args = t.render(Path::new("/tmp/a.doc"), Path::new("/tmp/a.docx"));
        assert_eq!(args[0], OsString::from("/tmp/a.doc"));
        assert_eq!(args[1], OsString::from("--outdir=/tmp/a.docx"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let t = CommandTemplate::docx2pdf();
        assert_eq!(t.to_string(), "uvx docx2pdf --keep-active {input} {output}");
        assert_eq!(CommandTemplate::parse(&t.to_string()).unwrap(), t);
    }

    #[test]
    fn kind_extensions_and_media_types() {
        assert_eq!(ConversionKind::DocToDocx.source_extension(), ".doc");
        assert_eq!(ConversionKind::DocToDocx.target_extension(), ".docx");
        assert_eq!(ConversionKind::DocxToPdf.source_extension(), ".docx");
        assert_eq!(ConversionKind::DocxToPdf.target_extension(), ".pdf");
        assert_eq!(ConversionKind::DocxToPdf.media_type(), "application/pdf");
    }
}
