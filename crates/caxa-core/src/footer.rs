//! Trailing JSON footer appended after the archive.

use serde::Deserialize;

use crate::Result;
use crate::StubError;
use crate::config::WireFormat;

/// Decoded footer metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Token that scopes the extraction cache.
    pub identifier: String,

    /// Command to run against the extracted application directory.
    pub command: CommandTemplate,

    /// Message printed while the archive is being extracted.
    pub uncompression_message: Option<String>,
}

/// Ordered command parts; the first part is the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    parts: Vec<String>,
}

impl CommandTemplate {
    /// Creates a template from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::InvalidFooter`] if `parts` is empty or the
    /// program is blank.
    pub fn new(parts: Vec<String>) -> Result<Self> {
        match parts.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { parts }),
            Some(_) => Err(StubError::invalid_footer("command program is empty")),
            None => Err(StubError::invalid_footer("command has no parts")),
        }
    }

    /// Returns the program part.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.parts[0]
    }

    /// Returns the argument parts after the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.parts[1..]
    }

    /// Returns every part, program first.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

/// Footer together with the offset of the separator that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFooter {
    /// Decoded footer.
    pub footer: Footer,

    /// Offset of the footer separator; the archive ends here.
    pub separator_offset: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFooter {
    identifier: String,
    command: RawCommand,
    #[serde(default)]
    uncompression_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Parts(Vec<String>),
    Invocation {
        file: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
}

impl RawCommand {
    fn into_parts(self) -> Vec<String> {
        match self {
            Self::Parts(parts) => parts,
            Self::Invocation { file, arguments } => {
                let mut parts = Vec::with_capacity(arguments.len() + 1);
                parts.push(file);
                parts.extend(arguments);
                parts
            }
        }
    }
}

/// Locates the last footer separator in `image` and decodes what follows.
///
/// # Errors
///
/// - [`StubError::MalformedImage`] if the image has no footer separator.
/// - [`StubError::InvalidFooter`] if the trailing bytes are not a JSON
///   footer with `identifier` and `command`, or if the identifier cannot
///   name a cache directory.
///
/// # Examples
///
/// ```
/// use caxa_core::WireFormat;
/// use caxa_core::footer::parse_footer;
///
/// let image = b"stub\n{\"identifier\":\"abc123\",\"command\":[\"sh\",\"{{caxa}}/run.sh\"]}";
/// let parsed = parse_footer(image, &WireFormat::CAXA).unwrap();
/// assert_eq!(parsed.footer.identifier, "abc123");
/// assert_eq!(parsed.separator_offset, 4);
/// ```
pub fn parse_footer(image: &[u8], format: &WireFormat) -> Result<ParsedFooter> {
    let separator_offset = image
        .iter()
        .rposition(|&byte| byte == format.footer_separator)
        .ok_or_else(|| {
            StubError::malformed(
                "footer not found (did you append an archive and a footer to the stub?)",
            )
        })?;

    let raw: RawFooter =
        serde_json::from_slice(&image[separator_offset + 1..]).map_err(|err| {
            StubError::InvalidFooter {
                reason: "footer is not a valid JSON document".into(),
                source: Some(err),
            }
        })?;

    validate_identifier(&raw.identifier)?;
    let command = CommandTemplate::new(raw.command.into_parts())?;
    let uncompression_message = raw
        .uncompression_message
        .filter(|message| !message.is_empty());

    Ok(ParsedFooter {
        footer: Footer {
            identifier: raw.identifier,
            command,
            uncompression_message,
        },
        separator_offset,
    })
}

/// The identifier becomes a directory name in the cache, so it must be a
/// single normal path component.
fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(StubError::invalid_footer("identifier is empty"));
    }
    if identifier == "." || identifier == ".." || identifier.contains(['/', '\\', '\0']) {
        return Err(StubError::invalid_footer(format!(
            "identifier {identifier:?} is not a single path component"
        )));
    }
    Ok(())
}
