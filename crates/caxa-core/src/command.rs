//! Placeholder expansion and launch of the packaged command.

use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::Result;
use crate::StubError;
use crate::error::CommandFailure;
use crate::footer::CommandTemplate;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*caxa\s*\}\}").expect("placeholder pattern is valid"));

/// Replaces every `{{ caxa }}` token in `part` with `directory`.
///
/// Whitespace inside the braces is optional. The substitution is textual;
/// nothing is quoted or interpreted.
///
/// # Examples
///
/// ```
/// use caxa_core::command::expand_part;
/// use std::path::Path;
///
/// let expanded = expand_part("{{caxa}}/bin:{{ caxa }}/lib", Path::new("/opt/app"));
/// assert_eq!(expanded, "/opt/app/bin:/opt/app/lib");
/// ```
#[must_use]
pub fn expand_part(part: &str, directory: &Path) -> OsString {
    let mut expanded = OsString::with_capacity(part.len());
    let mut last = 0;
    for placeholder in PLACEHOLDER.find_iter(part) {
        expanded.push(&part[last..placeholder.start()]);
        expanded.push(directory.as_os_str());
        last = placeholder.end();
    }
    expanded.push(&part[last..]);
    expanded
}

/// Concrete command line ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRunner {
    program: OsString,
    arguments: Vec<OsString>,
}

impl CommandRunner {
    /// Expands `template` against `application_directory` and appends
    /// `trailing` unchanged.
    pub fn new<I>(template: &CommandTemplate, application_directory: &Path, trailing: I) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        let program = expand_part(template.program(), application_directory);
        let arguments = template
            .arguments()
            .iter()
            .map(|part| expand_part(part, application_directory))
            .chain(trailing)
            .collect();
        Self { program, arguments }
    }

    /// Returns the expanded program.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Returns the expanded arguments followed by the trailing ones.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.arguments
    }

    /// Runs the command with inherited stdio and environment and waits for
    /// it to finish.
    ///
    /// Returns the child's exit code. A non-zero code is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::CommandFailed`] if the program cannot be started
    /// or terminates without an exit code.
    pub fn run(&self) -> Result<i32> {
        debug!(
            program = %self.program.to_string_lossy(),
            arguments = self.arguments.len(),
            "launching command"
        );
        let status = Command::new(&self.program)
            .args(&self.arguments)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| self.failed(CommandFailure::Spawn(err)))?;

        match status.code() {
            Some(code) => Ok(code),
            None => Err(self.failed(termination(status))),
        }
    }

    fn failed(&self, reason: CommandFailure) -> StubError {
        StubError::CommandFailed {
            program: self.program.to_string_lossy().into_owned(),
            reason,
        }
    }
}

#[cfg(unix)]
fn termination(status: ExitStatus) -> CommandFailure {
    use std::os::unix::process::ExitStatusExt;

    status
        .signal()
        .map_or(CommandFailure::NoStatus, CommandFailure::Signal)
}

#[cfg(not(unix))]
fn termination(_status: ExitStatus) -> CommandFailure {
    CommandFailure::NoStatus
}
