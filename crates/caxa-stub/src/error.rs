//! Diagnostic rendering and exit codes for fatal errors.
//!
//! Library errors arrive wrapped in anyhow context; the typed
//! [`StubError`] inside decides the exit code.

use caxa_core::StubError;
use caxa_core::error::EXIT_FAILURE;

/// Renders the error chain as one line.
///
/// Causes whose text the previous message already contains are skipped,
/// since several library errors embed their source in their own message.
pub fn render(err: &anyhow::Error) -> String {
    let mut rendered = String::new();
    for cause in err.chain() {
        let text = cause.to_string();
        if rendered.contains(&text) {
            continue;
        }
        if !rendered.is_empty() {
            rendered.push_str(": ");
        }
        rendered.push_str(&text);
    }
    if let Some(stub) = find_stub_error(err)
        && stub.is_security_violation()
    {
        rendered.push_str(" (refusing to extract a possibly malicious archive)");
    }
    rendered.replace('\n', " ")
}

/// Exit code for a fatal error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    find_stub_error(err).map_or(EXIT_FAILURE, StubError::exit_code)
}

fn find_stub_error(err: &anyhow::Error) -> Option<&StubError> {
    err.chain().find_map(|cause| cause.downcast_ref::<StubError>())
}
