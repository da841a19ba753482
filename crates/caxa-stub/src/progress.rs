//! Indicator shown on stderr while the payload is extracted.

use caxa_core::ProgressCallback;
use console::Term;
use indicatif::ProgressBar;
use indicatif::ProgressDrawTarget;
use indicatif::ProgressState;
use indicatif::ProgressStyle;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Prints the uncompression message while extraction runs.
///
/// On a terminal the message gains one dot per second on indicatif's own
/// thread and stays on screen once extraction ends. Elsewhere the message is
/// written once and terminated by a newline on completion. Completion happens
/// in `on_complete` or on drop, whichever comes first.
pub struct StubProgress<W: Write = Term> {
    output: W,
    interactive: bool,
    started: bool,
    bar: Option<ProgressBar>,
}

impl StubProgress {
    #[must_use]
    pub fn new() -> Self {
        let term = Term::stderr();
        let interactive = term.is_term();
        Self::with_output(term, interactive)
    }
}

impl<W: Write> StubProgress<W> {
    fn with_output(output: W, interactive: bool) -> Self {
        Self {
            output,
            interactive,
            started: false,
            bar: None,
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("{msg}{dots}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .with_key("dots", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = w.write_str(&dots(state.elapsed()));
                }),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK_INTERVAL);
        bar
    }
}

/// One dot per whole second.
fn dots(elapsed: Duration) -> String {
    ".".repeat(usize::try_from(elapsed.as_secs()).unwrap_or(0))
}

impl<W: Write> Drop for StubProgress<W> {
    fn drop(&mut self) {
        self.on_complete();
    }
}

impl<W: Write> ProgressCallback for StubProgress<W> {
    fn on_extraction_start(&mut self, message: Option<&str>) {
        let Some(message) = message else {
            return;
        };
        self.started = true;

        if self.interactive {
            self.bar = Some(Self::spinner(message));
        } else {
            // stderr is best effort.
            let _ = self.output.write_all(message.as_bytes());
            let _ = self.output.flush();
        }
    }

    fn on_entry_complete(&mut self, _path: &Path) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_complete(&mut self) {
        if !std::mem::take(&mut self.started) {
            return;
        }
        match self.bar.take() {
            Some(bar) => bar.finish(),
            None => {
                let _ = self.output.write_all(b"\n");
                let _ = self.output.flush();
            }
        }
    }
}
