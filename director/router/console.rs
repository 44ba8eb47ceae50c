use parking_lot::Mutex;
use tracing::info;

/// Executes composed console command lines inside the host. Fire and forget.
pub trait ConsoleExecutor: Send + Sync {
    /// Runs one command line.
    fn execute(&self, line: &str);
}

/// Console that only logs the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl ConsoleExecutor for TracingConsole {
    fn execute(&self, line: &str) {
        info!(line, "console command");
    }
}

/// Console that keeps every line it was asked to run.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
}

impl RecordingConsole {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines executed so far, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ConsoleExecutor for RecordingConsole {
    fn execute(&self, line: &str) {
        self.lines.lock().push(line.to_owned());
    }
}
