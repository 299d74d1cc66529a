/// Human-readable progress lines for the sandbox run
///
/// These are informational only; diagnostics meant for operators go through `log`.
use std::io::{self, Write};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    /// Stage announcements
    Stage,
    /// A limit or setting that is now in force
    Applied,
    /// Frequency changes
    Frequency,
    /// The command line about to run
    Command,
    /// Failures and signal terminations
    Failure,
}

impl Tone {
    fn color(self) -> &'static str {
        match self {
            Tone::Stage => YELLOW,
            Tone::Applied => GREEN,
            Tone::Frequency => BLUE,
            Tone::Command => MAGENTA,
            Tone::Failure => RED,
        }
    }
}

/// Printer shared by the supervisor and the isolated child.
///
/// `Copy` so the clone callback can take its own instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Console {
    color: bool,
    to_stderr: bool,
}

impl Console {
    pub fn new(color: bool, to_stderr: bool) -> Self {
        Self { color, to_stderr }
    }

    /// True when progress lines go to stderr, leaving stdout for a machine-readable report
    pub fn writes_to_stderr(&self) -> bool {
        self.to_stderr
    }

    /// Render a line without printing it
    pub fn format(&self, tone: Tone, message: &str) -> String {
        if self.color {
            format!("{}{}{}", tone.color(), message, RESET)
        } else {
            message.to_string()
        }
    }

    pub fn stage(&self, message: &str) {
        self.emit(Tone::Stage, message);
    }

    pub fn applied(&self, message: &str) {
        self.emit(Tone::Applied, message);
    }

    pub fn frequency(&self, message: &str) {
        self.emit(Tone::Frequency, message);
    }

    pub fn command(&self, message: &str) {
        self.emit(Tone::Command, message);
    }

    /// Failures always go to stderr
    pub fn failure(&self, message: &str) {
        let line = self.format(Tone::Failure, message);
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.flush();
    }

    pub fn emit(&self, tone: Tone, message: &str) {
        let line = self.format(tone, message);
        // Flushed eagerly: the child execs right after its last line.
        if self.to_stderr {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        } else {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", line);
            let _ = stdout.flush();
        }
    }
}
