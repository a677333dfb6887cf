//! Concrete collaborators: external processes, HTTP APIs, local files, the terminal.

pub mod file_query;
pub mod gsutil;
pub mod local_store;
pub mod process_generator;
pub mod sheets;
pub mod stdin_gate;

pub use file_query::FileQueryStore;
pub use gsutil::GsutilStore;
pub use local_store::LocalDirStore;
pub use process_generator::ProcessGenerator;
pub use sheets::{GcloudTokenSource, SheetsQueryStore, StaticToken, TokenSource};
pub use stdin_gate::StdinGate;

use std::ffi::OsStr;
use std::process::{Command, Stdio};

/// True when `<program> --version` launches and exits successfully.
pub fn tool_responds(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Trimmed stderr, falling back to the exit status when stderr is empty.
pub(crate) fn failure_reason(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}

/// Render a command line for logs.
pub(crate) fn display_command<I, S>(program: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}
