//! version command - Print version information

use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Source revision baked in at build time
const GIT_COMMIT: Option<&str> = option_env!("BCP_GIT_COMMIT");

#[derive(Debug, Serialize, PartialEq, Eq)]
struct VersionOutput {
    version: &'static str,
    commit: &'static str,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: GIT_COMMIT.filter(|c| !c.is_empty()).unwrap_or("unknown"),
        }
    }
}

impl std::fmt::Display for VersionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Version {} (git-{})", self.version, self.commit)
    }
}

/// Execute the version command
pub fn execute(output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let output = VersionOutput::current();

    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.println(&output.to_string());
    }

    ExitCode::Success
}
