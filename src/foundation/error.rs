use std::path::{Path, PathBuf};

use crate::foundation::core::Timestep;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("not found: '{}' does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("malformed record in '{}'{}: {reason}", .path.display(), line_suffix(.line))]
    MalformedRecord {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("no output found: expected {expected} in '{}'", .dir.display())]
    NoOutputFound { dir: PathBuf, expected: String },

    #[error("source missing{}: '{}'", timestep_suffix(.timestep), .path.display())]
    SourceMissing {
        path: PathBuf,
        timestep: Option<Timestep>,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("cache error in '{}': {reason}", .path.display())]
    Cache { path: PathBuf, reason: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("io error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReportError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn malformed(path: &Path, line: Option<usize>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    pub fn no_output(dir: &Path, expected: impl Into<String>) -> Self {
        Self::NoOutputFound {
            dir: dir.to_path_buf(),
            expected: expected.into(),
        }
    }

    pub fn source_missing(path: impl Into<PathBuf>, timestep: Option<Timestep>) -> Self {
        Self::SourceMissing {
            path: path.into(),
            timestep,
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn cache(path: &Path, reason: impl Into<String>) -> Self {
        Self::Cache {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Programming-invariant violations get a full error chain at the CLI boundary; every
    /// other variant is an expected-shape failure and is printed as one line.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(n) => format!(" (line {n})"),
        None => String::new(),
    }
}

fn timestep_suffix(timestep: &Option<Timestep>) -> String {
    match timestep {
        Some(t) => format!(" for timestep {}", t.0),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReportError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            ReportError::invariant("x")
                .to_string()
                .contains("invariant violated:")
        );
        assert!(
            ReportError::unavailable("x")
                .to_string()
                .contains("collaborator unavailable:")
        );
        assert!(
            ReportError::collaborator("x")
                .to_string()
                .contains("collaborator failed:")
        );
    }

    #[test]
    fn messages_name_the_offending_path() {
        let err = ReportError::malformed(Path::new("run/Cells_3.txt"), Some(7), "bad value");
        let msg = err.to_string();
        assert!(msg.contains("run/Cells_3.txt"));
        assert!(msg.contains("(line 7)"));
        assert!(msg.contains("bad value"));

        let err = ReportError::source_missing("run/Cells_3/Cells_3_0.vtp", Some(Timestep(3)));
        assert!(err.to_string().contains("for timestep 3"));

        let err = ReportError::no_output(Path::new("run"), "solver output like Cells_100.txt");
        assert!(err.to_string().contains("Cells_100.txt"));
    }

    #[test]
    fn only_invariant_is_flagged_for_full_propagation() {
        assert!(ReportError::invariant("oob").is_invariant_violation());
        assert!(!ReportError::not_found("x").is_invariant_violation());
        assert!(!ReportError::malformed(Path::new("x"), None, "y").is_invariant_violation());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReportError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
