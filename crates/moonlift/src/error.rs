use std::fmt;

use crate::{
    parse::ParseError,
    ssa::{BuildError, RecoverError},
};

/// Error type for the beautify pipeline, separating failures by stage.
///
/// Keeping parse/build/recover failures distinct lets callers report and
/// recover accurately without string matching.
#[derive(Debug, Clone)]
pub enum BeautifyError {
    /// The source text did not parse.
    Parse(ParseError),
    /// SSA lowering hit a construct it refuses (goto, break outside loop).
    Build(BuildError),
    /// Structural recovery met a CFG shape outside its vocabulary.
    Recover(RecoverError),
}

impl fmt::Display for BeautifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "{error}"),
            Self::Build(error) => write!(f, "build error: {error}"),
            Self::Recover(error) => write!(f, "recover error: {error}"),
        }
    }
}

impl std::error::Error for BeautifyError {}

impl From<ParseError> for BeautifyError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<BuildError> for BeautifyError {
    fn from(error: BuildError) -> Self {
        Self::Build(error)
    }
}

impl From<RecoverError> for BeautifyError {
    fn from(error: RecoverError) -> Self {
        Self::Recover(error)
    }
}
