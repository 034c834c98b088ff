use thiserror::Error;

/// Everything that can go wrong while compiling a format or running it
/// over data.
///
/// `Format` is raised while a format string is parsed and analyzed.
/// `Data` and `Argument` are raised while a structure is executed over
/// bytes or arguments; `Data` carries the byte offset into the buffer,
/// `Argument` the position in the argument sequence. `Overflow` is the
/// encode-time failure of a value that does not fit its scalar slot.
/// The `excerpt` is the canonical rendering of the offending token.
#[derive(Debug, Error)]
pub enum Error {
    #[error("format error in \"{format}\" at \"{excerpt}\": {reason}")]
    Format {
        format: String,
        excerpt: String,
        reason: String,
    },
    #[error("data error in \"{format}\" at \"{excerpt}\", offset {offset}: {reason}")]
    Data {
        format: String,
        excerpt: String,
        offset: usize,
        reason: String,
    },
    #[error("argument error in \"{format}\" at \"{excerpt}\", argument {index}: {reason}")]
    Argument {
        format: String,
        excerpt: String,
        index: usize,
        reason: String,
    },
    #[error("overflow in \"{format}\" at \"{excerpt}\", argument {index}: value out of range")]
    Overflow {
        format: String,
        excerpt: String,
        index: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(format: &str, excerpt: impl ToString, reason: impl Into<String>) -> Self {
        Error::Format {
            format: format.to_owned(),
            excerpt: excerpt.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn data(
        format: &str,
        excerpt: impl ToString,
        offset: usize,
        reason: impl Into<String>,
    ) -> Self {
        Error::Data {
            format: format.to_owned(),
            excerpt: excerpt.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(
        format: &str,
        excerpt: impl ToString,
        index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Error::Argument {
            format: format.to_owned(),
            excerpt: excerpt.to_string(),
            index,
            reason: reason.into(),
        }
    }
}
