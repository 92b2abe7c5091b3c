use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no files match input pattern `{0}`")]
    PatternEmpty(String),

    #[error("file `{}` does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("error reading `{}` as plain text file: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Error {
        Error::Validation(msg.into())
    }

    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Error {
        Error::Parse {
            line,
            message: msg.into(),
        }
    }
}
