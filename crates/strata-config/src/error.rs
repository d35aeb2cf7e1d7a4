use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "no stack file found. Looked for:\n\
        - current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl\n\
        - the same names under ./.strata/\n\
        - ~/.config/strata/stack.kdl\n\
        Set STRATA_STACK_PATH or pass --file to point at one directly"
    )]
    StackFileNotFound,

    #[error("STRATA_STACK_PATH points at a missing file: {0}")]
    StackPathMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
