use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("command `{command}` failed: {output}")]
    Command { command: String, output: String },

    #[error("partial write: {written}/{total} packets accepted: {source}")]
    PartialWrite {
        written: usize,
        total: usize,
        #[source]
        source: io::Error,
    },

    #[error("device {name} closed")]
    DeviceClosed { name: String },
}

impl Error {
    /// Number of packets a failed batch write still delivered.
    pub fn written(&self) -> usize {
        match self {
            Error::PartialWrite { written, .. } => *written,
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
