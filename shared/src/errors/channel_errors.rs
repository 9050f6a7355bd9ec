use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to connect to `{name}`: {source}")]
    Connect {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("channel is closed")]
    Closed,

    #[error("failed to spawn `{name}` thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}
