use crate::handles::WindowHandle;
use std::fmt;
use thiserror::Error;

/// Which side of an embedding a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Container,
    Target,
}

impl fmt::Display for WindowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowRole::Container => f.write_str("container"),
            WindowRole::Target => f.write_str("target"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EmbedError {
    #[error("{role} window {handle:?} is not a live window")]
    InvalidWindow { role: WindowRole, handle: WindowHandle },

    #[error("reparenting {target:?} was rejected: {reason}")]
    Reparent { target: WindowHandle, reason: String },

    #[error("window {0:?} is not embedded")]
    NotEmbedded(WindowHandle),
}
