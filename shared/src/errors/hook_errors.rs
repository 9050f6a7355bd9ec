use thiserror::Error;

/// Failures while installing or removing a presentation hook.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("no supported graphics back-end is loaded in this process")]
    BackendNotFound,

    #[error("failed to resolve `{what}`: {reason}")]
    Resolve { what: &'static str, reason: String },

    #[error("failed to patch {target:#x}: {reason}")]
    Patch { target: usize, reason: String },

    #[error("hook is already installed")]
    AlreadyInstalled,

    #[error("hook is not installed")]
    NotInstalled,

    #[error("renderer initialization failed: {0}")]
    Renderer(String),
}
