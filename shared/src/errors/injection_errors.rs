use std::path::PathBuf;
use thiserror::Error;

/// Every stage of remote module loading fails with its own variant so callers can log exactly
/// where the target refused.
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("helper module not found at `{primary}` or `{fallback}`")]
    ModuleNotFound { primary: PathBuf, fallback: PathBuf },

    #[error("module path `{0}` cannot be passed to the target")]
    InvalidPath(PathBuf),

    #[error("process {pid} is not running")]
    ProcessGone { pid: u32 },

    #[error("cannot open process {pid}: {reason}")]
    OpenProcess { pid: u32, reason: String },

    #[error("remote allocation in process {pid} failed: {reason}")]
    RemoteAlloc { pid: u32, reason: String },

    #[error("remote write in process {pid} failed: {reason}")]
    RemoteWrite { pid: u32, reason: String },

    #[error("cannot resolve loader entry point `{symbol}`: {reason}")]
    ResolveEntryPoint { symbol: &'static str, reason: String },

    #[error("cannot create remote thread in process {pid}: {reason}")]
    CreateRemoteThread { pid: u32, reason: String },

    #[error("module load inside process {pid} returned a null reference")]
    NullModule { pid: u32 },

    #[error("module shutdown inside process {pid} failed: {reason}")]
    Shutdown { pid: u32, reason: String },

    #[error("module unload inside process {pid} failed: {reason}")]
    Unload { pid: u32, reason: String },
}

impl InjectError {
    /// Short name of the failing stage, used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            InjectError::ModuleNotFound { .. } => "module-path",
            InjectError::InvalidPath(_) => "module-path",
            InjectError::ProcessGone { .. } => "liveness",
            InjectError::OpenProcess { .. } => "process-open",
            InjectError::RemoteAlloc { .. } => "remote-allocate",
            InjectError::RemoteWrite { .. } => "remote-write",
            InjectError::ResolveEntryPoint { .. } => "symbol-resolution",
            InjectError::CreateRemoteThread { .. } => "remote-thread-create",
            InjectError::NullModule { .. } => "module-load",
            InjectError::Shutdown { .. } => "module-shutdown",
            InjectError::Unload { .. } => "module-unload",
        }
    }
}
