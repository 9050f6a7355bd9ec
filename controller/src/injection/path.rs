use shared::errors::InjectError;
use std::path::{self, Path, PathBuf};

/// Locates the helper module: `exe_dir/file_name` first, then `fallback_dir/file_name` (relative
/// to the working directory). The result is absolute, since the target resolves it against its
/// own working directory.
pub fn resolve_module_path(exe_dir: &Path, file_name: &str, fallback_dir: &Path) -> Result<PathBuf, InjectError> {
    let primary = exe_dir.join(file_name);
    let fallback = fallback_dir.join(file_name);
    for candidate in [&primary, &fallback] {
        if candidate.is_file() {
            return path::absolute(candidate).map_err(|_| InjectError::InvalidPath(candidate.clone()));
        }
    }
    Err(InjectError::ModuleNotFound { primary, fallback })
}
