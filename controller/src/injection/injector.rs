use log::{debug, info, warn};
use shared::errors::InjectError;
use shared::handles::{ModuleHandle, ProcessHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Platform operations behind the [`Injector`].
pub trait LoaderBackend: Send {
    /// Opens `pid` with rights to allocate, write and start threads in it.
    fn open_process(&self, pid: u32) -> Result<ProcessHandle, InjectError>;

    fn is_alive(&self, process: ProcessHandle) -> bool;

    /// Runs the OS module loader inside the target with `path` as its argument and returns the
    /// loaded module's base.
    fn load_module(&self, process: ProcessHandle, pid: u32, path: &Path) -> Result<ModuleHandle, InjectError>;

    /// Runs the module's own shutdown export and waits for it, so the module's threads are gone
    /// before the unload. `ResolveEntryPoint` when the module has no such export.
    fn shutdown_module(&self, process: ProcessHandle, pid: u32, module: ModuleHandle) -> Result<(), InjectError>;

    fn unload_module(&self, process: ProcessHandle, pid: u32, module: ModuleHandle) -> Result<(), InjectError>;

    fn close_process(&self, process: ProcessHandle);
}

/// One successful injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionRecord {
    pub pid: u32,
    pub process: ProcessHandle,
    pub module: ModuleHandle,
}

/// Owns at most one [`InjectionRecord`] per process and the process handle inside it.
pub struct Injector<B: LoaderBackend> {
    backend: B,
    module_path: PathBuf,
    records: HashMap<u32, InjectionRecord>,
}

impl<B: LoaderBackend> Injector<B> {
    pub fn new(backend: B, module_path: PathBuf) -> Self {
        Self { backend, module_path, records: HashMap::new() }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn set_module_path(&mut self, path: PathBuf) {
        self.module_path = path;
    }

    pub fn record(&self, pid: u32) -> Option<&InjectionRecord> {
        self.records.get(&pid)
    }

    pub fn is_injected(&self, pid: u32) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.records.keys().copied().collect()
    }

    /// Loads the helper module into `pid`. A process that already has a live record gets that
    /// record back untouched; a record whose process died is purged first.
    pub fn inject(&mut self, pid: u32) -> Result<InjectionRecord, InjectError> {
        if let Some(record) = self.records.get(&pid).copied() {
            if self.backend.is_alive(record.process) {
                debug!("process {pid} already injected at {:?}", record.module);
                return Ok(record);
            }
            warn!("process {pid} exited since injection; dropping stale record");
            self.purge(pid);
        }

        let process = self.backend.open_process(pid)?;
        let module = match self.backend.load_module(process, pid, &self.module_path) {
            Ok(module) => module,
            Err(e) => {
                self.backend.close_process(process);
                return Err(e);
            }
        };

        let record = InjectionRecord { pid, process, module };
        self.records.insert(pid, record);
        info!("injected {} into process {pid} at {module:?}", self.module_path.display());
        Ok(record)
    }

    /// Stops the helper module inside `pid`, unloads it and drops the record. False when there
    /// was no record, when the process is gone, or when either step failed inside the target.
    ///
    /// A module whose shutdown did not complete stays loaded: its threads may still be running.
    pub fn eject(&mut self, pid: u32) -> bool {
        let Some(record) = self.records.remove(&pid) else {
            return false;
        };

        let unloaded = if !self.backend.is_alive(record.process) {
            info!("process {pid} already exited; record dropped");
            false
        } else {
            self.stop_and_unload(&record)
        };
        self.backend.close_process(record.process);
        unloaded
    }

    fn stop_and_unload(&self, record: &InjectionRecord) -> bool {
        let pid = record.pid;
        match self.backend.shutdown_module(record.process, pid, record.module) {
            Ok(()) => debug!("module in process {pid} shut down"),
            Err(e @ InjectError::ResolveEntryPoint { .. }) => {
                warn!("{e}; unloading without a prior shutdown");
            }
            Err(e) => {
                warn!("{} failed while ejecting from {pid}: {e}; module left loaded", e.stage());
                return false;
            }
        }
        match self.backend.unload_module(record.process, pid, record.module) {
            Ok(()) => {
                info!("ejected module {:?} from process {pid}", record.module);
                true
            }
            Err(e) => {
                warn!("{} failed while ejecting from {pid}: {e}", e.stage());
                false
            }
        }
    }

    /// Forgets the record for `pid` without touching the target.
    pub fn purge(&mut self, pid: u32) {
        if let Some(record) = self.records.remove(&pid) {
            self.backend.close_process(record.process);
        }
    }

    /// Ejects from every process that still has a record.
    pub fn shutdown(&mut self) {
        for pid in self.pids() {
            self.eject(pid);
        }
    }
}

impl<B: LoaderBackend> Drop for Injector<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
