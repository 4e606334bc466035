//! VirtualBox driver commands.
//!
//! docker-machine does not manage shared folders itself, so these go
//! straight to `VBoxManage` against the (stopped) VM.

use std::path::{Path, PathBuf};

/// Folder name the VirtualBox driver registers for the default share.
pub const DEFAULT_SHARED_FOLDER: &str = "Users";

#[cfg(windows)]
const DEFAULT_INSTALL_DIR: Option<&str> = Some(r"c:\program files\oracle\virtualbox");

#[cfg(not(windows))]
const DEFAULT_INSTALL_DIR: Option<&str> = None;

/// Formats `VBoxManage` invocations for one VirtualBox installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualBoxDriver {
    /// Directory containing `VBoxManage`. `None` relies on `PATH`.
    install_dir: Option<PathBuf>,
}

impl Default for VirtualBoxDriver {
    fn default() -> Self {
        Self {
            install_dir: DEFAULT_INSTALL_DIR.map(PathBuf::from),
        }
    }
}

impl VirtualBoxDriver {
    pub fn new(install_dir: Option<PathBuf>) -> Self {
        match install_dir {
            Some(dir) => Self { install_dir: Some(dir) },
            None => Self::default(),
        }
    }

    /// Driver name passed to `docker-machine create --driver`.
    pub fn driver_name(&self) -> &'static str {
        "virtualbox"
    }

    pub fn vboxmanage_path(&self) -> PathBuf {
        match &self.install_dir {
            Some(dir) => dir.join("vboxmanage"),
            None => PathBuf::from("VBoxManage"),
        }
    }

    pub fn sharedfolder_add(&self, vm_name: &str, host_path: &Path, folder: &str) -> String {
        format!(
            "\"{}\" sharedfolder add {vm_name} -name {folder} -hostpath {} --automount",
            self.vboxmanage_path().display(),
            host_path.display()
        )
    }

    pub fn sharedfolder_remove(&self, vm_name: &str, folder: &str) -> String {
        format!(
            "\"{}\" sharedfolder remove {vm_name} -name {folder}",
            self.vboxmanage_path().display()
        )
    }

    pub fn sharedfolder_symlinks(&self, vm_name: &str, folder: &str, enabled: bool) -> String {
        format!(
            "\"{}\" setextradata {vm_name} VBoxInternal2/SharedFoldersEnableSymlinksCreate/{folder} {}",
            self.vboxmanage_path().display(),
            u8::from(enabled)
        )
    }
}
