//! Host-side seams of the flash orchestrator
//!
//! The orchestrator never spawns processes, touches volumes or talks to the
//! operator directly. It goes through the traits in this module, which the
//! CLI implements for the real system and tests implement with fakes.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::error::{Choice, Stage};

/// Outcome of an external tool run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Exit code zero
    Success,
    /// Non-zero exit code, or `None` if killed by a signal
    Failed(Option<i32>),
}

/// Locates and runs external tools
pub trait ToolRunner {
    /// Find a tool on the system, returning its path
    fn locate(&self, tool: &str) -> Option<PathBuf>;

    /// Run a tool to completion
    fn run(&mut self, tool: &str, args: &[String]) -> io::Result<ToolStatus>;
}

/// Access to the machine the device is attached to
pub trait TargetHost {
    /// Copy an image file onto a mounted volume
    fn copy_image(&mut self, src: &Path, dest: &Path) -> io::Result<()>;

    /// Currently mounted volumes that could be a device
    fn mount_points(&self) -> io::Result<Vec<PathBuf>>;

    /// Currently available serial ports
    fn serial_ports(&self) -> io::Result<Vec<String>>;

    /// Block for the given time
    fn delay(&mut self, duration: Duration);
}

/// Operator interaction
pub trait Prompt {
    /// Let the operator pick one of the candidates
    fn choose(&mut self, kind: Choice, candidates: &[String]) -> io::Result<String>;
}

/// Progress reporting callbacks
pub trait FlashProgress {
    /// A stage starts
    fn stage_started(&mut self, stage: Stage);

    /// A stage is skipped
    fn stage_skipped(&mut self, stage: Stage, reason: &str);

    /// A step of a stage starts
    fn step(&mut self, stage: Stage, description: &str);

    /// Waiting for the device to come back
    fn waiting(&mut self, duration: Duration);

    /// The wait is over
    fn wait_done(&mut self);

    /// A stage finished successfully
    fn stage_finished(&mut self, stage: Stage);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn stage_started(&mut self, _stage: Stage) {}
    fn stage_skipped(&mut self, _stage: Stage, _reason: &str) {}
    fn step(&mut self, _stage: Stage, _description: &str) {}
    fn waiting(&mut self, _duration: Duration) {}
    fn wait_done(&mut self) {}
    fn stage_finished(&mut self, _stage: Stage) {}
}

/// Tools found on `PATH`, run with [`std::process::Command`]
#[derive(Debug, Clone, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let path = env::var_os("PATH")?;
        env::split_paths(&path)
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    }

    fn run(&mut self, tool: &str, args: &[String]) -> io::Result<ToolStatus> {
        let program = self.locate(tool).unwrap_or_else(|| PathBuf::from(tool));
        log::debug!("Running {} {}", program.display(), args.join(" "));
        let status = Command::new(&program).args(args).status()?;
        if status.success() {
            Ok(ToolStatus::Success)
        } else {
            Ok(ToolStatus::Failed(status.code()))
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Filesystems a UF2 bootloader volume can show up as
const REMOVABLE_FS: &[&str] = &["vfat", "msdos", "exfat", "fuseblk"];

/// The real machine
#[derive(Debug, Clone)]
pub struct SystemHost {
    mounts_table: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self {
            mounts_table: PathBuf::from("/proc/self/mounts"),
        }
    }
}

impl SystemHost {
    /// Create a host reading mounts from `/proc/self/mounts`
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetHost for SystemHost {
    fn copy_image(&mut self, src: &Path, dest: &Path) -> io::Result<()> {
        log::debug!("Copying {} to {}", src.display(), dest.display());
        fs::copy(src, dest).map(|_| ())
    }

    fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
        match fs::read_to_string(&self.mounts_table) {
            Ok(table) => Ok(parse_mounts(&table)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} not available, no mount points", self.mounts_table.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn serial_ports(&self) -> io::Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Extract removable-media mount points from a `/proc/mounts` style table
fn parse_mounts(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            REMOVABLE_FS
                .iter()
                .any(|fs| *fs == fs_type)
                .then(|| PathBuf::from(unescape_mount(mount_point)))
        })
        .collect()
}

/// Undo the octal escaping of spaces, tabs and backslashes in mount tables
fn unescape_mount(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}
