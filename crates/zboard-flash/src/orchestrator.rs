//! Two-stage flash state machine
//!
//! ```text
//! NotStarted ──(marker present)──────────────────────┐
//!     │                                              v
//!     └──> BootloaderFlashing ──> BootloaderInstalled ──> WaitingForReenumeration
//!                                        │                        │
//!                                        └──(skipped)──┐          │
//!                                                      v          v
//!                                   Done <── Resetting <── ApplicationFlashing
//!
//! any state ──(error)──> Aborted
//! ```
//!
//! The marker is written as soon as the bootloader tools report success,
//! before the device has been seen again. A tool that exits zero without the
//! device ever rebooting leaves a marker behind and later runs skip the
//! bootloader; delete the marker file to force a new install.

use core::fmt;
use std::path::{Path, PathBuf};

use zboard_core::board::{StagePlan, Step};

use crate::error::{Choice, FlashError, Result, Stage};
use crate::host::{FlashProgress, Prompt, TargetHost, ToolRunner, ToolStatus};
use crate::marker::ProgressMarker;
use crate::plan::{FlashPlan, UploadContext};
use crate::template::{render_args, TemplateContext};

/// States of the flash sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashState {
    /// Nothing done yet
    NotStarted,
    /// Bootloader tools are running
    BootloaderFlashing,
    /// Bootloader is on the device (flashed now or earlier)
    BootloaderInstalled,
    /// Waiting for the device to reboot into the bootloader
    WaitingForReenumeration,
    /// Application tools are running
    ApplicationFlashing,
    /// Device reset is running
    Resetting,
    /// Upload finished
    Done,
    /// Upload failed
    Aborted,
}

impl FlashState {
    /// Check whether no further transitions can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::BootloaderFlashing => "flashing bootloader",
            Self::BootloaderInstalled => "bootloader installed",
            Self::WaitingForReenumeration => "waiting for re-enumeration",
            Self::ApplicationFlashing => "flashing application",
            Self::Resetting => "resetting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What happened to the bootloader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootloaderOutcome {
    /// Flashed during this run
    Flashed,
    /// Skipped because the marker was present
    Skipped,
}

/// What happened to the reset step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Device was reset
    Ok,
    /// Reset failed; the application upload still succeeded
    Failed {
        /// Exit code of the reset tool, if any
        code: Option<i32>,
    },
    /// The plan has no reset step
    NotConfigured,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    /// Bootloader stage outcome
    pub bootloader: BootloaderOutcome,
    /// Serial port used at the end of the upload
    pub port: Option<String>,
    /// Reset step outcome
    pub reset: ResetOutcome,
}

/// Everything the orchestrator talks to
pub struct FlashEnv<'e> {
    /// External tools
    pub tools: &'e mut dyn ToolRunner,
    /// Volumes, ports and delays
    pub host: &'e mut dyn TargetHost,
    /// Operator choices
    pub prompt: &'e mut dyn Prompt,
    /// Progress reporting
    pub progress: &'e mut dyn FlashProgress,
}

/// Drives one upload attempt of one board
#[derive(Debug)]
pub struct FlashOrchestrator {
    plan: FlashPlan,
    ctx: UploadContext,
    marker: ProgressMarker,
    port: Option<String>,
    state: FlashState,
    history: Vec<FlashState>,
}

impl FlashOrchestrator {
    /// Create an orchestrator in the `NotStarted` state
    pub fn new(plan: FlashPlan, ctx: UploadContext) -> Self {
        let marker = ProgressMarker::new(ctx.marker.clone());
        let port = ctx.port.clone();
        Self {
            plan,
            ctx,
            marker,
            port,
            state: FlashState::NotStarted,
            history: vec![FlashState::NotStarted],
        }
    }

    /// Current state
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[FlashState] {
        &self.history
    }

    /// Bootloader progress marker of this upload
    pub fn marker(&self) -> &ProgressMarker {
        &self.marker
    }

    /// Run the upload to completion
    ///
    /// Errors leave the orchestrator in [`FlashState::Aborted`]. A marker
    /// written before the failure stays in place.
    pub fn run(&mut self, env: &mut FlashEnv<'_>) -> Result<FlashReport> {
        if self.state != FlashState::NotStarted {
            log::warn!("Upload already ran ({}), starting over", self.state);
            self.state = FlashState::NotStarted;
            self.history = vec![FlashState::NotStarted];
            self.port = self.ctx.port.clone();
        }

        match self.drive(env) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.transition(FlashState::Aborted);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: FlashState) {
        log::debug!("Flash state: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn drive(&mut self, env: &mut FlashEnv<'_>) -> Result<FlashReport> {
        let upload = self.plan.upload().clone();
        let installed = self.marker.exists();

        self.check_tools(env, installed)?;
        self.resolve_port(env, installed)?;

        let bootloader = if installed {
            log::info!(
                "Bootloader marker {} found, skipping bootloader",
                self.marker.path().display()
            );
            env.progress
                .stage_skipped(Stage::Bootloader, "bootloader already installed");
            self.transition(FlashState::BootloaderInstalled);
            BootloaderOutcome::Skipped
        } else {
            self.transition(FlashState::BootloaderFlashing);
            let build_dir = self.ctx.boot_build_dir.clone();
            self.run_stage(env, Stage::Bootloader, &upload.bootloader, &build_dir)?;
            self.marker.record()?;
            self.transition(FlashState::BootloaderInstalled);

            self.transition(FlashState::WaitingForReenumeration);
            let delay = upload.reboot_delay();
            log::info!("Waiting {} ms for the device to reboot", delay.as_millis());
            env.progress.waiting(delay);
            env.host.delay(delay);
            env.progress.wait_done();

            if upload.reselect_port {
                let port = self.select_port(env)?;
                log::info!("Using serial port {}", port);
                self.port = Some(port);
            }
            BootloaderOutcome::Flashed
        };

        self.transition(FlashState::ApplicationFlashing);
        let build_dir = self.ctx.app_build_dir.clone();
        self.run_stage(env, Stage::Application, &upload.application, &build_dir)?;

        let reset = match &upload.reset {
            Some(step) => {
                self.transition(FlashState::Resetting);
                let image = build_dir.join(&upload.application.image);
                match self.run_step(env, Stage::Reset, step, &build_dir, &image) {
                    Ok(()) => ResetOutcome::Ok,
                    Err(e) => {
                        log::warn!("Application uploaded, but {}", e);
                        ResetOutcome::Failed {
                            code: e.exit_code(),
                        }
                    }
                }
            }
            None => ResetOutcome::NotConfigured,
        };

        self.transition(FlashState::Done);
        Ok(FlashReport {
            bootloader,
            port: self.port.clone(),
            reset,
        })
    }

    /// Check every tool the remaining stages need before anything runs
    fn check_tools(&self, env: &FlashEnv<'_>, bootloader_installed: bool) -> Result<()> {
        let upload = self.plan.upload();
        let boot_steps = upload.bootloader.steps.iter().filter(|_| !bootloader_installed);
        let steps = boot_steps
            .chain(upload.application.steps.iter())
            .chain(upload.reset.iter());

        for tool in steps.filter_map(Step::tool) {
            match env.tools.locate(tool) {
                Some(path) => log::debug!("Found {} at {}", tool, path.display()),
                None => {
                    return Err(FlashError::ToolNotFound {
                        tool: tool.to_string(),
                        board: self.plan.board().to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Ask for the port now if a step needs it before any re-selection
    fn resolve_port(&mut self, env: &mut FlashEnv<'_>, bootloader_installed: bool) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let Some(stage) = self
            .plan
            .port_needed_by(bootloader_installed, &self.ctx.extra_args)
        else {
            return Ok(());
        };

        let port = self.select_port(env).map_err(|e| match e {
            FlashError::NoCandidates { .. } => FlashError::MissingPort { stage },
            e => e,
        })?;
        log::info!("Using serial port {}", port);
        self.port = Some(port);
        Ok(())
    }

    fn run_stage(
        &mut self,
        env: &mut FlashEnv<'_>,
        stage: Stage,
        plan: &StagePlan,
        build_dir: &Path,
    ) -> Result<()> {
        log::info!("Uploading {} to {}", stage, self.plan.board());
        env.progress.stage_started(stage);
        let image = build_dir.join(&plan.image);
        for step in &plan.steps {
            self.run_step(env, stage, step, build_dir, &image)?;
        }
        env.progress.stage_finished(stage);
        log::info!("{} stage finished", stage);
        Ok(())
    }

    fn run_step(
        &mut self,
        env: &mut FlashEnv<'_>,
        stage: Stage,
        step: &Step,
        build_dir: &Path,
        image: &Path,
    ) -> Result<()> {
        match step {
            Step::Run { tool, args, hint } => {
                let ctx = TemplateContext {
                    stage,
                    build_dir,
                    image,
                    port: self.port.as_deref(),
                    extra_args: &self.ctx.extra_args,
                };
                let args = render_args(args, &ctx)?;
                env.progress.step(stage, tool);
                log::debug!("{} step: {} {}", stage, tool, args.join(" "));

                match env.tools.run(tool, &args) {
                    Ok(ToolStatus::Success) => Ok(()),
                    Ok(ToolStatus::Failed(code)) => Err(FlashError::FlashTool {
                        stage,
                        tool: tool.clone(),
                        code,
                        hint: hint.clone(),
                    }),
                    Err(source) => Err(FlashError::Spawn {
                        tool: tool.clone(),
                        source,
                    }),
                }
            }
            Step::CopyToVolume { dest } => {
                if !image.is_file() {
                    return Err(FlashError::MissingImage {
                        stage,
                        path: image.to_path_buf(),
                    });
                }
                let volume = self.select_volume(env)?;
                let target = volume.join(dest);
                env.progress.step(stage, &format!("copy to {}", volume.display()));

                // The device reboots as soon as the image is complete
                if let Err(e) = env.host.copy_image(image, &target) {
                    log::debug!("Ignoring copy error for {}: {}", target.display(), e);
                }
                Ok(())
            }
        }
    }

    fn select_volume(&self, env: &mut FlashEnv<'_>) -> Result<PathBuf> {
        let mounts = env
            .host
            .mount_points()
            .map_err(|source| FlashError::Enumerate {
                kind: Choice::MountPoint,
                source,
            })?;
        let candidates: Vec<String> = mounts.iter().map(|m| m.display().to_string()).collect();
        choose(env, Choice::MountPoint, &candidates).map(PathBuf::from)
    }

    fn select_port(&self, env: &mut FlashEnv<'_>) -> Result<String> {
        let ports = env
            .host
            .serial_ports()
            .map_err(|source| FlashError::Enumerate {
                kind: Choice::SerialPort,
                source,
            })?;
        choose(env, Choice::SerialPort, &ports)
    }
}

/// Let the prompt decide, even with nothing listed, so presets still apply
fn choose(env: &mut FlashEnv<'_>, kind: Choice, candidates: &[String]) -> Result<String> {
    match env.prompt.choose(kind, candidates) {
        Ok(choice) => Ok(choice),
        Err(_) if candidates.is_empty() => Err(FlashError::NoCandidates { kind }),
        Err(e) => Err(FlashError::Prompt(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::time::Duration;

    use zboard_core::board::{BoardDatabase, UploadMethod};

    use crate::host::NoProgress;
    use crate::testutil::scratch_dir;

    #[derive(Default)]
    struct FakeTools {
        installed: Vec<&'static str>,
        /// (command line substring, exit code)
        failures: Vec<(&'static str, i32)>,
        calls: Vec<String>,
    }

    impl FakeTools {
        fn with(installed: &[&'static str]) -> Self {
            Self {
                installed: installed.to_vec(),
                ..Default::default()
            }
        }
    }

    impl ToolRunner for FakeTools {
        fn locate(&self, tool: &str) -> Option<PathBuf> {
            self.installed
                .iter()
                .any(|t| *t == tool)
                .then(|| PathBuf::from("/usr/bin").join(tool))
        }

        fn run(&mut self, tool: &str, args: &[String]) -> io::Result<ToolStatus> {
            let line = format!("{} {}", tool, args.join(" "));
            let failure = self.failures.iter().find(|(needle, _)| line.contains(needle));
            self.calls.push(line.clone());
            Ok(match failure {
                Some((_, code)) => ToolStatus::Failed(Some(*code)),
                None => ToolStatus::Success,
            })
        }
    }

    #[derive(Default)]
    struct FakeHost {
        mounts: Vec<PathBuf>,
        ports: Vec<String>,
        copy_fails: bool,
        copies: Vec<(PathBuf, PathBuf)>,
        delays: Vec<Duration>,
    }

    impl TargetHost for FakeHost {
        fn copy_image(&mut self, src: &Path, dest: &Path) -> io::Result<()> {
            self.copies.push((src.to_path_buf(), dest.to_path_buf()));
            if self.copy_fails {
                Err(io::Error::new(io::ErrorKind::NotFound, "device disappeared"))
            } else {
                Ok(())
            }
        }

        fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
            Ok(self.mounts.clone())
        }

        fn serial_ports(&self) -> io::Result<Vec<String>> {
            Ok(self.ports.clone())
        }

        fn delay(&mut self, duration: Duration) {
            self.delays.push(duration);
        }
    }

    /// Answers with the preset, or picks the last candidate
    #[derive(Default)]
    struct FakePrompt {
        preset: Option<String>,
        asked: Vec<Choice>,
    }

    impl Prompt for FakePrompt {
        fn choose(&mut self, kind: Choice, candidates: &[String]) -> io::Result<String> {
            self.asked.push(kind);
            if let Some(preset) = &self.preset {
                return Ok(preset.clone());
            }
            candidates
                .last()
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "nothing to choose"))
        }
    }

    fn orchestrator(board: &str, method: UploadMethod, dir: &Path, port: Option<&str>) -> FlashOrchestrator {
        let db = BoardDatabase::builtin();
        let plan = FlashPlan::for_board(db.get(board).unwrap(), method).unwrap();
        FlashOrchestrator::new(
            plan,
            UploadContext {
                boot_build_dir: dir.join("mcuboot/build"),
                app_build_dir: dir.join("app/build"),
                marker: dir.join("bootloader_installed"),
                port: port.map(str::to_string),
                extra_args: Vec::new(),
            },
        )
    }

    fn dk(dir: &Path, port: Option<&str>) -> FlashOrchestrator {
        orchestrator("nrf52840dk_nrf52840", UploadMethod::SerialDfu, dir, port)
    }

    #[test]
    fn test_mass_storage_full_run() {
        let dir = scratch_dir("orch_mass_storage");
        let uf2 = dir.join("mcuboot/build/zephyr/zephyr.uf2");
        fs::create_dir_all(uf2.parent().unwrap()).unwrap();
        fs::write(&uf2, b"UF2").unwrap();

        let mut orch = orchestrator("xiao_ble", UploadMethod::MassStorage, &dir, None);
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost {
            mounts: vec![PathBuf::from("/media/me/XIAO-SENSE")],
            ports: vec!["/dev/ttyACM0".into(), "/dev/ttyACM1".into()],
            ..Default::default()
        };
        let mut prompt = FakePrompt::default();
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut prompt,
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.bootloader, BootloaderOutcome::Flashed);
        assert_eq!(report.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(report.reset, ResetOutcome::Ok);
        assert!(orch.marker().exists());

        assert_eq!(
            host.copies,
            [(uf2, PathBuf::from("/media/me/XIAO-SENSE/zephyr.uf2"))]
        );
        assert_eq!(host.delays, [Duration::from_millis(2000)]);
        assert_eq!(prompt.asked, [Choice::MountPoint, Choice::SerialPort]);

        assert_eq!(tools.calls.len(), 2);
        let app_image = dir.join("app/build/zephyr/zephyr.signed.bin");
        assert!(tools.calls[0].contains("dev=/dev/ttyACM1,baud=115200"));
        assert!(tools.calls[0].ends_with(&format!("image upload -e {}", app_image.display())));
        assert!(tools.calls[1].ends_with("reset"));

        assert_eq!(
            orch.history(),
            [
                FlashState::NotStarted,
                FlashState::BootloaderFlashing,
                FlashState::BootloaderInstalled,
                FlashState::WaitingForReenumeration,
                FlashState::ApplicationFlashing,
                FlashState::Resetting,
                FlashState::Done,
            ]
        );
    }

    #[test]
    fn test_marker_skips_bootloader() {
        let dir = scratch_dir("orch_marker_skip");
        ProgressMarker::new(dir.join("bootloader_installed")).record().unwrap();

        // nrfutil is only needed for the bootloader
        let mut orch = dk(&dir, Some("/dev/ttyACM0"));
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost::default();
        let mut prompt = FakePrompt::default();
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut prompt,
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.bootloader, BootloaderOutcome::Skipped);
        assert!(tools.calls.iter().all(|c| c.starts_with("mcumgr ")));
        assert_eq!(tools.calls.len(), 2);
        assert!(host.delays.is_empty());
        assert!(prompt.asked.is_empty());
        assert_eq!(
            orch.history(),
            [
                FlashState::NotStarted,
                FlashState::BootloaderInstalled,
                FlashState::ApplicationFlashing,
                FlashState::Resetting,
                FlashState::Done,
            ]
        );
    }

    #[test]
    fn test_missing_tool_spawns_nothing() {
        let dir = scratch_dir("orch_missing_tool");
        let mut orch = dk(&dir, Some("/dev/ttyACM0"));
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost::default();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap_err();

        assert!(matches!(&err, FlashError::ToolNotFound { tool, .. } if tool == "nrfutil"));
        assert!(err.to_string().contains("nrfutil"));
        assert!(tools.calls.is_empty());
        assert_eq!(orch.state(), FlashState::Aborted);
        assert!(!orch.marker().exists());
    }

    #[test]
    fn test_bootloader_failure_leaves_no_marker() {
        let dir = scratch_dir("orch_boot_fail");
        let mut orch = dk(&dir, Some("/dev/ttyACM0"));
        let mut tools = FakeTools::with(&["nrfutil", "mcumgr"]);
        tools.failures.push(("nrfutil pkg generate", 1));
        let mut host = FakeHost::default();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap_err();

        match &err {
            FlashError::FlashTool {
                stage, code, hint, ..
            } => {
                assert_eq!(*stage, Stage::Bootloader);
                assert_eq!(*code, Some(1));
                assert_eq!(hint.as_deref(), Some("creating boot image failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tools.calls.len(), 1);
        assert!(!orch.marker().exists());
        assert_eq!(
            orch.history(),
            [
                FlashState::NotStarted,
                FlashState::BootloaderFlashing,
                FlashState::Aborted,
            ]
        );
    }

    #[test]
    fn test_application_failure_keeps_marker() {
        let dir = scratch_dir("orch_app_fail");
        let mut orch = dk(&dir, Some("/dev/ttyACM0"));
        let mut tools = FakeTools::with(&["nrfutil", "mcumgr"]);
        tools.failures.push(("image upload", 4));
        let mut host = FakeHost {
            ports: vec!["/dev/ttyACM2".into()],
            ..Default::default()
        };
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(4));
        assert!(err.to_string().starts_with("application stage failed"));
        assert!(orch.marker().exists());
        // No reset after a failed upload
        assert!(!tools.calls.iter().any(|c| c.ends_with("reset")));
        assert_eq!(orch.state(), FlashState::Aborted);

        // The retry goes straight to the application
        tools.failures.clear();
        tools.calls.clear();
        let mut orch = dk(&dir, Some("/dev/ttyACM2"));
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap();
        assert_eq!(report.bootloader, BootloaderOutcome::Skipped);
        assert!(!tools.calls.iter().any(|c| c.starts_with("nrfutil")));
    }

    #[test]
    fn test_copy_error_is_swallowed() {
        let dir = scratch_dir("orch_copy_error");
        let uf2 = dir.join("mcuboot/build/zephyr/zephyr.uf2");
        fs::create_dir_all(uf2.parent().unwrap()).unwrap();
        fs::write(&uf2, b"UF2").unwrap();

        let mut orch = orchestrator("xiao_ble", UploadMethod::MassStorage, &dir, None);
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost {
            mounts: vec![PathBuf::from("/media/XIAO")],
            ports: vec!["/dev/ttyACM0".into()],
            copy_fails: true,
            ..Default::default()
        };
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.bootloader, BootloaderOutcome::Flashed);
        assert_eq!(host.copies.len(), 1);
        assert!(orch.marker().exists());
    }

    #[test]
    fn test_missing_image_and_no_volume() {
        let dir = scratch_dir("orch_missing_image");
        let mut orch = orchestrator("xiao_ble", UploadMethod::MassStorage, &dir, None);
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost::default();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap_err();
        assert!(matches!(err, FlashError::MissingImage { stage: Stage::Bootloader, .. }));

        let uf2 = dir.join("mcuboot/build/zephyr/zephyr.uf2");
        fs::create_dir_all(uf2.parent().unwrap()).unwrap();
        fs::write(&uf2, b"UF2").unwrap();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            FlashError::NoCandidates {
                kind: Choice::MountPoint
            }
        ));
        assert!(!orch.marker().exists());
    }

    #[test]
    fn test_reset_failure_is_secondary() {
        let dir = scratch_dir("orch_reset_fail");
        ProgressMarker::new(dir.join("bootloader_installed")).record().unwrap();

        let mut orch = dk(&dir, Some("/dev/ttyACM0"));
        let mut tools = FakeTools::with(&["mcumgr"]);
        tools.failures.push(("baud=115200 reset", 2));
        let mut host = FakeHost::default();
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.reset, ResetOutcome::Failed { code: Some(2) });
        assert_eq!(orch.state(), FlashState::Done);
    }

    #[test]
    fn test_missing_port_stops_before_spawn() {
        let dir = scratch_dir("orch_missing_port");
        let mut orch = dk(&dir, None);
        let mut tools = FakeTools::with(&["nrfutil", "mcumgr"]);
        let mut host = FakeHost::default();
        let mut prompt = FakePrompt::default();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut prompt,
                progress: &mut NoProgress,
            })
            .unwrap_err();

        assert!(matches!(
            err,
            FlashError::MissingPort {
                stage: Stage::Bootloader
            }
        ));
        assert!(tools.calls.is_empty());
        assert_eq!(prompt.asked, [Choice::SerialPort]);
        assert_eq!(orch.history(), [FlashState::NotStarted, FlashState::Aborted]);
    }

    #[test]
    fn test_port_asked_before_bootloader() {
        let dir = scratch_dir("orch_port_up_front");
        let mut orch = dk(&dir, None);
        let mut tools = FakeTools::with(&["nrfutil", "mcumgr"]);
        let mut host = FakeHost {
            ports: vec!["/dev/ttyACM0".into(), "/dev/ttyACM3".into()],
            ..Default::default()
        };
        let mut prompt = FakePrompt::default();
        orch.run(&mut FlashEnv {
            tools: &mut tools,
            host: &mut host,
            prompt: &mut prompt,
            progress: &mut NoProgress,
        })
        .unwrap();

        // Asked once up front and once more after the reboot
        assert_eq!(prompt.asked, [Choice::SerialPort, Choice::SerialPort]);
        assert!(tools.calls[1].starts_with("nrfutil --verbose dfu usb-serial"));
        assert!(tools.calls[1].contains("-p /dev/ttyACM3"));
    }

    #[test]
    fn test_missing_tool_is_reported_before_asking_for_port() {
        let dir = scratch_dir("orch_tool_before_port");
        let mut orch = dk(&dir, None);
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost {
            ports: vec!["/dev/ttyACM0".into()],
            ..Default::default()
        };
        let mut prompt = FakePrompt::default();
        let err = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut prompt,
                progress: &mut NoProgress,
            })
            .unwrap_err();

        assert!(matches!(err, FlashError::ToolNotFound { .. }));
        assert!(prompt.asked.is_empty());
    }

    #[test]
    fn test_preset_volume_without_mount_points() {
        let dir = scratch_dir("orch_preset_volume");
        let uf2 = dir.join("mcuboot/build/zephyr/zephyr.uf2");
        fs::create_dir_all(uf2.parent().unwrap()).unwrap();
        fs::write(&uf2, b"UF2").unwrap();

        let mut orch = orchestrator("xiao_ble", UploadMethod::MassStorage, &dir, None);
        let mut tools = FakeTools::with(&["mcumgr"]);
        let mut host = FakeHost::default();
        let mut prompt = FakePrompt {
            preset: Some("/Volumes/XIAO-SENSE".to_string()),
            ..Default::default()
        };
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut prompt,
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.bootloader, BootloaderOutcome::Flashed);
        assert_eq!(
            host.copies,
            [(uf2, PathBuf::from("/Volumes/XIAO-SENSE/zephyr.uf2"))]
        );
    }

    #[test]
    fn test_debug_probe_extra_args() {
        let dir = scratch_dir("orch_west");
        let db = BoardDatabase::builtin();
        let board = db.get("adafruit_feather_nrf52840").unwrap();
        let plan = FlashPlan::for_board(board, UploadMethod::DebugProbe).unwrap();
        let mut orch = FlashOrchestrator::new(
            plan,
            UploadContext {
                boot_build_dir: dir.join("mcuboot/build"),
                app_build_dir: dir.join("app/build"),
                marker: dir.join("bootloader_installed"),
                port: None,
                extra_args: vec!["--runner".into(), "jlink".into()],
            },
        );
        let mut tools = FakeTools::with(&["west"]);
        let mut host = FakeHost::default();
        let report = orch
            .run(&mut FlashEnv {
                tools: &mut tools,
                host: &mut host,
                prompt: &mut FakePrompt::default(),
                progress: &mut NoProgress,
            })
            .unwrap();

        assert_eq!(report.reset, ResetOutcome::NotConfigured);
        assert_eq!(report.port, None);
        assert_eq!(
            tools.calls,
            [
                format!(
                    "west flash -d {} --hex-file {} --runner jlink",
                    dir.join("mcuboot/build").display(),
                    dir.join("mcuboot/build/zephyr/zephyr.hex").display()
                ),
                format!(
                    "west flash -d {} --hex-file {} --runner jlink",
                    dir.join("app/build").display(),
                    dir.join("app/build/zephyr/zephyr.signed.confirmed.hex").display()
                ),
            ]
        );
        assert!(orch.marker().exists());
    }
}
