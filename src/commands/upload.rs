//! Upload command implementation

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use zboard_core::board::{BoardArgs, BoardDatabase, UploadMethod};
use zboard_flash::host::{FlashProgress, Prompt, SystemHost, SystemTools};
use zboard_flash::{
    Choice, FlashEnv, FlashOrchestrator, FlashPlan, ResetOutcome, Stage, UploadContext,
};

/// Options of the upload command
#[derive(Debug, Clone)]
pub struct UploadArgs {
    pub board: String,
    pub boot_dir: PathBuf,
    pub app_dir: PathBuf,
    pub marker: PathBuf,
    pub port: Option<String>,
    pub use_west: bool,
    pub method: Option<UploadMethod>,
    pub flash_args: Vec<String>,
    pub delay_ms: Option<u64>,
    pub mount: Option<PathBuf>,
    pub new_port: Option<String>,
}

// =============================================================================
// Progress reporting
// =============================================================================

/// Create a standard spinner style
fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

/// Create a progress bar style for the reboot wait
fn create_wait_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
        .progress_chars("#>-"))
}

/// Progress reporter using indicatif spinners
#[derive(Default)]
pub struct IndicatifProgress {
    current: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn spinner(&mut self, message: String) {
        self.clear();
        let pb = ProgressBar::new_spinner();
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current = Some(pb);
    }

    fn finish(&mut self, message: String) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(message);
        }
    }

    fn clear(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}

impl FlashProgress for IndicatifProgress {
    fn stage_started(&mut self, stage: Stage) {
        self.spinner(format!("Uploading {}...", stage));
    }

    fn stage_skipped(&mut self, stage: Stage, reason: &str) {
        self.clear();
        println!("Skipping {}: {}", stage, reason);
    }

    fn step(&mut self, stage: Stage, description: &str) {
        if let Some(pb) = &self.current {
            pb.set_message(format!("Uploading {}: {}", stage, description));
        }
    }

    fn waiting(&mut self, duration: Duration) {
        self.clear();
        // The wait is a single blocking sleep, so the bar only shows the span
        let pb = ProgressBar::new(duration.as_millis() as u64);
        pb.set_style(create_wait_style().unwrap_or_else(|_| ProgressStyle::default_bar()));
        pb.set_message(format!("Waiting {} ms for the device to reboot", duration.as_millis()));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current = Some(pb);
    }

    fn wait_done(&mut self) {
        if let Some(pb) = &self.current {
            pb.set_position(pb.length().unwrap_or(0));
        }
        self.finish("Device rebooted".to_string());
    }

    fn stage_finished(&mut self, stage: Stage) {
        self.finish(format!("Uploaded {}", stage));
    }
}

// =============================================================================
// Operator prompt
// =============================================================================

/// Numbered choice on the terminal, with optional preset answers
pub struct TerminalPrompt {
    mount: Option<PathBuf>,
    new_port: Option<String>,
}

impl TerminalPrompt {
    pub fn new(mount: Option<PathBuf>, new_port: Option<String>) -> Self {
        Self { mount, new_port }
    }

    fn preset(&self, kind: Choice) -> Option<String> {
        match kind {
            Choice::MountPoint => self.mount.as_ref().map(|m| m.display().to_string()),
            Choice::SerialPort => self.new_port.clone(),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn choose(&mut self, kind: Choice, candidates: &[String]) -> io::Result<String> {
        if let Some(preset) = self.preset(kind) {
            log::debug!("Using preset {} {}", kind, preset);
            return Ok(preset);
        }
        match candidates {
            [] => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no {} found and none given", kind),
                ))
            }
            [only] => {
                println!("Using {} {}", kind, only);
                return Ok(only.clone());
            }
            _ => {}
        }

        let stdin = io::stdin();
        ask(&mut stdin.lock(), &mut io::stdout(), kind, candidates)
    }
}

/// Ask until the operator enters a valid number
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    kind: Choice,
    candidates: &[String],
) -> io::Result<String> {
    writeln!(output, "Select the {}:", kind)?;
    for (i, candidate) in candidates.iter().enumerate() {
        writeln!(output, "  [{}] {}", i + 1, candidate)?;
    }
    loop {
        write!(output, "> ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no {} selected", kind),
            ));
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => return Ok(candidates[n - 1].clone()),
            _ => writeln!(output, "Enter a number between 1 and {}", candidates.len())?,
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// Run the upload command
pub fn run_upload(db: &BoardDatabase, args: UploadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let board = db.get(&args.board)?;
    let method = args.method.unwrap_or_else(|| {
        board.select_method(&BoardArgs {
            use_west: args.use_west,
        })
    });

    let mut plan = FlashPlan::for_board(board, method)?;
    if let Some(delay_ms) = args.delay_ms {
        plan = plan.with_reboot_delay(delay_ms);
    }
    log::info!("Uploading to {} with {}", board.name, method);

    let mut tools = SystemTools;
    let mut host = SystemHost::new();
    let mut prompt = TerminalPrompt::new(args.mount, args.new_port);

    let mut orchestrator = FlashOrchestrator::new(
        plan,
        UploadContext {
            boot_build_dir: args.boot_dir,
            app_build_dir: args.app_dir,
            marker: args.marker,
            port: args.port,
            extra_args: args.flash_args,
        },
    );
    let mut progress = IndicatifProgress::new();
    let report = orchestrator.run(&mut FlashEnv {
        tools: &mut tools,
        host: &mut host,
        prompt: &mut prompt,
        progress: &mut progress,
    })?;

    match report.reset {
        ResetOutcome::Ok => println!("Upload complete, device reset"),
        ResetOutcome::Failed { .. } => {
            println!("Upload complete, but the device could not be reset; reset it manually")
        }
        ResetOutcome::NotConfigured => println!("Upload complete"),
    }
    Ok(())
}
