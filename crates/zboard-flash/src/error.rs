//! Error types for zboard-flash

use core::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Part of the upload a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Bootloader installation
    Bootloader,
    /// Application upload
    Application,
    /// Device reset after the application upload
    Reset,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootloader => write!(f, "bootloader"),
            Self::Application => write!(f, "application"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Something the operator is asked to pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    /// Mounted volume to copy a UF2 image onto
    MountPoint,
    /// Serial port to talk to the device on
    SerialPort,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MountPoint => write!(f, "mount point"),
            Self::SerialPort => write!(f, "serial port"),
        }
    }
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn with_hint(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(": {}", hint),
        None => String::new(),
    }
}

/// Flash orchestration errors
#[derive(Debug, Error)]
pub enum FlashError {
    /// Board lookup or plan selection failed
    #[error(transparent)]
    Board(#[from] zboard_core::Error),

    /// Required external tool is not installed
    #[error("{tool} must be installed to upload to {board}")]
    ToolNotFound {
        /// Missing program
        tool: String,
        /// Board being uploaded
        board: String,
    },

    /// External tool exited with a non-zero status
    #[error("{stage} stage failed: {tool} exited with {}{}", exit_status(.code), with_hint(.hint))]
    FlashTool {
        /// Stage the tool ran in
        stage: Stage,
        /// Program that failed
        tool: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Operator hint from the board's upload plan
        hint: Option<String>,
    },

    /// External tool could not be started
    #[error("failed to start {tool}: {source}")]
    Spawn {
        /// Program that could not be started
        tool: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Progress marker could not be read or written
    #[error("cannot access progress marker {}: {source}", path.display())]
    Marker {
        /// Marker file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A step needs the serial port but none is known
    #[error("{stage} stage needs a serial port, but none was given")]
    MissingPort {
        /// Stage of the step
        stage: Stage,
    },

    /// Stage image does not exist
    #[error("{stage} image {} not found, was it built?", path.display())]
    MissingImage {
        /// Stage of the image
        stage: Stage,
        /// Expected path
        path: PathBuf,
    },

    /// Nothing to choose from
    #[error("no {kind} found, is the device connected?")]
    NoCandidates {
        /// What was being chosen
        kind: Choice,
    },

    /// Enumerating candidates failed
    #[error("cannot list {kind}s: {source}")]
    Enumerate {
        /// What was being enumerated
        kind: Choice,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Operator prompt failed
    #[error("prompt failed: {0}")]
    Prompt(#[source] io::Error),

    /// Argument template could not be rendered
    #[error("invalid argument template '{template}': {message}")]
    Template {
        /// Offending template
        template: String,
        /// What is wrong with it
        message: String,
    },
}

impl FlashError {
    /// Exit code of the failed external tool, if that is what failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::FlashTool { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result type alias using FlashError
pub type Result<T> = core::result::Result<T, FlashError>;
