//! Invocation of the external `ovftool` executable.
//!
//! stdout and stderr are read on two threads and funnelled through one
//! channel, so the captured text holds both streams in arrival order.

use crate::config::TargetType;
use crate::error::{Error, Result};
use crossbeam_channel::Sender;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Read buffer size for the output reader threads.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Arguments for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArgs {
    pub target_type: TargetType,
    /// Compression level, 0 omits `--compress`.
    pub compression: u8,
    /// Path of the source VMX.
    pub source: String,
    /// Path of the appliance to create.
    pub target: String,
}

impl ConversionArgs {
    /// Build the argument vector.
    ///
    /// The order is fixed: `--targetType`, `--acceptAllEulas`, optional
    /// `--compress`, source, target.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--targetType={}", self.target_type),
            "--acceptAllEulas".to_string(),
        ];
        if self.compression > 0 {
            args.push(format!("--compress={}", self.compression));
        }
        args.push(self.source.clone());
        args.push(self.target.clone());
        args
    }
}

/// Handle on a resolved `ovftool` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvfTool {
    executable: PathBuf,
}

impl OvfTool {
    /// Use the executable at `executable`.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run the tool to completion and return its combined output.
    ///
    /// # Arguments
    ///
    /// * `args` - Command-line arguments, usually from [`ConversionArgs::to_args`].
    ///
    /// # Returns
    ///
    /// Everything the tool wrote to stdout and stderr, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the process cannot be started, and
    /// [`Error::ToolFailed`] with the captured output if it exits nonzero.
    pub fn run(&self, args: &[String]) -> Result<String> {
        info!(executable = %self.executable.display(), ?args, "running ovftool");

        let child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                executable: self.executable.clone(),
                source,
            })?;
        let mut child = ChildGuard::new(child);

        let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        // Ends once both readers hit EOF and drop their senders.
        let mut captured = Vec::new();
        for chunk in rx.iter() {
            captured.extend_from_slice(&chunk);
        }

        for reader in readers {
            reader
                .join()
                .map_err(|_| Error::io_simple(std::io::Error::other("output reader panicked")))??;
        }

        let status = child.wait()?;
        let output = String::from_utf8_lossy(&captured).into_owned();
        debug!(%status, bytes = captured.len(), "ovftool exited");

        if status.success() {
            Ok(output)
        } else {
            Err(Error::ToolFailed { status, output })
        }
    }
}

fn spawn_reader<R>(mut reader: R, tx: Sender<Vec<u8>>) -> JoinHandle<std::io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            // The receiver outlives every reader.
            let _ = tx.send(buf[..n].to_vec());
        }
    })
}

/// Kills and reaps the child if it is dropped before [`ChildGuard::wait`].
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.take())
    }

    fn stderr(&mut self) -> Option<std::process::ChildStderr> {
        self.child.as_mut().and_then(|c| c.stderr.take())
    }

    fn wait(mut self) -> Result<ExitStatus> {
        match self.child.take() {
            Some(mut child) => Ok(child.wait()?),
            None => Err(Error::io_simple(std::io::Error::other("child already reaped"))),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
