//! Long-lived `exiftool` process
//!
//! The tool runs in `-stay_open` mode and reads its arguments from stdin,
//! one per line. Each request ends with `-execute`; the tool answers with a
//! JSON document followed by a `{ready}` line.

use crate::core::error::{DownloadError, Result};
use crate::exif::{MetadataReader, Tags};
use log::{debug, info, warn};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READY: &str = "{ready}";
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

struct Running {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Wrapper around one `exiftool -stay_open True -@ -` process
pub struct ExifTool {
    program: PathBuf,
    running: Option<Running>,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn running(&mut self) -> Result<&mut Running> {
        if self.running.is_none() {
            self.start()?;
        }
        self.running
            .as_mut()
            .ok_or_else(|| DownloadError::ExifTool("exiftool is not running".to_string()))
    }

    /// Send one request and return the raw answer
    fn execute(&mut self, args: &[String]) -> Result<String> {
        let running = self.running()?;

        let mut request = args.join("\n");
        request.push_str("\n-execute\n");
        running
            .stdin
            .write_all(request.as_bytes())
            .and_then(|_| running.stdin.flush())
            .map_err(|e| DownloadError::ExifTool(format!("cannot send request: {}", e)))?;

        let mut output = String::new();
        loop {
            let mut line = String::new();
            let read = running
                .stdout
                .read_line(&mut line)
                .map_err(|e| DownloadError::ExifTool(format!("cannot read answer: {}", e)))?;
            if read == 0 {
                self.running = None;
                return Err(DownloadError::ExifTool("exiftool exited".to_string()));
            }
            if line.trim_end() == READY {
                break;
            }
            output.push_str(&line);
        }
        Ok(output)
    }
}

impl MetadataReader for ExifTool {
    fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        info!("Starting ExifTool...");
        let mut child = Command::new(&self.program)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                DownloadError::ExifTool(format!("cannot start {}: {}", self.program.display(), e))
            })?;

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                self.running = Some(Running {
                    child,
                    stdin,
                    stdout: BufReader::new(stdout),
                });
                Ok(())
            }
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                Err(DownloadError::ExifTool("exiftool has no stdio pipes".to_string()))
            }
        }
    }

    fn read_tags(&mut self, path: &Path, tags: &[&str]) -> Result<Tags> {
        let mut args: Vec<String> = ["-j", "-G", "-n", "-b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(tags.iter().map(|tag| format!("-{}", tag)));
        args.push(path.to_string_lossy().into_owned());

        let output = self.execute(&args)?;
        if output.trim().is_empty() {
            return Ok(Tags::new());
        }

        let value: Value = serde_json::from_str(&output)
            .map_err(|e| DownloadError::ExifTool(format!("invalid answer: {}", e)))?;
        match value {
            Value::Array(mut items) if !items.is_empty() => match items.swap_remove(0) {
                Value::Object(map) => Ok(map),
                _ => Ok(Tags::new()),
            },
            _ => Ok(Tags::new()),
        }
    }

    fn terminate(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        info!("Stopping ExifTool...");
        let _ = running
            .stdin
            .write_all(b"-stay_open\nFalse\n")
            .and_then(|_| running.stdin.flush());
        drop(running.stdin);

        let deadline = Instant::now() + TERMINATE_TIMEOUT;
        loop {
            match running.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("exiftool exited with {}", status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => break,
            }
        }
        warn!("exiftool did not exit, killing it");
        let _ = running.child.kill();
        let _ = running.child.wait();
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        self.terminate();
    }
}
