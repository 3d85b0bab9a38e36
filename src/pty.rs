use crate::error::SessionError;
use crate::pty_reader::spawn_reader;
use crate::shell::Shell;
use async_trait::async_trait;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The wallet shell running inside a PTY.
///
/// The child is started in its own session with the PTY as its controlling
/// terminal, so signals aimed at our terminal (Ctrl-C) never reach it and the
/// batch can shut it down in order.
pub struct PtySession {
    command: String,
    // Keeps the PTY open for the child's lifetime.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output_rx: Receiver<Vec<u8>>,
    utf8_tail: Vec<u8>,
    terminated: bool,
}

impl PtySession {
    /// Spawn `command` with `args` in a fresh PTY, in `working_dir` or else
    /// our own current directory.
    pub fn start(
        command: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<Self, SessionError> {
        let launch_error = |reason: String| SessionError::Launch {
            command: command.to_string(),
            reason,
        };

        let pty_system = portable_pty::native_pty_system();

        // Wide enough that addresses and tx ids are never wrapped.
        let pty_size = PtySize {
            rows: 50,
            cols: 240,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(pty_size)
            .map_err(|e| launch_error(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }
        // portable-pty would otherwise start the child in $HOME.
        let cwd = match working_dir {
            Some(dir) => Some(dir.to_path_buf()),
            None => std::env::current_dir().ok(),
        };
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| launch_error(e.to_string()))?;
        // Only the child holds the slave side from here on, so EOF on the
        // reader means the child has gone.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| launch_error(format!("failed to get PTY writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| launch_error(format!("failed to get PTY reader: {e}")))?;

        info!(command, pid = ?child.process_id(), "wallet shell started");

        Ok(PtySession {
            command: command.to_string(),
            _master: pair.master,
            child,
            writer,
            output_rx: spawn_reader(reader),
            utf8_tail: Vec::new(),
            terminated: false,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

#[async_trait]
impl Shell for PtySession {
    fn send_line(&mut self, text: &str) -> Result<(), SessionError> {
        if self.terminated || !self.is_alive() {
            return Err(SessionError::Dead);
        }
        // `\r` is the Enter key; ICRNL turns it into `\n` for cooked-mode programs.
        match write_line(&mut self.writer, text) {
            Ok(()) => Ok(()),
            Err(_) if !self.is_alive() => Err(SessionError::Dead),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    fn poll(&mut self) -> String {
        let mut data = std::mem::take(&mut self.utf8_tail);
        while let Ok(chunk) = self.output_rx.try_recv() {
            data.extend_from_slice(&chunk);
        }
        let (text, tail) = split_utf8(data);
        self.utf8_tail = tail;
        text
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, exit_command: &str, grace: Duration) {
        if self.terminated {
            return;
        }
        if self.is_alive() {
            debug!(command = %self.command, exit_command, "asking wallet shell to exit");
            if let Err(e) = self.send_line(exit_command) {
                debug!(error = %e, "could not send exit command");
            }
            let start = Instant::now();
            while start.elapsed() < grace {
                if !self.is_alive() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self.is_alive() {
                warn!(pid = ?self.child.process_id(), "grace period expired, killing wallet shell");
                if let Err(e) = self.child.kill() {
                    warn!(error = %e, "failed to kill wallet shell");
                }
            }
        }
        self.terminated = true;
        info!(command = %self.command, "wallet shell terminated");
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.terminated && self.is_alive() {
            let _ = self.child.kill();
        }
    }
}

/// Decode `data`, holding back an incomplete UTF-8 sequence at the end so it
/// can be completed by the next chunk.
fn split_utf8(mut data: Vec<u8>) -> (String, Vec<u8>) {
    let err = match std::str::from_utf8(&data) {
        Ok(text) => return (text.to_owned(), Vec::new()),
        Err(e) => e,
    };
    let tail = if err.error_len().is_none() {
        data.split_off(err.valid_up_to())
    } else {
        Vec::new()
    };
    (String::from_utf8_lossy(&data).into_owned(), tail)
}

fn write_line(writer: &mut dyn Write, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\r")?;
    writer.flush()
}
