use std::io::Read;
use std::sync::mpsc::{Receiver, channel};
use std::thread;
use tracing::{error, trace};

/// Drains the PTY master into a channel from its own thread, so that
/// `PtySession::poll` never blocks.
///
/// Whatever the wallet shell wrote before exiting is still delivered after
/// it is gone. `EventStream` relies on that: it reports a dead session only
/// once the last output (an error line, `bye!`) has been classified. On
/// Linux a closed slave side reads as `EIO` rather than EOF, so any read
/// error ends the thread the same way.
pub fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = channel();

    let spawned = thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            let mut buffer = [0u8; 4096];
            let mut total = 0usize;
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n;
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        trace!(error = %e, "PTY read ended");
                        break;
                    }
                }
            }
            trace!(bytes = total, "PTY reader finished");
        });
    if let Err(e) = spawned {
        error!(error = %e, "failed to spawn PTY reader thread");
    }

    rx
}
