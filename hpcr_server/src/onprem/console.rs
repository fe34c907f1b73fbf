//! Console-log subprocess fence (§4.7): reading a console log through
//! libvirt's stream API is known to hang, so the production path spawns
//! this same executable's `download` subcommand instead and kills it after a
//! 5s deadline.

use hpcr_definitions::SshConfig;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Spawns `self_exe download --path <volume_key>`, feeds `ssh_config` as
/// JSON on stdin, and returns stdout if the child exits within 5s. On
/// timeout the child is still reachable through the shared handle, so the
/// deadline branch kills it instead of leaking a hung subprocess.
pub fn read_console_log_via_subprocess(
    self_exe: &str,
    ssh_config: &SshConfig,
    volume_key: &str,
) -> crate::Result<String> {
    let payload = serde_json::to_vec(ssh_config)?;

    let mut child = Command::new(self_exe)
        .arg("download")
        .arg("--path")
        .arg(volume_key)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    child
        .stdin
        .take()
        .expect("stdin was piped")
        .write_all(&payload)?;

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");
    let stdout_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).ok();
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).ok();
        buf
    });

    let child = Arc::new(Mutex::new(child));
    let (tx, rx) = mpsc::channel();
    let waiter_child = Arc::clone(&child);
    thread::spawn(move || {
        // Polls rather than blocking on `wait()` so the lock is only held
        // briefly each iteration, leaving it free for the timeout branch
        // to grab and kill the child.
        loop {
            let status = waiter_child.lock().expect("child mutex poisoned").try_wait();
            match status {
                Ok(Some(status)) => {
                    let _ = tx.send(Ok(status));
                    return;
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }
    });

    match rx.recv_timeout(READ_DEADLINE) {
        Ok(Ok(status)) => collect_output(status, stdout_reader, stderr_reader),
        Ok(Err(e)) => Err(format_err!("download subcommand failed: {}", e)),
        Err(_) => {
            kill_and_reap(&child);
            Err(format_err!("console log read exceeded the 5s deadline"))
        }
    }
}

fn collect_output(
    status: ExitStatus,
    stdout_reader: thread::JoinHandle<Vec<u8>>,
    stderr_reader: thread::JoinHandle<Vec<u8>>,
) -> crate::Result<String> {
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    if status.success() {
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    } else {
        Err(format_err!(
            "download subcommand exited with {}: {}",
            status,
            String::from_utf8_lossy(&stderr)
        ))
    }
}

fn kill_and_reap(child: &Arc<Mutex<Child>>) {
    let mut child = child.lock().expect("child mutex poisoned");
    if let Err(e) = child.kill() {
        warn!("failed to kill timed-out download subprocess: {}", e);
    }
    child.wait().ok();
}
