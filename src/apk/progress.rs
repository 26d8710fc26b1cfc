//! Running apk with a progress bar.
//!
//! apk reports progress as `done/total` lines on the file descriptor given
//! with `--progress-fd`. We point that descriptor at a FIFO inside the
//! chroot and feed the lines into an indicatif bar from a reader thread.

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::Stdio;
use std::thread::{self, JoinHandle};

use super::driver::run_checked;
use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::process::{Cmd, Privilege};

/// FIFO location inside the chroot.
pub const FIFO_PATH: &str = "/tmp/apk_progress_fifo";

/// Written by us after apk exits so the reader thread stops.
const END_MARKER: &str = "pmb-progress-end";

/// Parse one `done/total` line from apk's progress fd.
pub fn parse_progress(line: &str) -> Option<(u64, u64)> {
    let (done, total) = line.trim().split_once('/')?;
    let done = done.parse().ok()?;
    let total = total.parse().ok()?;
    Some((done, total))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{prefix} [{wide_bar:.cyan/blue}] {percent:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

fn recreate_fifo(chroot: &Chroot, privilege: &Privilege) -> ApkResult<()> {
    run_checked(chroot.root_cmd(privilege, ["rm", "-f", FIFO_PATH]))?;
    run_checked(chroot.root_cmd(privilege, ["mkfifo", "-m", "666", FIFO_PATH]))?;
    Ok(())
}

/// Reader thread feeding a FIFO into a progress bar.
///
/// Dropping it stops the thread, clears the bar and runs `cleanup`, on
/// every exit path of the caller.
struct FifoReader {
    marker_writer: File,
    reader: Option<JoinHandle<()>>,
    bar: ProgressBar,
    cleanup: Option<Cmd>,
}

impl FifoReader {
    fn start(fifo_host: &Path, bar: ProgressBar, cleanup: Cmd) -> ApkResult<Self> {
        // Opening read-write never blocks on a FIFO and keeps it from hitting
        // EOF before apk opened its end.
        let fifo = OpenOptions::new()
            .read(true)
            .write(true)
            .open(fifo_host)
            .map_err(|e| ApkError::io(format!("opening {}", fifo_host.display()), e))?;
        let marker_writer = fifo
            .try_clone()
            .map_err(|e| ApkError::io("duplicating progress FIFO handle", e))?;

        let reader_bar = bar.clone();
        let reader = thread::spawn(move || {
            for line in BufReader::new(fifo).lines().map_while(Result::ok) {
                if line == END_MARKER {
                    break;
                }
                if let Some((done, total)) = parse_progress(&line) {
                    reader_bar.set_length(total);
                    reader_bar.set_position(done);
                }
            }
        });

        Ok(Self {
            marker_writer,
            reader: Some(reader),
            bar,
            cleanup: Some(cleanup),
        })
    }
}

impl Drop for FifoReader {
    fn drop(&mut self) {
        if let Err(err) = writeln!(self.marker_writer, "{}", END_MARKER) {
            tracing::warn!("writing to progress FIFO: {}", err);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.bar.finish_and_clear();
        if let Some(cleanup) = self.cleanup.take() {
            if let Err(err) = cleanup.allow_fail().run() {
                tracing::warn!("removing progress FIFO: {:#}", err);
            }
        }
    }
}

/// Run `apk <args>` inside the chroot, rendering its progress.
pub fn run_with_progress(chroot: &Chroot, privilege: &Privilege, args: &[String]) -> ApkResult<()> {
    recreate_fifo(chroot, privilege)?;

    let bar = progress_bar();
    bar.set_prefix(format!("({})", chroot.suffix));
    let progress = FifoReader::start(
        &chroot.host_path(FIFO_PATH),
        bar,
        chroot.root_cmd(privilege, ["rm", "-f", FIFO_PATH]),
    )?;

    let script = format!("exec 3>{}; exec apk --progress-fd 3 \"$@\"", FIFO_PATH);
    let cmd = chroot
        .root_cmd(privilege, ["sh", "-c", script.as_str(), "sh"])
        .args(args);
    tracing::debug!("% {}", cmd.display());

    let mut child = cmd
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {}", cmd.display()))?;

    let stdout = child.stdout.take().context("Failed to capture apk stdout")?;
    let stderr = child.stderr.take().context("Failed to capture apk stderr")?;
    let stdout_thread = thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            tracing::debug!("{}", line);
        }
    });
    let stderr_thread = thread::spawn(move || collect(stderr));

    let status = child
        .wait()
        .with_context(|| format!("Failed to wait for: {}", cmd.display()))?;

    let _ = stdout_thread.join();
    let stderr = stderr_thread.join().unwrap_or_default();
    drop(progress);

    if !status.success() {
        return Err(ApkError::ExternalToolFailure {
            command: cmd.display(),
            exit_code: status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

fn collect(mut stream: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
