//! Pseudo-terminal relay
//!
//! The child gets the slave side of a fresh pty as its controlling terminal.
//! Our terminal is switched to raw mode and bytes are pumped both ways until
//! the child exits. Window size changes are forwarded with `SIGWINCH`.

use super::{exit_code, RelayCommand};
use crate::error::{IdaeError, IdaeResult};
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, Termios};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::process::Stdio;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

nix::ioctl_read_bad!(get_winsize, libc::TIOCGWINSZ, Winsize);
nix::ioctl_write_ptr_bad!(set_winsize, libc::TIOCSWINSZ, Winsize);

/// Size of the terminal behind `fd`, if it is one
fn window_size(fd: &impl AsRawFd) -> Option<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into `size`
    let rc = unsafe { get_winsize(fd.as_raw_fd(), &mut size) };
    rc.ok().map(|_| size)
}

fn resize(master: &OwnedFd, size: &Winsize) {
    // SAFETY: TIOCSWINSZ only reads from `size`
    if let Err(e) = unsafe { set_winsize(master.as_raw_fd(), size) } {
        debug!("Failed to resize pty: {}", e);
    }
}

fn duplicate(fd: impl AsFd, what: &str) -> IdaeResult<File> {
    fd.as_fd()
        .try_clone_to_owned()
        .map(File::from)
        .map_err(|e| IdaeError::child(format!("duplicating {}", what), e))
}

/// Restores the saved terminal attributes on drop
struct RawMode {
    terminal: File,
    saved: Termios,
}

impl RawMode {
    fn enable(terminal: &File) -> IdaeResult<Self> {
        let terminal = duplicate(terminal, "terminal descriptor")?;
        let saved = tcgetattr(&terminal)
            .map_err(|e| IdaeError::io("reading terminal mode", e.into()))?;
        let mut raw = saved.clone();
        cfmakeraw(&mut raw);
        tcsetattr(&terminal, SetArg::TCSANOW, &raw)
            .map_err(|e| IdaeError::io("enabling raw mode", e.into()))?;
        Ok(Self { terminal, saved })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(&self.terminal, SetArg::TCSANOW, &self.saved) {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Run `cmd` attached to a new pty wired to our stdin and stdout
pub async fn run(cmd: &RelayCommand) -> IdaeResult<i32> {
    let input = duplicate(io::stdin(), "stdin")?;
    let output = duplicate(io::stdout(), "stdout")?;
    relay(cmd, input, output).await
}

/// Relay `cmd` between a fresh pty and the terminal on `input` / `output`
///
/// Raw mode and the resize listener are in place before the child starts,
/// so neither its first keystrokes nor an early resize can be missed.
async fn relay(cmd: &RelayCommand, mut input: File, mut output: File) -> IdaeResult<i32> {
    let pty = openpty(window_size(&output).as_ref(), None)
        .map_err(|e| IdaeError::child("opening pseudo-terminal", e.into()))?;

    let mut changes = signal(SignalKind::window_change())
        .map_err(|e| IdaeError::child("listening for window changes", e))?;
    let raw = RawMode::enable(&input)?;

    let size_source = duplicate(&output, "stdout")?;
    let resize_master = pty
        .master
        .try_clone()
        .map_err(|e| IdaeError::child("duplicating pty descriptor", e))?;
    let mut reader = File::from(pty.master);
    let mut writer = duplicate(&reader, "pty descriptor")?;

    let mut child = {
        let slave = pty.slave;
        let dup = |fd: &OwnedFd| {
            fd.try_clone()
                .map_err(|e| IdaeError::child("duplicating pty descriptor", e))
        };

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::from(dup(&slave)?))
            .stdout(Stdio::from(dup(&slave)?))
            .stderr(Stdio::from(slave));
        // SAFETY: setsid and ioctl are async-signal-safe
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(io::Error::from)?;
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        debug!("Spawning on pty: {}", cmd);
        command
            .spawn()
            .map_err(|e| IdaeError::child(cmd.to_string(), e))?
        // `command` drops here, closing our copies of the slave
    };

    let winch = tokio::spawn(async move {
        while changes.recv().await.is_some() {
            if let Some(size) = window_size(&size_source) {
                resize(&resize_master, &size);
            }
        }
    });

    // Blocks on the input terminal until it closes; never joined
    std::thread::spawn(move || {
        let _ = io::copy(&mut input, &mut writer);
    });

    let pump = tokio::task::spawn_blocking(move || pump_output(&mut reader, &mut output));

    let status = child
        .wait()
        .await
        .map_err(|e| IdaeError::child(cmd.to_string(), e));
    winch.abort();
    if pump.await.is_err() {
        debug!("Output relay task ended abnormally");
    }
    drop(raw);

    Ok(exit_code(status?))
}

/// Copy pty output to `out` until the slave side is closed
fn pump_output(master: &mut impl Read, out: &mut impl Write) {
    let mut buf = [0u8; 8192];
    loop {
        match master.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if out.write_all(&buf[..n]).and_then(|_| out.flush()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports EIO once every slave descriptor is closed
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::OpenptyResult;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::termios::LocalFlags;
    use nix::unistd::getpid;
    use std::time::Duration;

    fn size(rows: u16, cols: u16) -> Winsize {
        Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }

    /// Stand-in for the user's terminal: relay through its slave side
    fn terminal(rows: u16, cols: u16) -> (OpenptyResult, File, File) {
        let outer = openpty(Some(&size(rows, cols)), None).unwrap();
        let input = duplicate(&outer.slave, "slave").unwrap();
        let output = duplicate(&outer.slave, "slave").unwrap();
        (outer, input, output)
    }

    /// Everything the relay wrote to the outer terminal so far
    fn screen(outer: &OpenptyResult) -> String {
        let mut master = duplicate(&outer.master, "master").unwrap();
        let mut buf = [0u8; 4096];
        let n = master.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn sh(script: &str) -> RelayCommand {
        RelayCommand::new("sh").args(["-c", script])
    }

    #[test]
    fn pump_copies_until_eof() {
        let mut out = Vec::new();
        pump_output(&mut &b"hello\r\nworld"[..], &mut out);
        assert_eq!(out, b"hello\r\nworld");
    }

    #[test]
    fn resize_applies_to_pty() {
        let pty = openpty(None, None).unwrap();
        resize(&pty.master, &size(40, 132));

        let actual = window_size(&pty.slave).unwrap();
        assert_eq!((actual.ws_row, actual.ws_col), (40, 132));
    }

    #[tokio::test]
    async fn child_sees_terminal_size_and_exit_code_is_kept() {
        let (outer, input, output) = terminal(24, 80);

        let code = relay(&sh("stty size; exit 3"), input, output).await.unwrap();

        assert_eq!(code, 3);
        assert!(screen(&outer).contains("24 80"));
    }

    #[tokio::test]
    async fn window_change_reaches_child() {
        let (outer, input, output) = terminal(24, 80);

        let resized = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            resize(&outer.master, &size(40, 132));
            kill(getpid(), Signal::SIGWINCH).unwrap();
        };
        let command = sh("sleep 2; stty size");
        let (code, ()) = tokio::join!(relay(&command, input, output), resized);

        assert_eq!(code.unwrap(), 0);
        assert!(screen(&outer).contains("40 132"));
    }

    #[tokio::test]
    async fn terminal_mode_is_restored() {
        let (outer, input, output) = terminal(24, 80);
        let before = tcgetattr(&outer.slave).unwrap();
        assert!(before.local_flags.contains(LocalFlags::ICANON));

        relay(&sh("true"), input, output).await.unwrap();

        let after = tcgetattr(&outer.slave).unwrap();
        assert!(after.local_flags.contains(LocalFlags::ICANON));
        assert!(after.local_flags.contains(LocalFlags::ECHO));
    }

    #[tokio::test]
    async fn non_terminal_input_fails_before_spawning() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("started");
        let input = tempfile::tempfile().unwrap();
        let output = tempfile::tempfile().unwrap();

        let cmd = sh(&format!("touch '{}'", marker.display()));
        let err = relay(&cmd, input, output).await.unwrap_err();

        assert!(matches!(err, IdaeError::Io { .. }));
        assert!(!marker.exists());
    }
}
