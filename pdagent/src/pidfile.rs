//! Pidfile lifecycle: the single-instance guard for the agent daemon.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::errors::{Error, Result};

/// An acquired pidfile. Holding this value means this process owns the
/// single-instance slot; call [`Pidfile::remove`] on clean shutdown.
#[derive(Debug)]
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Write this process's pid to `path`.
    ///
    /// Fails with [`Error::PidfileExists`] when the file is already present;
    /// the existing file is never truncated.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::PidfileExists(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        write!(file, "{}", std::process::id())?;
        tracing::info!(path = %path.display(), "wrote pidfile");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Read the pid recorded at `path`.
pub fn read_pid(path: &Path) -> Result<i32> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::PidfileMissing(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    raw.trim().parse().map_err(|_| Error::Internal {
        message: format!("pidfile {} does not contain a pid", path.display()),
    })
}

/// Send SIGTERM to the process recorded in the pidfile at `path`.
pub fn terminate(path: &Path) -> Result<()> {
    let pid = read_pid(path)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|err| Error::Internal {
        message: format!("failed to signal pid {pid}: {err}"),
    })?;
    tracing::info!(pid, "sent SIGTERM to running agent");
    Ok(())
}
