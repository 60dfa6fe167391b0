//! Binary archives for the `cpio` build view

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::api::Body;

/// Packs files of a directory into one streamed archive
pub trait Archiver: Send + Sync {
    /// Start archiving `names`, relative to `dir`
    fn archive(&self, dir: &Path, names: &[String]) -> Result<Body>;
}

/// Runs `cpio -o -H newc` and streams its output
pub struct CpioArchiver {
    program: PathBuf,
}

impl CpioArchiver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for CpioArchiver {
    fn default() -> Self {
        Self::new("cpio")
    }
}

impl Archiver for CpioArchiver {
    fn archive(&self, dir: &Path, names: &[String]) -> Result<Body> {
        let mut child = Command::new(&self.program)
            .args(["--quiet", "-o", "-H", "newc", "-C", "8192"])
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        let mut stdin = child.stdin.take().context("cpio stdin unavailable")?;
        let stdout = child.stdout.take().context("cpio stdout unavailable")?;
        let list: String = names.iter().map(|name| format!("{}\n", name)).collect();

        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(list.as_bytes()).await {
                debug!(error = %e, "cpio closed its input early");
            }
            drop(stdin);
            match child.wait().await {
                Ok(status) if !status.success() => warn!(%status, "cpio exited with failure"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not wait for cpio"),
            }
        });

        Ok(Body::Stream(Box::new(stdout)))
    }
}

/// A newc archive holding no files: just the trailer record, padded to 512 bytes
pub fn empty_archive() -> Vec<u8> {
    const TRAILER: &str = "TRAILER!!!";

    // ino mode uid gid nlink mtime filesize devmajor devminor rdevmajor rdevminor namesize check
    let fields: [u32; 13] = [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, TRAILER.len() as u32 + 1, 0];
    let mut out = b"070701".to_vec();
    for field in fields {
        out.extend_from_slice(format!("{:08X}", field).as_bytes());
    }
    out.extend_from_slice(TRAILER.as_bytes());
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out.resize(out.len().div_ceil(512) * 512, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_archive_layout() {
        let archive = empty_archive();
        assert_eq!(archive.len(), 512);
        assert!(archive.starts_with(b"070701"));
        assert_eq!(&archive[110..120], b"TRAILER!!!");
        // namesize field
        assert_eq!(&archive[94..102], b"0000000B");
        assert!(archive[121..].iter().all(|b| *b == 0));
    }
}
