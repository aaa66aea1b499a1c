//! Locators for blocking hardware byte streams.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};

/// A blocking byte stream handed to the worker thread.
pub type ByteStream = Box<dyn Read + Send>;

/// Opens the underlying byte stream of a hardware source.
///
/// `open` runs on the stream's worker thread and may block for as long as
/// the device takes; the caller is protected by the open deadline.
pub trait StreamOpener: Send + 'static {
    /// Opens a fresh stream.
    fn open(&mut self) -> io::Result<ByteStream>;

    /// Human-readable locator used in logs and errors.
    fn locator(&self) -> String;

    /// True if the stream replays recorded bytes rather than generating
    /// them, so its throughput says nothing about the source.
    fn is_replay(&self) -> bool {
        false
    }
}

/// A character device such as `/dev/hwrng`.
#[derive(Debug, Clone)]
pub struct DevicePath {
    path: PathBuf,
}

impl DevicePath {
    /// Reads from `path`; nothing is opened until [`StreamOpener::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamOpener for DevicePath {
    fn open(&mut self) -> io::Result<ByteStream> {
        let file = File::open(&self.path)?;
        Ok(Box::new(file))
    }

    fn locator(&self) -> String {
        self.path.display().to_string()
    }

    /// Regular files are recordings; device nodes and pipes are live.
    fn is_replay(&self) -> bool {
        std::fs::metadata(&self.path).is_ok_and(|m| m.is_file())
    }
}

/// An external process whose stdout is the random stream.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Runs `program` with `args`; nothing is spawned until opened.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a command from `argv`; `None` if it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl StreamOpener for ExternalCommand {
    fn open(&mut self) -> io::Result<ByteStream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "child stdout not captured"));
        };

        Ok(Box::new(ChildStream { child, stdout }))
    }

    fn locator(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Child stdout that kills and reaps the process when closed.
struct ChildStream {
    child: Child,
    stdout: ChildStdout,
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
