//! Reply sink for `receive --reply-to`.

use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

/// File that is created (and truncated) on the first write only.
///
/// A receive that produces no reply leaves an existing file untouched.
#[derive(Debug)]
pub struct ReplyFile {
    path: PathBuf,
    file: Option<File>,
}

impl ReplyFile {
    /// Sink for `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: None }
    }

    /// Whether anything has been written.
    pub fn is_opened(&self) -> bool {
        self.file.is_some()
    }
}

impl Write for ReplyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::create(&self.path)?,
        };
        self.file.insert(file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().map_or(Ok(()), Write::flush)
    }
}
