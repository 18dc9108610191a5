//! Buffered `multipart/form-data` encoding.
//!
//! Entries are streamed one by one into an in-memory body so the finished
//! request can be replayed on retry. Every source is dropped, and so closed,
//! as soon as it has been copied or has failed.

use crate::error::BuildError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Content of a single form entry.
pub enum FormValue {
    /// Plain text field.
    Text(String),
    /// Plain field read from an arbitrary source.
    Reader(Box<dyn Read + Send>),
    /// File field read from disk; the filename is the path's last component.
    File(PathBuf),
    /// File field read from an arbitrary source under an explicit filename.
    NamedReader {
        /// Filename sent in the part header.
        filename: String,
        /// Content source.
        reader: Box<dyn Read + Send>,
    },
}

impl fmt::Debug for FormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::NamedReader { filename, .. } => f
                .debug_struct("NamedReader")
                .field("filename", filename)
                .finish_non_exhaustive(),
        }
    }
}

/// One keyed entry of a multipart form.
#[derive(Debug)]
pub struct FormEntry {
    /// Form key.
    pub key: String,
    /// Entry content.
    pub value: FormValue,
}

impl FormEntry {
    /// A plain text field.
    pub fn field(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: FormValue::Text(value.into()),
        }
    }

    /// A plain field whose content is read from `reader`.
    pub fn reader(key: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            key: key.into(),
            value: FormValue::Reader(Box::new(reader)),
        }
    }

    /// A file field opened from `path` when the form is encoded.
    pub fn file(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            value: FormValue::File(path.into()),
        }
    }

    /// A file field with an explicit filename and content source.
    pub fn named(
        key: impl Into<String>,
        filename: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            value: FormValue::NamedReader {
                filename: filename.into(),
                reader: Box::new(reader),
            },
        }
    }
}

/// Writer producing a boundary-delimited multipart body.
#[derive(Debug)]
pub struct Multipart {
    boundary: String,
    buf: BytesMut,
    parts: usize,
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    /// Create a writer with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(random_boundary())
    }

    /// Create a writer with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: BytesMut::new(),
            parts: 0,
        }
    }

    /// The boundary token.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode every entry in order.
    pub fn write_entries(&mut self, entries: Vec<FormEntry>) -> Result<(), BuildError> {
        for entry in entries {
            self.write_entry(entry)?;
        }
        Ok(())
    }

    /// Encode one entry, choosing file or field encoding from its source.
    pub fn write_entry(&mut self, entry: FormEntry) -> Result<(), BuildError> {
        let FormEntry { key, value } = entry;
        let result = match value {
            FormValue::Text(text) => self.write_field(&key, text.as_bytes()),
            FormValue::Reader(mut reader) => self.write_field(&key, &mut reader),
            FormValue::File(path) => File::open(&path).and_then(|mut file| {
                let filename = file_name(&path);
                self.write_file(&key, &filename, &mut file)
            }),
            FormValue::NamedReader {
                filename,
                mut reader,
            } => self.write_file(&key, &filename, &mut reader),
        };
        result.map_err(|source| BuildError::Io { key, source })
    }

    /// Write a plain field part.
    pub fn write_field(&mut self, key: &str, content: impl Read) -> io::Result<()> {
        self.begin_part(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n",
            escape_quotes(key)
        ));
        self.copy(content)
    }

    /// Write a file part.
    pub fn write_file(&mut self, key: &str, filename: &str, content: impl Read) -> io::Result<()> {
        self.begin_part(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n",
            escape_quotes(key),
            escape_quotes(filename),
            mime::APPLICATION_OCTET_STREAM
        ));
        self.copy(content)
    }

    /// Write the closing delimiter and return the body.
    pub fn finish(mut self) -> Bytes {
        if self.parts > 0 {
            self.buf.put_slice(b"\r\n");
        }
        self.buf
            .put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf.freeze()
    }

    fn begin_part(&mut self, headers: &str) {
        if self.parts > 0 {
            self.buf.put_slice(b"\r\n");
        }
        self.buf
            .put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.buf.put_slice(headers.as_bytes());
        self.buf.put_slice(b"\r\n");
        self.parts += 1;
    }

    fn copy(&mut self, mut content: impl Read) -> io::Result<()> {
        let mut writer = (&mut self.buf).writer();
        io::copy(&mut content, &mut writer)?;
        Ok(())
    }
}

/// Encode `entries` and return the body with its `Content-Type` value.
pub fn encode(entries: Vec<FormEntry>) -> Result<(Bytes, String), BuildError> {
    let mut form = Multipart::new();
    form.write_entries(entries)?;
    let content_type = form.content_type();
    Ok((form.finish(), content_type))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn random_boundary() -> String {
    use rand::Rng;
    let bytes: [u8; 30] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
