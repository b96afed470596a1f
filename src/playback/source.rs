/// Image sources and URI resolution.
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Where the bytes of a GIF come from.
pub enum ImageSource {
    /// Resolved through the collaborator's [`SourceResolver`].
    Uri(String),
    /// An already open stream, read to the end once.
    Stream(Box<dyn Read + Send>),
    Bytes(Arc<[u8]>),
}

impl ImageSource {
    /// Read the whole source into memory.
    pub fn read_all(self, resolver: &dyn SourceResolver) -> Result<Vec<u8>> {
        match self {
            ImageSource::Bytes(bytes) => Ok(bytes.to_vec()),
            ImageSource::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                Ok(buf)
            }
            ImageSource::Uri(uri) => {
                let mut stream = resolver.open(&uri)?;
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                debug!("Read {} bytes from {}", buf.len(), uri);
                Ok(buf)
            }
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            ImageSource::Stream(_) => f.write_str("Stream(..)"),
            ImageSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes.into())
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Uri(path.to_string_lossy().into_owned())
    }
}

/// Turns a URI into an open byte stream. Supplied by the embedding collaborator.
pub trait SourceResolver: Send + Sync {
    fn open(&self, uri: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// Resolves plain paths and `file://` URIs, relative paths against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, uri: &str) -> io::Result<PathBuf> {
        let path = match uri.split_once("://") {
            Some(("file", rest)) => rest,
            Some((scheme, _)) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported URI scheme: {scheme}"),
                ));
            }
            None => uri,
        };

        let path = Path::new(path);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl SourceResolver for FileResolver {
    fn open(&self, uri: &str) -> io::Result<Box<dyn Read + Send>> {
        let path = self.resolve(uri)?;
        let file = std::fs::File::open(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(io::BufReader::new(file)))
    }
}
