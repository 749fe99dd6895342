//! Filesystem helpers for save files: magic header, compression and codecs.

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::warn;

const SAVE_FILE_MAGIC_LEN: usize = 8;
const SAVE_FILE_MAGIC: [u8; SAVE_FILE_MAGIC_LEN] = *b"NESTREL\x1a";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[must_use]
pub enum Error {
    #[error("invalid nestrel header: {0}")]
    InvalidHeader(String),
    #[error("failed to write nestrel header: {0:?}")]
    WriteHeaderFailed(std::io::Error),
    #[error("failed to encode data: {0:?}")]
    EncodingFailed(std::io::Error),
    #[error("failed to decode data: {0:?}")]
    DecodingFailed(std::io::Error),
    #[error("failed to serialize data: {0}")]
    SerializationFailed(String),
    #[error("failed to deserialize data: {0}")]
    DeserializationFailed(String),
    #[error("invalid path: {0:?}")]
    InvalidPath(PathBuf),
    #[error("{context}: {source:?}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

impl Error {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }
}

/// Writes the magic header identifying a nestrel save file.
pub(crate) fn write_header(f: &mut impl Write) -> std::io::Result<()> {
    f.write_all(&SAVE_FILE_MAGIC)
}

/// Verifies a nestrel save file header.
pub(crate) fn validate_header(f: &mut impl Read) -> Result<()> {
    let mut magic = [0u8; SAVE_FILE_MAGIC_LEN];
    f.read_exact(&mut magic)
        .map_err(|err| Error::InvalidHeader(err.to_string()))?;
    if magic == SAVE_FILE_MAGIC {
        Ok(())
    } else {
        Err(Error::InvalidHeader(format!(
            "invalid magic (expected {SAVE_FILE_MAGIC:?}, found: {magic:?})",
        )))
    }
}

pub(crate) fn writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| Error::io(err, format!("failed to create directory {parent:?}")))?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|err| Error::io(err, format!("failed to create file {path:?}")))
}

pub(crate) fn reader(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| Error::io(err, format!("failed to open file {path:?}")))
}

pub fn encode(mut writer: &mut impl Write, data: &[u8]) -> std::io::Result<()> {
    let mut encoder = DeflateEncoder::new(&mut writer, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(())
}

pub fn decode(data: impl Read) -> std::io::Result<Vec<u8>> {
    let mut decoded = vec![];
    let mut decoder = DeflateDecoder::new(data);
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Save a serializable value with a validated header and deflate compression.
pub fn save<T>(path: impl AsRef<Path>, value: &T) -> Result<()>
where
    T: ?Sized + Serialize,
{
    let data =
        bincode::serialize(value).map_err(|err| Error::SerializationFailed(err.to_string()))?;
    let mut writer = writer(path)?;
    write_header(&mut writer).map_err(Error::WriteHeaderFailed)?;
    encode(&mut writer, &data).map_err(Error::EncodingFailed)?;
    Ok(())
}

/// Load a value previously written by [`save`].
pub fn load<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut reader = reader(path)?;
    validate_header(&mut reader)?;
    let data = decode(&mut reader).map_err(Error::DecodingFailed)?;
    bincode::deserialize(&data).map_err(|err| Error::DeserializationFailed(err.to_string()))
}

#[must_use]
pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

#[must_use]
pub fn filename(path: &Path) -> &str {
    path.file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or_else(|| {
            warn!("invalid path without file_name: {path:?}");
            "??"
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_header() {
        let mut file = Vec::new();
        assert!(write_header(&mut file).is_ok(), "write header");
        assert!(
            validate_header(&mut file.as_slice()).is_ok(),
            "validate header"
        );
    }

    #[test]
    fn bad_magic_rejected() {
        let file = b"NOTANES\x1a".to_vec();
        assert!(
            validate_header(&mut file.as_slice()).is_err(),
            "wrong magic must fail"
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let data = b"scanline 241, cycle 1".to_vec();
        let mut encoded = Vec::new();
        encode(&mut encoded, &data).expect("encode");
        let decoded = decode(encoded.as_slice()).expect("decode");
        assert_eq!(decoded, data, "deflate round trip");
    }
}
