/** Storage of analysis results as msgpack, to enable off-line re-plotting and comparisons.
 *
 * Paths ending in `.zst` are zstd compressed.
 */
use rmp_serde::{Deserializer, Serializer};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXTENSION: &str = "msgpack";
pub const EXTENSION_ZSTD: &str = "msgpack.zst";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to access {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to encode {}: {error}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        error: rmp_serde::encode::Error,
    },
    #[error("failed to decode {}: {error}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        error: rmp_serde::decode::Error,
    },
    #[error("{}: zstd support is disabled", path.display())]
    ZstdUnsupported { path: PathBuf },
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "zst")
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |error| ArchiveError::Io {
        path: path.to_path_buf(),
        error,
    }
}

pub fn write_archive<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
    let path = path.as_ref();
    let encode_error = |error| ArchiveError::Encode {
        path: path.to_path_buf(),
        error,
    };
    let mut f1 = std::fs::File::create(path).map_err(io_error(path))?;
    if is_zstd(path) {
        #[cfg(feature = "use_zstd")]
        {
            let mut encoder = zstd::Encoder::new(f1, 0)
                .map_err(io_error(path))?
                .auto_finish();
            let mut s = Serializer::new(&mut encoder);
            return value.serialize(&mut s).map_err(encode_error);
        }
        #[cfg(not(feature = "use_zstd"))]
        {
            return Err(ArchiveError::ZstdUnsupported {
                path: path.to_path_buf(),
            });
        }
    }
    let mut s = Serializer::new(&mut f1);
    value.serialize(&mut s).map_err(encode_error)
}

pub fn read_archive<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ArchiveError> {
    let path = path.as_ref();
    let decode_error = |error| ArchiveError::Decode {
        path: path.to_path_buf(),
        error,
    };
    let buf = std::fs::read(path).map_err(io_error(path))?;
    if is_zstd(path) {
        #[cfg(feature = "use_zstd")]
        {
            let mut decoder = zstd::Decoder::new(&buf[..]).map_err(io_error(path))?;
            let mut deserializer = Deserializer::new(&mut decoder);
            return T::deserialize(&mut deserializer).map_err(decode_error);
        }
        #[cfg(not(feature = "use_zstd"))]
        {
            return Err(ArchiveError::ZstdUnsupported {
                path: path.to_path_buf(),
            });
        }
    }
    let mut deserializer = Deserializer::new(&buf[..]);
    T::deserialize(&mut deserializer).map_err(decode_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::LatencyBounds;

    #[test]
    fn compressed_and_plain() {
        let bounds = LatencyBounds {
            l2_upper: 14.5,
            l3_lower: 40.25,
            l3_upper: 61.0,
            ram_ceiling: 230.0,
            l3_upper_sigmas: 1.0,
        };
        let dir = tempfile::tempdir().unwrap();
        for name in ["bounds.msgpack", "bounds.msgpack.zst"] {
            let path = dir.path().join(name);
            write_archive(&bounds, &path).unwrap();
            let read: LatencyBounds = read_archive(&path).unwrap();
            assert_eq!(read, bounds);
        }
        let err = read_archive::<LatencyBounds>(dir.path().join("missing.msgpack")).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }
}
