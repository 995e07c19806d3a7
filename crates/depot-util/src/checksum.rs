//! Single-pass file checksums for deploy requests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::UtilError;

const BUFFER_SIZE: usize = 64 * 1024;

/// A digest algorithm the remote store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    pub const ALL: [Self; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    /// Canonical name, as used in checksum headers and build-info JSON.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = UtilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(UtilError::UnsupportedAlgorithm { name: s.to_owned() }),
        }
    }
}

/// All three digests of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksums {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

enum Accumulator {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Accumulator {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(h) => h.update(chunk),
            Self::Sha1(h) => h.update(chunk),
            Self::Sha256(h) => h.update(chunk),
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Calculate the requested digests of a file, reading it once.
///
/// Every accumulator is fed from the same read loop, so asking for three
/// algorithms costs one pass over a large artifact. Duplicate algorithms are
/// calculated once. An empty request returns an empty map, after the file
/// itself has been checked.
///
/// # Errors
/// Returns `UtilError::Io` if the file does not exist or cannot be read, and
/// `UtilError::NotAFile` if the path is a directory.
pub fn calculate_checksums(
    path: &Path,
    algorithms: &[ChecksumAlgorithm],
) -> Result<BTreeMap<ChecksumAlgorithm, String>, UtilError> {
    let io_err = |source| UtilError::Io {
        path: path.display().to_string(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_err)?;
    if !metadata.is_file() {
        return Err(UtilError::NotAFile {
            path: path.display().to_string(),
        });
    }

    let requested: BTreeSet<ChecksumAlgorithm> = algorithms.iter().copied().collect();
    if requested.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut accumulators: Vec<(ChecksumAlgorithm, Accumulator)> = requested
        .into_iter()
        .map(|algorithm| (algorithm, Accumulator::new(algorithm)))
        .collect();

    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break;
        };
        for (_, accumulator) in &mut accumulators {
            accumulator.update(chunk);
        }
    }

    Ok(accumulators
        .into_iter()
        .map(|(algorithm, accumulator)| (algorithm, accumulator.finish()))
        .collect())
}

/// Like [`calculate_checksums`], with algorithms given by name (`"sha1"`, `"SHA-256"`, ...).
///
/// # Errors
/// Returns `UtilError::UnsupportedAlgorithm` for an unknown name, otherwise
/// the errors of [`calculate_checksums`].
pub fn calculate_checksums_by_name(
    path: &Path,
    names: &[&str],
) -> Result<BTreeMap<ChecksumAlgorithm, String>, UtilError> {
    let algorithms = names
        .iter()
        .map(|name| name.parse())
        .collect::<Result<Vec<ChecksumAlgorithm>, _>>()?;
    calculate_checksums(path, &algorithms)
}

/// MD5, SHA-1 and SHA-256 of a file in one pass.
///
/// # Errors
/// Returns an error if the file is missing, is a directory, or cannot be read.
pub fn file_checksums(path: &Path) -> Result<FileChecksums, UtilError> {
    let mut sums = calculate_checksums(path, &ChecksumAlgorithm::ALL)?;
    let mut take = |algorithm: ChecksumAlgorithm| sums.remove(&algorithm).unwrap_or_default();
    Ok(FileChecksums {
        md5: take(ChecksumAlgorithm::Md5),
        sha1: take(ChecksumAlgorithm::Sha1),
        sha256: take(ChecksumAlgorithm::Sha256),
    })
}
