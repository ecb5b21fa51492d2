//! Bytecode file format for compiled programs.
//!
//! A compiled [`Program`] can be written to a `.fvbc` file and loaded back
//! without recompiling, so embedders can ship compiled formulas or cache
//! compilation across runs.
//!
//! # File Format
//!
//! ```text
//! +------------------+
//! | Magic (4 bytes)  |  "FVBC"
//! +------------------+
//! | Version (4 bytes)|  u32 format version
//! +------------------+
//! | Flags (4 bytes)  |  u32 feature flags
//! +------------------+
//! | Length (4 bytes) |  u32 length of serialized program
//! +------------------+
//! | Data (N bytes)   |  bincode-serialized Program
//! +------------------+
//! ```
//!
//! All integers are little-endian. Loading verifies the magic, rejects
//! versions newer than [`VERSION`], and validates the program's structural
//! invariants before returning it.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::ir::Program;

/// Magic bytes identifying a FormulaVM bytecode file.
pub const MAGIC: &[u8; 4] = b"FVBC";

/// Current bytecode format version.
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// Bytecode format error.
#[derive(Debug)]
pub enum BytecodeError {
    /// I/O error during file operations.
    IoError(std::io::Error),
    /// Invalid magic bytes - not a valid bytecode file.
    InvalidMagic,
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Deserialization error.
    DeserializeError(String),
    /// Serialization error.
    SerializeError(String),
    /// The decoded program failed invariant validation.
    InvalidProgram(String),
}

impl std::fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BytecodeError::IoError(e) => write!(f, "I/O error: {}", e),
            BytecodeError::InvalidMagic => {
                write!(f, "Invalid magic bytes - not a valid .fvbc file")
            }
            BytecodeError::UnsupportedVersion(v) => {
                write!(
                    f,
                    "Unsupported bytecode version: {} (current: {})",
                    v, VERSION
                )
            }
            BytecodeError::DeserializeError(e) => write!(f, "Failed to deserialize: {}", e),
            BytecodeError::SerializeError(e) => write!(f, "Failed to serialize: {}", e),
            BytecodeError::InvalidProgram(e) => write!(f, "Invalid program: {}", e),
        }
    }
}

impl std::error::Error for BytecodeError {}

impl From<std::io::Error> for BytecodeError {
    fn from(e: std::io::Error) -> Self {
        BytecodeError::IoError(e)
    }
}

/// Bytecode file flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytecodeFlags {
    /// Whether the file includes debug spans.
    pub has_spans: bool,
}

impl BytecodeFlags {
    fn to_u32(self) -> u32 {
        let mut flags: u32 = 0;
        if self.has_spans {
            flags |= 1 << 0;
        }
        flags
    }

    fn from_u32(value: u32) -> Self {
        Self {
            has_spans: (value & (1 << 0)) != 0,
        }
    }
}

/// Bytecode file header.
#[derive(Debug)]
pub struct BytecodeHeader {
    pub version: u32,
    pub flags: BytecodeFlags,
    pub payload_length: u32,
}

/// Save a program to a bytecode file.
pub fn save<P: AsRef<Path>>(program: &Program, path: P) -> Result<(), BytecodeError> {
    let bytes = to_bytes(program)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Load a program from a bytecode file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Program, BytecodeError> {
    let (program, _header) = load_with_header(path)?;
    Ok(program)
}

/// Load a program and its header from a bytecode file.
pub fn load_with_header<P: AsRef<Path>>(
    path: P,
) -> Result<(Program, BytecodeHeader), BytecodeError> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    let program = from_bytes(&data)?;
    let header = BytecodeHeader {
        version: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        flags: BytecodeFlags::from_u32(u32::from_le_bytes([data[8], data[9], data[10], data[11]])),
        payload_length: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
    };
    Ok((program, header))
}

/// Serialize a program to bytes (for in-memory use).
pub fn to_bytes(program: &Program) -> Result<Vec<u8>, BytecodeError> {
    let payload =
        bincode::serialize(program).map_err(|e| BytecodeError::SerializeError(e.to_string()))?;
    let flags = BytecodeFlags {
        has_spans: program.main.code.iter().any(|i| i.span.is_some()),
    };

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(MAGIC);
    result.extend_from_slice(&VERSION.to_le_bytes());
    result.extend_from_slice(&flags.to_u32().to_le_bytes());
    result.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a program from bytes (for in-memory use).
pub fn from_bytes(data: &[u8]) -> Result<Program, BytecodeError> {
    if data.len() < HEADER_LEN {
        return Err(BytecodeError::InvalidMagic);
    }
    if &data[0..4] != MAGIC {
        return Err(BytecodeError::InvalidMagic);
    }

    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version > VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }

    let length = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;
    if data.len() < HEADER_LEN + length {
        return Err(BytecodeError::DeserializeError("Truncated data".to_string()));
    }

    let program: Program = bincode::deserialize(&data[HEADER_LEN..HEADER_LEN + length])
        .map_err(|e| BytecodeError::DeserializeError(e.to_string()))?;

    program
        .validate()
        .map_err(|e| BytecodeError::InvalidProgram(e.to_string()))?;

    Ok(program)
}
