use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::atomic_io::write_bytes_atomic;

use super::tensor::{ParamSet, Tensor};

const MAGIC: &[u8; 4] = b"WPCK";
pub const CHECKPOINT_FORMAT_VERSION: u16 = 1;
const MAX_TENSOR_RANK: usize = 8;

const KIND_TENSOR: u8 = 0;
const KIND_GROUP: u8 = 1;

/// A top-level checkpoint entry: a bare parameter or a named group of parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointEntry {
    Tensor(Tensor),
    Group(ParamSet),
}

/// Deserialized parameter container.
///
/// Top-level names map either to tensors (raw weights) or to groups such as
/// the `ema` variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    entries: BTreeMap<String, CheckpointEntry>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: ParamSet) -> Self {
        Self {
            entries: params
                .into_iter()
                .map(|(name, tensor)| (name, CheckpointEntry::Tensor(tensor)))
                .collect(),
        }
    }

    pub fn insert_tensor(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.entries
            .insert(name.into(), CheckpointEntry::Tensor(tensor));
    }

    pub fn insert_group(&mut self, name: impl Into<String>, params: ParamSet) {
        self.entries
            .insert(name.into(), CheckpointEntry::Group(params));
    }

    pub fn entries(&self) -> &BTreeMap<String, CheckpointEntry> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, CheckpointEntry> {
        self.entries
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        match self.entries.get(name) {
            Some(CheckpointEntry::Tensor(tensor)) => Some(tensor),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read/write checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checkpoint at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
}

pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    let bytes = encode_checkpoint(checkpoint, path)?;
    write_bytes_atomic(path, &bytes).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let bytes = fs::read(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_checkpoint(&bytes, path)
}

pub fn encode_checkpoint(checkpoint: &Checkpoint, path: &Path) -> Result<Vec<u8>, CheckpointError> {
    let mut payload = Vec::<u8>::new();
    for (name, entry) in &checkpoint.entries {
        write_string(&mut payload, name, path)?;
        match entry {
            CheckpointEntry::Tensor(tensor) => {
                payload.push(KIND_TENSOR);
                write_tensor(&mut payload, tensor, path)?;
            }
            CheckpointEntry::Group(params) => {
                payload.push(KIND_GROUP);
                payload.extend_from_slice(&(params.len() as u32).to_le_bytes());
                for (member, tensor) in params {
                    write_string(&mut payload, member, path)?;
                    write_tensor(&mut payload, tensor, path)?;
                }
            }
        }
    }

    let mut bytes = Vec::<u8>::with_capacity(payload.len() + 50);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&CHECKPOINT_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(checkpoint.entries.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&sha256_bytes(&payload));
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_checkpoint(bytes: &[u8], path: &Path) -> Result<Checkpoint, CheckpointError> {
    let mut cursor = 0usize;
    let magic = read_exact(bytes, &mut cursor, 4, path)?;
    if magic != MAGIC {
        return Err(invalid_format(path, "invalid magic"));
    }
    let version = read_u16(bytes, &mut cursor, path)?;
    if version != CHECKPOINT_FORMAT_VERSION {
        return Err(invalid_format(
            path,
            &format!("unsupported format version {version}"),
        ));
    }
    let entry_count = read_u32(bytes, &mut cursor, path)? as usize;
    let payload_len = usize::try_from(read_u64(bytes, &mut cursor, path)?)
        .map_err(|_| invalid_format(path, "payload length exceeds address space"))?;
    let expected_hash = read_exact(bytes, &mut cursor, 32, path)?;
    let payload = read_exact(bytes, &mut cursor, payload_len, path)?;
    if cursor != bytes.len() {
        return Err(invalid_format(path, "unexpected trailing bytes"));
    }
    if expected_hash != sha256_bytes(payload) {
        return Err(invalid_format(path, "payload hash mismatch"));
    }

    let mut cursor = 0usize;
    let mut entries = BTreeMap::new();
    for _ in 0..entry_count {
        let name = read_string(payload, &mut cursor, path)?;
        let kind = read_u8(payload, &mut cursor, path)?;
        let entry = match kind {
            KIND_TENSOR => CheckpointEntry::Tensor(read_tensor(payload, &mut cursor, path)?),
            KIND_GROUP => {
                let member_count = read_u32(payload, &mut cursor, path)?;
                let mut params = ParamSet::new();
                for _ in 0..member_count {
                    let member = read_string(payload, &mut cursor, path)?;
                    let tensor = read_tensor(payload, &mut cursor, path)?;
                    if params.insert(member.clone(), tensor).is_some() {
                        return Err(invalid_format(
                            path,
                            &format!("duplicate parameter '{member}' in group '{name}'"),
                        ));
                    }
                }
                CheckpointEntry::Group(params)
            }
            other => {
                return Err(invalid_format(
                    path,
                    &format!("invalid entry kind {other} for '{name}'"),
                ))
            }
        };
        if entries.insert(name.clone(), entry).is_some() {
            return Err(invalid_format(path, &format!("duplicate entry '{name}'")));
        }
    }
    if cursor != payload.len() {
        return Err(invalid_format(path, "payload length mismatch"));
    }

    Ok(Checkpoint { entries })
}

fn write_tensor(target: &mut Vec<u8>, tensor: &Tensor, path: &Path) -> Result<(), CheckpointError> {
    let shape = tensor.shape();
    if shape.len() > MAX_TENSOR_RANK {
        return Err(invalid_format(path, "tensor rank too large"));
    }
    target.push(shape.len() as u8);
    for &dim in shape {
        let dim = u32::try_from(dim).map_err(|_| invalid_format(path, "dimension exceeds u32"))?;
        target.extend_from_slice(&dim.to_le_bytes());
    }
    for value in tensor.data() {
        target.extend_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

fn read_tensor(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<Tensor, CheckpointError> {
    let rank = read_u8(bytes, cursor, path)? as usize;
    if rank > MAX_TENSOR_RANK {
        return Err(invalid_format(path, "tensor rank too large"));
    }
    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(read_u32(bytes, cursor, path)? as usize);
    }
    let byte_len = shape
        .iter()
        .try_fold(4usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| invalid_format(path, "tensor size overflow"))?;
    let raw = read_exact(bytes, cursor, byte_len, path)?;
    let data = raw
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<_>>();
    Tensor::new(shape, data).map_err(|error| invalid_format(path, &error.to_string()))
}

fn write_string(target: &mut Vec<u8>, value: &str, path: &Path) -> Result<(), CheckpointError> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(invalid_format(path, "name too long for u16 length"));
    }
    target.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    target.extend_from_slice(bytes);
    Ok(())
}

fn read_string(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<String, CheckpointError> {
    let len = read_u16(bytes, cursor, path)? as usize;
    let raw = read_exact(bytes, cursor, len, path)?;
    std::str::from_utf8(raw)
        .map(ToString::to_string)
        .map_err(|_| invalid_format(path, "invalid UTF-8 parameter name"))
}

fn read_u8(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u8, CheckpointError> {
    read_exact(bytes, cursor, 1, path)?
        .first()
        .copied()
        .ok_or_else(|| invalid_format(path, "unexpected end of file"))
}

fn read_u16(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u16, CheckpointError> {
    Ok(u16::from_le_bytes(
        read_exact(bytes, cursor, 2, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u16 encoding"))?,
    ))
}

fn read_u32(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u32, CheckpointError> {
    Ok(u32::from_le_bytes(
        read_exact(bytes, cursor, 4, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u32 encoding"))?,
    ))
}

fn read_u64(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u64, CheckpointError> {
    Ok(u64::from_le_bytes(
        read_exact(bytes, cursor, 8, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u64 encoding"))?,
    ))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], CheckpointError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn invalid_format(path: &Path, message: &str) -> CheckpointError {
    CheckpointError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
