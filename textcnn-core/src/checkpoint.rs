//! Binary container for named weight tensors.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic "TCNN" | version u32 | count u32
//! per tensor: name_len u32 | name utf-8 | ndim u32 | dims u32 * ndim | data f32 * prod(dims)
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::cast_slice;
use memmap2::MmapOptions;
use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"TCNN";
const VERSION: u32 = 1;

/// Ordered collection of named tensors.
#[derive(Clone, Debug, Default)]
pub struct Checkpoint {
    tensors: Vec<(String, ArrayD<f32>)>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tensor, replacing any previous tensor with the same name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        let name = name.into();
        match self.tensors.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = tensor,
            None => self.tensors.push((name, tensor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Like [`Checkpoint::get`] but a missing tensor is an error.
    pub fn require(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.get(name).ok_or_else(|| Error::MissingWeight {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Writes every tensor to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut f = BufWriter::new(File::create(path).map_err(io_err)?);
        f.write_all(MAGIC).map_err(io_err)?;
        f.write_all(&VERSION.to_le_bytes()).map_err(io_err)?;
        f.write_all(&(self.tensors.len() as u32).to_le_bytes())
            .map_err(io_err)?;
        for (name, tensor) in &self.tensors {
            f.write_all(&(name.len() as u32).to_le_bytes()).map_err(io_err)?;
            f.write_all(name.as_bytes()).map_err(io_err)?;
            f.write_all(&(tensor.ndim() as u32).to_le_bytes())
                .map_err(io_err)?;
            for &dim in tensor.shape() {
                f.write_all(&(dim as u32).to_le_bytes()).map_err(io_err)?;
            }
            let data: Vec<f32> = tensor.iter().copied().collect();
            f.write_all(cast_slice(&data)).map_err(io_err)?;
        }
        f.flush().map_err(io_err)
    }

    /// Memory-maps `path` and decodes every tensor.
    ///
    /// # Errors
    ///
    /// [`Error::ArtifactMissing`] if the file is absent and
    /// [`Error::ArtifactMalformed`] for a bad header or truncated data.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
        if len < (MAGIC.len() + 8) as u64 {
            return Err(Error::malformed(path, "file too short for header"));
        }
        // Safety: the run directory is treated as read-only for the lifetime
        // of the map, which ends before this function returns.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::io(path, e))?;
        Self::decode(&mmap[..]).map_err(|reason| Error::malformed(path, reason))
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut cursor = Cursor { bytes, offset: 0 };
        if cursor.take(MAGIC.len())? != MAGIC {
            return Err("bad magic".into());
        }
        let version = cursor.u32()?;
        if version != VERSION {
            return Err(format!("unsupported version {version}"));
        }
        let count = cursor.u32()? as usize;
        let mut checkpoint = Self::new();
        for _ in 0..count {
            let name_len = cursor.u32()? as usize;
            let name = std::str::from_utf8(cursor.take(name_len)?)
                .map_err(|e| format!("tensor name is not utf-8: {e}"))?
                .to_string();
            let ndim = cursor.u32()? as usize;
            let shape = (0..ndim)
                .map(|_| cursor.u32().map(|d| d as usize))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let byte_len = shape
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .and_then(|n| n.checked_mul(4))
                .ok_or_else(|| format!("tensor {name} is too large"))?;
            let data: Vec<f32> = bytemuck::pod_collect_to_vec(cursor.take(byte_len)?);
            let tensor = ArrayD::from_shape_vec(IxDyn(&shape), data)
                .map_err(|e| format!("tensor {name}: {e}"))?;
            checkpoint.insert(name, tensor);
        }
        if cursor.offset != bytes.len() {
            return Err(format!(
                "{} trailing bytes after last tensor",
                bytes.len() - cursor.offset
            ));
        }
        Ok(checkpoint)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| format!("truncated at byte {}", self.offset))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use tempfile::NamedTempFile;

    #[test]
    fn save_and_load_preserves_order_and_values() {
        let mut ckpt = Checkpoint::new();
        ckpt.insert("b", arr2(&[[1.0_f32, 2.0], [3.0, 4.0]]).into_dyn());
        ckpt.insert("a", ArrayD::from_elem(IxDyn(&[3]), 0.5));
        let file = NamedTempFile::new().unwrap();
        ckpt.save(file.path()).unwrap();

        let loaded = Checkpoint::load(file.path()).unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(loaded.get("b").unwrap()[&[1, 0][..]], 3.0);
        assert_eq!(loaded.get("a").unwrap().shape(), &[3]);
    }

    #[test]
    fn truncated_file_is_malformed() {
        let mut ckpt = Checkpoint::new();
        ckpt.insert("w", ArrayD::from_elem(IxDyn(&[4, 4]), 1.0));
        let file = NamedTempFile::new().unwrap();
        ckpt.save(file.path()).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        std::fs::write(file.path(), &bytes[..bytes.len() - 3]).unwrap();

        let err = Checkpoint::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::ArtifactMalformed { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::load(&dir.path().join("cp.ckpt")).unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
    }

    #[test]
    fn require_reports_missing_tensor() {
        let ckpt = Checkpoint::new();
        assert!(matches!(
            ckpt.require("embedding/embeddings"),
            Err(Error::MissingWeight { .. })
        ));
    }
}
