//! Binary checkpoint archive.
//!
//! Connectors describe their persistent state once, through
//! [`RigidConnector::serialize`](crate::RigidConnector::serialize), visiting
//! every field with an [`Archive`]. The writer stores the fields, the reader
//! overwrites them, so save and restore always use the same field order.
//!
//! Scalars are stored as little-endian `f64`.

use std::io::{ErrorKind, Read, Write};

use nalgebra::Vector3;
use sim_types::SimError;

use crate::kinematics::Triad;

/// Bidirectional field archive.
pub trait Archive {
    /// `true` when writing, `false` when restoring.
    fn is_saving(&self) -> bool;

    /// Save or restore one scalar.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Checkpoint`] on I/O failure or a truncated stream.
    fn scalar(&mut self, value: &mut f64) -> sim_types::Result<()>;

    /// Save or restore a 3-vector.
    ///
    /// # Errors
    ///
    /// See [`scalar`](Self::scalar).
    fn vec3(&mut self, v: &mut Vector3<f64>) -> sim_types::Result<()> {
        for x in v.iter_mut() {
            self.scalar(x)?;
        }
        Ok(())
    }

    /// Save or restore three vectors.
    ///
    /// # Errors
    ///
    /// See [`scalar`](Self::scalar).
    fn triad(&mut self, e: &mut Triad) -> sim_types::Result<()> {
        for v in e.iter_mut() {
            self.vec3(v)?;
        }
        Ok(())
    }
}

/// Archive that writes fields to a byte sink.
#[derive(Debug)]
pub struct CheckpointWriter<W: Write> {
    inner: W,
}

impl<W: Write> CheckpointWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Archive for CheckpointWriter<W> {
    fn is_saving(&self) -> bool {
        true
    }

    fn scalar(&mut self, value: &mut f64) -> sim_types::Result<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

/// Archive that restores fields from a byte source.
#[derive(Debug)]
pub struct CheckpointReader<R: Read> {
    inner: R,
}

impl<R: Read> CheckpointReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Archive for CheckpointReader<R> {
    fn is_saving(&self) -> bool {
        false
    }

    fn scalar(&mut self, value: &mut f64) -> sim_types::Result<()> {
        let mut bytes = [0u8; 8];
        self.inner.read_exact(&mut bytes).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => SimError::checkpoint("unexpected end of checkpoint stream"),
            _ => SimError::from(e),
        })?;
        *value = f64::from_le_bytes(bytes);
        Ok(())
    }
}
