//! Transport archive: file bytes plus delete markers.

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{prefix_for, put_frame, FrameReader};
use crate::model::normalize_file_name;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::{BTreeMap, BTreeSet};

/// Files and delete markers moved between client and server.
///
/// Entries and markers are kept sorted by name so encoding is reproducible.
/// A name is either an entry or a marker, never both.
///
/// # Example
///
/// ```
/// use depot_protocol::Archive;
///
/// let mut archive = Archive::new();
/// archive.insert("a.txt", "hello").unwrap();
/// archive.mark_deleted("old.txt").unwrap();
///
/// let decoded = Archive::decode(archive.encode().unwrap()).unwrap();
/// assert_eq!(decoded.extract("a.txt").unwrap().as_ref(), b"hello");
/// assert!(decoded.is_deleted("old.txt"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Bytes>,
    deleted: BTreeSet<String>,
}

impl Archive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds file content under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unsafe or already present.
    pub fn insert(&mut self, name: &str, data: impl Into<Bytes>) -> ProtocolResult<()> {
        let name = normalize_file_name(name)?;
        if self.entries.contains_key(&name) || self.deleted.contains(&name) {
            return Err(ProtocolError::DuplicateFile(name));
        }
        self.entries.insert(name, data.into());
        Ok(())
    }

    /// Adds a delete marker for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unsafe or already present.
    pub fn mark_deleted(&mut self, name: &str) -> ProtocolResult<()> {
        let name = normalize_file_name(name)?;
        if self.entries.contains_key(&name) || self.deleted.contains(&name) {
            return Err(ProtocolError::DuplicateFile(name));
        }
        self.deleted.insert(name);
        Ok(())
    }

    /// Returns the bytes stored for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EntryNotFound`] if there is no such entry.
    pub fn extract(&self, name: &str) -> ProtocolResult<&Bytes> {
        self.entries
            .get(name)
            .ok_or_else(|| ProtocolError::EntryNotFound(name.to_string()))
    }

    /// Returns true if `name` carries a delete marker.
    pub fn is_deleted(&self, name: &str) -> bool {
        self.deleted.contains(name)
    }

    /// Iterates file entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data))
    }

    /// Iterates delete markers in name order.
    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    /// Returns the number of file entries plus delete markers.
    pub fn len(&self) -> usize {
        self.entries.len() + self.deleted.len()
    }

    /// Returns true if the archive carries nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.deleted.is_empty()
    }

    /// Returns the total size of all file entries.
    pub fn payload_size(&self) -> usize {
        self.entries.values().map(Bytes::len).sum()
    }

    /// Encodes the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if a count or entry exceeds `i32::MAX`.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::with_capacity(8 + self.payload_size() + self.len() * 16);
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Appends the encoded archive to `buf`.
    ///
    /// # Errors
    ///
    /// See [`Archive::encode`].
    pub fn encode_into(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        buf.put_i32_le(prefix_for(self.entries.len())?);
        for (name, data) in &self.entries {
            put_frame(buf, name.as_bytes())?;
            put_frame(buf, data)?;
        }

        buf.put_i32_le(prefix_for(self.deleted.len())?);
        for name in &self.deleted {
            put_frame(buf, name.as_bytes())?;
        }
        Ok(())
    }

    /// Decodes an archive that spans the whole input.
    ///
    /// # Errors
    ///
    /// Returns an error for short input, unsafe or repeated names, or
    /// trailing bytes.
    pub fn decode(bytes: impl Into<Bytes>) -> ProtocolResult<Self> {
        let mut reader = FrameReader::new(bytes);
        let archive = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(archive)
    }

    /// Decodes an archive from the current position of `reader`.
    ///
    /// # Errors
    ///
    /// See [`Archive::decode`].
    pub fn decode_from(reader: &mut FrameReader) -> ProtocolResult<Self> {
        let mut archive = Archive::new();

        let entry_count = read_count(reader)?;
        for _ in 0..entry_count {
            let name = reader.read_string("archive entry name")?;
            let data = reader.read_frame()?;
            archive.insert(&name, data)?;
        }

        let delete_count = read_count(reader)?;
        for _ in 0..delete_count {
            let name = reader.read_string("delete marker")?;
            archive.mark_deleted(&name)?;
        }

        Ok(archive)
    }
}

fn read_count(reader: &mut FrameReader) -> ProtocolResult<usize> {
    let raw = reader.read_i32()?;
    usize::try_from(raw).map_err(|_| ProtocolError::InvalidLength(i64::from(raw)))
}
