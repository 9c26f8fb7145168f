//! Checksummed binary container shared by all partition artifacts
//!
//! Layout (little-endian):
//!   magic: u32, version: u16, reserved: u16
//!   fixed header fields
//!   arrays: count: u64, then `count` fixed-width values
//!   footer: body_crc: u64, file_crc: u64 (CRC-64/GO-ISO over everything before)

use anyhow::{ensure, Result};
use crc::{Crc, CRC_64_GO_ISO};
use std::io::{Read, Write};

pub static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Values written per buffered chunk
const CHUNK: usize = 64 * 1024;

/// Fixed-width little-endian value
pub trait LeValue: Copy {
    const SIZE: usize;
    fn put(self, out: &mut Vec<u8>);
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! impl_le_value {
    ($($t:ty),*) => {
        $(
            impl LeValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn put(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_le_value!(u16, u32, u64, i32);

pub struct ContainerWriter<W: Write> {
    inner: W,
    digest: crc::Digest<'static, u64>,
    buf: Vec<u8>,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            buf: Vec::new(),
        }
    }

    /// Magic, version and the reserved field
    pub fn header(&mut self, magic: u32, version: u16) -> Result<()> {
        self.value(magic)?;
        self.value(version)?;
        self.value(0u16)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.digest.update(bytes);
        Ok(())
    }

    pub fn value<T: LeValue>(&mut self, value: T) -> Result<()> {
        self.buf.clear();
        value.put(&mut self.buf);
        self.inner.write_all(&self.buf)?;
        self.digest.update(&self.buf);
        Ok(())
    }

    /// Length-prefixed array
    pub fn array<T: LeValue>(&mut self, values: &[T]) -> Result<()> {
        self.value(values.len() as u64)?;
        for chunk in values.chunks(CHUNK) {
            self.buf.clear();
            for &value in chunk {
                value.put(&mut self.buf);
            }
            self.inner.write_all(&self.buf)?;
            self.digest.update(&self.buf);
        }
        Ok(())
    }

    /// Write the CRC footer and flush
    pub fn finish(mut self) -> Result<W> {
        let body_crc = self.digest.finalize();
        let file_crc = body_crc;
        self.inner.write_all(&body_crc.to_le_bytes())?;
        self.inner.write_all(&file_crc.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

pub struct ContainerReader<R: Read> {
    inner: R,
    digest: crc::Digest<'static, u64>,
    buf: Vec<u8>,
    name: &'static str,
}

impl<R: Read> ContainerReader<R> {
    /// `name` labels errors, e.g. "partition.mlp"
    pub fn new(inner: R, name: &'static str) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            buf: Vec::new(),
            name,
        }
    }

    /// Check magic and version, skip the reserved field
    pub fn header(&mut self, magic: u32, version: u16) -> Result<()> {
        let found: u32 = self.value()?;
        ensure!(
            found == magic,
            "Invalid magic in {}: expected 0x{:08X}, got 0x{:08X}",
            self.name,
            magic,
            found
        );
        let found_version: u16 = self.value()?;
        ensure!(
            found_version == version,
            "Unsupported {} version {} (expected {})",
            self.name,
            found_version,
            version
        );
        let _reserved: u16 = self.value()?;
        Ok(())
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.inner.read_exact(&mut out)?;
        self.digest.update(&out);
        Ok(out)
    }

    pub fn value<T: LeValue>(&mut self) -> Result<T> {
        self.buf.resize(T::SIZE, 0);
        self.inner.read_exact(&mut self.buf)?;
        self.digest.update(&self.buf);
        Ok(T::get(&self.buf))
    }

    /// Length-prefixed array. Allocation grows with the data actually read,
    /// so a corrupt count fails on EOF instead of a huge allocation.
    pub fn array<T: LeValue>(&mut self) -> Result<Vec<T>> {
        let count: u64 = self.value()?;
        let count = usize::try_from(count)?;
        let mut values = Vec::with_capacity(count.min(CHUNK));
        let mut remaining = count;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            self.buf.resize(take * T::SIZE, 0);
            self.inner.read_exact(&mut self.buf)?;
            self.digest.update(&self.buf);
            values.extend(self.buf.chunks_exact(T::SIZE).map(T::get));
            remaining -= take;
        }
        Ok(values)
    }

    /// Verify the CRC footer
    pub fn finish(mut self) -> Result<()> {
        let computed = self.digest.finalize();
        let mut footer = [0u8; 16];
        self.inner.read_exact(&mut footer)?;
        let mut stored = [0u8; 8];
        stored.copy_from_slice(&footer[..8]);
        let stored = u64::from_le_bytes(stored);
        ensure!(
            computed == stored,
            "CRC64 mismatch in {}: computed 0x{:016X}, stored 0x{:016X}",
            self.name,
            computed,
            stored
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 0x54455354; // "TEST"

    fn sample() -> Vec<u8> {
        let mut writer = ContainerWriter::new(Vec::new());
        writer.header(MAGIC, 1).unwrap();
        writer.value(42u32).unwrap();
        writer.bytes(&[7u8; 4]).unwrap();
        writer.array(&[1u64, 2, 3]).unwrap();
        writer.array(&[-5i32, 5]).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_layout_and_read_back() {
        let data = sample();
        // header 8 + u32 4 + bytes 4 + (8 + 24) + (8 + 8) + footer 16
        assert_eq!(data.len(), 80);

        let mut reader = ContainerReader::new(data.as_slice(), "test");
        reader.header(MAGIC, 1).unwrap();
        assert_eq!(reader.value::<u32>().unwrap(), 42);
        assert_eq!(reader.bytes::<4>().unwrap(), [7u8; 4]);
        assert_eq!(reader.array::<u64>().unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.array::<i32>().unwrap(), vec![-5, 5]);
        reader.finish().unwrap();
    }

    #[test]
    fn test_footer_matches_crc_of_body() {
        let data = sample();
        let body = &data[..data.len() - 16];
        let stored = u64::from_le_bytes(data[data.len() - 16..data.len() - 8].try_into().unwrap());
        assert_eq!(stored, CRC64.checksum(body));
    }

    #[test]
    fn test_detects_corruption() {
        let mut data = sample();
        data[12] ^= 0xFF;
        let mut reader = ContainerReader::new(data.as_slice(), "test");
        reader.header(MAGIC, 1).unwrap();
        reader.value::<u32>().unwrap();
        reader.bytes::<4>().unwrap();
        reader.array::<u64>().unwrap();
        reader.array::<i32>().unwrap();
        let err = reader.finish().unwrap_err();
        assert!(err.to_string().contains("CRC64 mismatch"));
    }

    #[test]
    fn test_rejects_wrong_magic_and_version() {
        let data = sample();
        let mut reader = ContainerReader::new(data.as_slice(), "test");
        assert!(reader.header(0x12345678, 1).is_err());

        let mut reader = ContainerReader::new(data.as_slice(), "test");
        let err = reader.header(MAGIC, 2).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_truncated_array_fails() {
        let mut writer = ContainerWriter::new(Vec::new());
        writer.array(&[1u32, 2, 3, 4]).unwrap();
        let data = writer.finish().unwrap();

        let mut reader = ContainerReader::new(&data[..12], "test");
        assert!(reader.array::<u32>().is_err());
    }
}
