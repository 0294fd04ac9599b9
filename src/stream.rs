//! Little-endian byte primitives over seekable streams
//!
//! Reads never fail loudly: a read past the end of the data returns zero and
//! latches the stream's `ok` flag to `false`. Callers inspect [`ByteReader::ok`]
//! once, after a whole decode, to detect truncated files. Writers behave the
//! same way: any I/O failure latches `ok` and later writes become no-ops.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::model::Uuid;

/// Reader half of the byte primitives.
pub struct ByteReader<R> {
    inner: R,
    ok: bool,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, ok: true }
    }

    /// `false` once any read ran past the end of the data or failed.
    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn latch<T: Default>(&mut self, result: io::Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(_) => {
                self.ok = false;
                T::default()
            }
        }
    }

    pub fn tell(&mut self) -> u64 {
        let pos = self.inner.stream_position();
        self.latch(pos)
    }

    pub fn seek(&mut self, pos: u64) {
        let result = self.inner.seek(SeekFrom::Start(pos)).map(|_| ());
        self.latch(result)
    }

    pub fn read_u8(&mut self) -> u8 {
        let v = self.inner.read_u8();
        self.latch(v)
    }

    pub fn read_u16(&mut self) -> u16 {
        let v = self.inner.read_u16::<LittleEndian>();
        self.latch(v)
    }

    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    pub fn read_u32(&mut self) -> u32 {
        let v = self.inner.read_u32::<LittleEndian>();
        self.latch(v)
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_u64(&mut self) -> u64 {
        let v = self.inner.read_u64::<LittleEndian>();
        self.latch(v)
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Skip `n` reserved bytes.
    pub fn read_padding(&mut self, n: usize) {
        for _ in 0..n {
            self.read_u8();
        }
    }

    /// A 16-bit length prefix followed by that many raw bytes.
    ///
    /// Bytes that are not valid UTF-8 are replaced, old files were written
    /// in the platform's 8-bit encoding.
    pub fn read_string(&mut self) -> String {
        let len = self.read_u16() as usize;
        if !self.ok {
            return String::new();
        }
        let mut buf = vec![0u8; len];
        let n = self.read_bytes(&mut buf);
        buf.truncate(n);
        match String::from_utf8(buf) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    pub fn read_uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        if self.read_bytes(&mut bytes) < 16 {
            bytes = [0u8; 16];
        }
        Uuid(bytes)
    }

    /// Read up to `buf.len()` bytes, returning how many were actually read.
    ///
    /// A short read latches the `ok` flag.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let mut total = 0;
        while total < buf.len() {
            match self.inner.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if total < buf.len() {
            self.ok = false;
        }
        total
    }
}

/// Writer half of the byte primitives.
pub struct ByteWriter<W> {
    inner: W,
    ok: bool,
}

impl<W: Write + Seek> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, ok: true }
    }

    /// `false` once any write or seek failed.
    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    fn check(&mut self, result: io::Result<()>) {
        if result.is_err() {
            self.ok = false;
        }
    }

    pub fn tell(&mut self) -> u64 {
        match self.inner.stream_position() {
            Ok(pos) => pos,
            Err(_) => {
                self.ok = false;
                0
            }
        }
    }

    pub fn seek(&mut self, pos: u64) {
        if !self.ok {
            return;
        }
        let result = self.inner.seek(SeekFrom::Start(pos)).map(|_| ());
        self.check(result)
    }

    pub fn write_u8(&mut self, v: u8) {
        if self.ok {
            let r = self.inner.write_u8(v);
            self.check(r);
        }
    }

    pub fn write_u16(&mut self, v: u16) {
        if self.ok {
            let r = self.inner.write_u16::<LittleEndian>(v);
            self.check(r);
        }
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16)
    }

    pub fn write_u32(&mut self, v: u32) {
        if self.ok {
            let r = self.inner.write_u32::<LittleEndian>(v);
            self.check(r);
        }
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32)
    }

    pub fn write_u64(&mut self, v: u64) {
        if self.ok {
            let r = self.inner.write_u64::<LittleEndian>(v);
            self.check(r);
        }
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits())
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits())
    }

    pub fn write_padding(&mut self, n: usize) {
        for _ in 0..n {
            self.write_u8(0);
        }
    }

    /// Strings longer than `u16::MAX` bytes are truncated to fit the prefix.
    pub fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16(len as u16);
        self.write_bytes(&bytes[..len]);
    }

    pub fn write_uuid(&mut self, uuid: &Uuid) {
        self.write_bytes(&uuid.0)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.ok {
            let r = self.inner.write_all(bytes);
            self.check(r);
        }
    }

    pub fn flush(&mut self) {
        if self.ok {
            let r = self.inner.flush();
            self.check(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_little_endian_reads() {
        let data = vec![0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut r = ByteReader::new(Cursor::new(data));
        assert_eq!(r.read_u16(), 0x1234);
        assert_eq!(r.read_u32(), 0x12345678);
        assert_eq!(r.read_u8(), 0xFF);
        assert!(r.ok());
    }

    #[test]
    fn test_read_past_end_latches_and_returns_zero() {
        let mut r = ByteReader::new(Cursor::new(vec![0x01]));
        assert_eq!(r.read_u32(), 0);
        assert!(!r.ok());
        // Stays latched even if later reads would succeed
        r.seek(0);
        assert_eq!(r.read_u8(), 1);
        assert!(!r.ok());
    }

    #[test]
    fn test_string_has_no_terminator() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        w.write_string("hero");
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes, vec![4, 0, b'h', b'e', b'r', b'o']);

        let mut r = ByteReader::new(Cursor::new(bytes));
        assert_eq!(r.read_string(), "hero");
        assert!(r.ok());
    }

    #[test]
    fn test_truncated_string_latches() {
        let mut r = ByteReader::new(Cursor::new(vec![10, 0, b'a', b'b']));
        assert_eq!(r.read_string(), "ab");
        assert!(!r.ok());
    }

    #[test]
    fn test_signed_and_float_values() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        w.write_i16(-2);
        w.write_i32(-70000);
        w.write_f32(1.5);
        w.write_f64(-0.25);
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        assert_eq!(r.read_i16(), -2);
        assert_eq!(r.read_i32(), -70000);
        assert_eq!(r.read_f32(), 1.5);
        assert_eq!(r.read_f64(), -0.25);
    }

    #[test]
    fn test_seek_back_and_patch() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        w.write_u32(0);
        w.write_u16(7);
        let end = w.tell();
        w.seek(0);
        w.write_u32(end as u32);
        w.seek(end);
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes, vec![6, 0, 0, 0, 7, 0]);
    }
}
