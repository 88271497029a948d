//! Minimal hand-rolled binary reader/writer used by [`super`]'s encode/decode
//! methods. The wire format has no schema language of its own, so every
//! type writes its own bytes in a fixed order and reads them back in the
//! same order.

use bytes::{BufMut, BytesMut};

use crate::Error;

pub struct Writer(pub BytesMut);

impl Writer {
    pub fn new() -> Self {
        Self(BytesMut::with_capacity(64))
    }

    pub fn u8(&mut self, value: u8) {
        self.0.put_u8(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.0.put_u8(value as u8);
    }

    pub fn u16(&mut self, value: u16) {
        self.0.put_u16_le(value);
    }

    pub fn u32(&mut self, value: u32) {
        self.0.put_u32_le(value);
    }

    pub fn u64(&mut self, value: u64) {
        self.0.put_u64_le(value);
    }

    pub fn i32(&mut self, value: i32) {
        self.0.put_i32_le(value);
    }

    pub fn bytes(&mut self, value: &[u8]) {
        self.0.extend_from_slice(value);
    }

    pub fn blob(&mut self, value: &[u8]) {
        self.u32(value.len() as u32);
        self.bytes(value);
    }

    pub fn string(&mut self, value: &str) {
        self.blob(value.as_bytes());
    }

    pub fn option<T>(&mut self, value: &Option<T>, write: impl FnOnce(&mut Self, &T)) {
        match value {
            Some(inner) => {
                self.bool(true);
                write(self, inner);
            }
            None => self.bool(false),
        }
    }

    pub fn finish(self) -> BytesMut {
        self.0
    }
}

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }

        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, Error> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into()?))
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into()?))
    }

    pub fn u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into()?))
    }

    pub fn i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into()?))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        Ok(self.take(N)?.try_into()?)
    }

    pub fn blob(&mut self) -> Result<Vec<u8>, Error> {
        let len = self.u32()? as usize;
        if len > crate::frame::MAX_FRAME_SIZE {
            return Err(Error::TooLong);
        }

        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, Error> {
        Ok(String::from_utf8(self.blob()?)?)
    }

    pub fn option<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<Option<T>, Error> {
        if self.bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }
}
