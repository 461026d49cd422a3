use std::io::{self, Read};

use crate::{ContentHash, Hasher, Result, VerifyError};

/// Streaming reader that hashes data as it passes through.
pub struct VerifiedReader<R, H> {
    reader: R,
    hasher: H,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self { Self { reader, hasher } }
}

impl<R: Read, H: Hasher> VerifiedReader<R, H> {
    /// Consume the rest of the inner reader, discarding the bytes.
    pub fn drain(&mut self) -> io::Result<u64> { io::copy(self, &mut io::sink()) }

    pub fn digest(self) -> ContentHash { self.hasher.finalize() }

    /// Finalize verification against the expected digest.
    pub fn finish(self, expected: &ContentHash) -> Result<()> {
        let actual = self.hasher.finalize();
        if actual == *expected {
            Ok(())
        } else {
            Err(VerifyError::HashMismatch {
                expected: expected.to_hex(),
                actual:   actual.to_hex(),
            })
        }
    }
}

impl<R: Read, H: Hasher> Read for VerifiedReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
