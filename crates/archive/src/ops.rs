//! Decompression Operations

use crate::Compression;
use flate2::read::GzDecoder;
use std::io::Read;
use xz2::read::XzDecoder;

impl Compression {
    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// Returns a boxed reader that decompresses on the fly; nothing is read
    /// from the inner reader until the returned reader is consumed, so
    /// corrupt input surfaces as an I/O error on the first read.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Read;
    /// use toolpin_archive::Compression;
    ///
    /// let mut reader = Compression::None.wrap_reader(&b"plain"[..]);
    /// let mut out = Vec::new();
    /// reader.read_to_end(&mut out).unwrap();
    /// assert_eq!(out, b"plain");
    /// ```
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
        }
    }
}
