//! Pull a single member out of a downloaded distribution archive.
//!
//! Tool vendors ship binaries in all sorts of containers. This crate handles
//! the ones we care about, selected from the suffix of wherever the bytes
//! came from (file path, object key, URL or release asset name):
//!
//! - `.zip` is opened with random access and the member looked up by name.
//! - `.tar`, `.tar.gz` and `.tar.xz` are scanned in a single forward pass
//!   over the (decompressing) stream; tar has no index, so there is nothing
//!   to seek to.
//!
//! Everything operates on in-memory bytes and performs no other I/O, so the
//! same input always produces the same output (or the same error).

mod construct;
pub mod error;
mod extract;
mod ops;

pub use crate::extract::extract_member;

/// A stream compression layer wrapped around a tar archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
}

/// Container format of a fetched object, as detected from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Random-access zip archive.
    Zip,
    /// Sequential tar archive, possibly behind a compression layer.
    Tar(Compression),
}
