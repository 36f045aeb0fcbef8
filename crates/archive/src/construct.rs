use crate::error::{ErrorKind, Result};
use crate::{ArchiveFormat, Compression};

impl ArchiveFormat {
    /// Detect the archive format from the suffix of a source name.
    ///
    /// The source name can be anything that ends in the published file name:
    /// a local path, an object key, a URL or a release asset name. Matching is
    /// case-insensitive.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolpin_archive::{ArchiveFormat, Compression};
    ///
    /// let format = ArchiveFormat::from_source_name("https://example.com/tool_1.0_linux.tar.gz").unwrap();
    /// assert_eq!(format, ArchiveFormat::Tar(Compression::Gzip));
    /// assert!(ArchiveFormat::from_source_name("tool.7z").is_err());
    /// ```
    pub fn from_source_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Ok(Self::Zip)
        } else if lower.ends_with(".tar") {
            Ok(Self::Tar(Compression::None))
        } else if lower.ends_with(".tar.gz") {
            Ok(Self::Tar(Compression::Gzip))
        } else if lower.ends_with(".tar.xz") {
            Ok(Self::Tar(Compression::Xz))
        } else {
            exn::bail!(ErrorKind::UnsupportedFormat(name.to_string()))
        }
    }
}
