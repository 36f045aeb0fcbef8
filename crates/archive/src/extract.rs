use crate::error::{ErrorKind, Result};
use crate::{ArchiveFormat, Compression};
use exn::ResultExt;
use std::io::{Cursor, Read};
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipError;

/// Extract the entry at `member` from the archive in `raw`.
///
/// The container format is chosen from the suffix of `source_name` (see
/// [`ArchiveFormat::from_source_name`]). An archive with no entry at
/// `member` (including a valid archive with no entries at all) is
/// [`ErrorKind::MemberNotFound`]; an archive that cannot be parsed is
/// [`ErrorKind::MalformedArchive`].
///
/// # Examples
///
/// ```
/// use toolpin_archive::{error::ErrorKind, extract_member};
///
/// let err = extract_member(b"", "tool.rar", "bin/tool").unwrap_err();
/// assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
/// ```
#[instrument(skip(raw), fields(raw_size = raw.len(), format))]
pub fn extract_member(raw: &[u8], source_name: &str, member: &str) -> Result<Vec<u8>> {
    let format = ArchiveFormat::from_source_name(source_name)?;
    tracing::Span::current().record("format", tracing::field::debug(format));
    let content = match format {
        ArchiveFormat::Zip => from_zip(raw, source_name, member)?,
        ArchiveFormat::Tar(compression) => from_tar(raw, compression, source_name, member)?,
    };
    tracing::debug!(member, size = content.len(), "Extracted archive member");
    Ok(content)
}

fn from_zip(raw: &[u8], source_name: &str, member: &str) -> Result<Vec<u8>> {
    let malformed = || ErrorKind::MalformedArchive(source_name.to_string());
    let mut archive = ZipArchive::new(Cursor::new(raw)).or_raise(malformed)?;
    let mut file = match archive.by_name(member) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => exn::bail!(ErrorKind::MemberNotFound(member.to_string())),
        Err(err) => return Err(err).or_raise(malformed),
    };
    let mut content = Vec::new();
    file.read_to_end(&mut content).or_raise(malformed)?;
    Ok(content)
}

/// Single forward pass over the entries; the first exact name match wins.
fn from_tar(raw: &[u8], compression: Compression, source_name: &str, member: &str) -> Result<Vec<u8>> {
    let malformed = || ErrorKind::MalformedArchive(source_name.to_string());
    let mut archive = tar::Archive::new(compression.wrap_reader(raw));
    for entry in archive.entries().or_raise(malformed)? {
        let mut entry = entry.or_raise(malformed)?;
        let matches = entry.path_bytes().as_ref() == member.as_bytes();
        if !matches {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content).or_raise(malformed)?;
        return Ok(content);
    }
    exn::bail!(ErrorKind::MemberNotFound(member.to_string()))
}
