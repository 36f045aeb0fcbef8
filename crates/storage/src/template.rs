//! Locator templates.
//!
//! Backends describe where a binary lives with a template such as
//! `releases/{version}/{tool}_{platform}_{arch}{exe}`. Substitution is a
//! single left-to-right pass over the template: substituted values are never
//! rescanned, and anything that is not one of the five tokens is copied
//! verbatim.

use crate::error::{ErrorKind, Result};
use crate::models::{Arch, Binary, Platform};
use serde::Deserialize;
use tracing::instrument;

/// Per-backend overrides for platform and architecture names.
///
/// Vendors rarely agree on naming (`darwin` vs `macos`, `arm64` vs `aarch64`),
/// so each source can remap the canonical names. An override is used
/// verbatim, so an empty string drops the token entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateMappings {
    pub darwin: Option<String>,
    pub linux: Option<String>,
    pub windows: Option<String>,
    #[serde(rename = "x86_32", alias = "x86")]
    pub x86: Option<String>,
    pub x86_64: Option<String>,
    pub arm32: Option<String>,
    pub arm64: Option<String>,
}

impl TemplateMappings {
    /// Name substituted for `{platform}`.
    pub fn platform<'a>(&'a self, platform: &'a Platform) -> &'a str {
        let mapped = match platform {
            Platform::Darwin => self.darwin.as_ref(),
            Platform::Linux => self.linux.as_ref(),
            Platform::Windows => self.windows.as_ref(),
            Platform::Other(_) => None,
        };
        Self::pick(mapped, platform.as_str())
    }

    /// Name substituted for `{arch}`.
    pub fn arch<'a>(&'a self, arch: &'a Arch) -> &'a str {
        let mapped = match arch {
            Arch::X86 => self.x86.as_ref(),
            Arch::X86_64 => self.x86_64.as_ref(),
            Arch::Arm32 => self.arm32.as_ref(),
            Arch::Arm64 => self.arm64.as_ref(),
            Arch::Other(_) => None,
        };
        Self::pick(mapped, arch.as_str())
    }

    fn pick<'a>(mapped: Option<&'a String>, canonical: &'a str) -> &'a str {
        mapped.map(String::as_str).unwrap_or(canonical)
    }
}

/// Substitute `{tool}`, `{version}`, `{platform}`, `{arch}` and `{exe}`.
///
/// # Examples
///
/// ```
/// use toolpin_storage::{Arch, Binary, Platform, TemplateMappings, resolve_template};
///
/// let binary = Binary::new("tool", "v1.2.3", Platform::Darwin, Arch::Arm64);
/// let mappings = TemplateMappings { darwin: Some("macos".into()), ..Default::default() };
/// let resolved = resolve_template(&binary, "{tool}_{version}_{platform}_{arch}{exe}", &mappings);
/// assert_eq!(resolved, "tool_v1.2.3_macos_arm64");
/// ```
pub fn resolve(binary: &Binary, template: &str, mappings: &TemplateMappings) -> String {
    let tokens = [
        ("{tool}", binary.tool.as_str()),
        ("{version}", binary.version.as_str()),
        ("{platform}", mappings.platform(&binary.platform)),
        ("{arch}", mappings.arch(&binary.arch)),
        ("{exe}", binary.exe_suffix()),
    ];
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(idx) = rest.find('{') {
        resolved.push_str(&rest[..idx]);
        let candidate = &rest[idx..];
        match tokens.iter().find(|(token, _)| candidate.starts_with(token)) {
            Some((token, value)) => {
                resolved.push_str(value);
                rest = &candidate[token.len()..];
            },
            None => {
                resolved.push('{');
                rest = &candidate[1..];
            },
        }
    }
    resolved.push_str(rest);
    resolved
}

/// Settings shared by every backend shape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommonConfig {
    /// Path of the binary inside a fetched archive. Unset (or empty) means the
    /// fetched object already is the binary.
    pub archive_path_template: Option<String>,
    pub mappings: TemplateMappings,
}

impl CommonConfig {
    pub fn resolve(&self, binary: &Binary, template: &str) -> String {
        resolve(binary, template, &self.mappings)
    }

    /// Unpack the binary from whatever a backend fetched.
    ///
    /// `source_name` is only used for its suffix, which selects the archive
    /// format.
    #[instrument(skip(self, raw), fields(raw_size = raw.len(), binary = %binary))]
    pub fn extract(&self, raw: Vec<u8>, source_name: &str, binary: &Binary) -> Result<Vec<u8>> {
        let Some(template) = self.archive_path_template.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(raw);
        };
        let member = self.resolve(binary, template);
        toolpin_archive::extract_member(&raw, source_name, &member).map_err(ErrorKind::archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::{Cursor, Write};
    use toolpin_archive::error::ErrorKind as ArchiveErrorKind;
    use zip::write::{SimpleFileOptions, ZipWriter};

    const TEMPLATE: &str = "{tool}_{version}_{platform}_{arch}{exe}";

    fn binary(platform: Platform, arch: Arch) -> Binary {
        Binary::new("test-tool", "v1.2.3", platform, arch)
    }

    fn mappings() -> TemplateMappings {
        TemplateMappings {
            darwin: Some("macos".into()),
            arm64: Some("arm-64".into()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(Platform::Darwin, Arch::Arm64, "test-tool_v1.2.3_darwin_arm64")]
    #[case(Platform::Linux, Arch::X86_64, "test-tool_v1.2.3_linux_x86_64")]
    #[case(Platform::Windows, Arch::X86, "test-tool_v1.2.3_windows_x86.exe")]
    #[case(Platform::Other("freebsd".into()), Arch::Other("riscv64".into()), "test-tool_v1.2.3_freebsd_riscv64")]
    fn canonical_names(#[case] platform: Platform, #[case] arch: Arch, #[case] expected: &str) {
        assert_eq!(resolve(&binary(platform, arch), TEMPLATE, &TemplateMappings::default()), expected);
    }

    #[rstest]
    #[case(Platform::Darwin, Arch::Arm64, "test-tool_v1.2.3_macos_arm-64")]
    #[case(Platform::Darwin, Arch::X86_64, "test-tool_v1.2.3_macos_x86_64")]
    #[case(Platform::Linux, Arch::Arm64, "test-tool_v1.2.3_linux_arm-64")]
    #[case(Platform::Windows, Arch::Arm32, "test-tool_v1.2.3_windows_arm32.exe")]
    fn mapped_names(#[case] platform: Platform, #[case] arch: Arch, #[case] expected: &str) {
        assert_eq!(resolve(&binary(platform, arch), TEMPLATE, &mappings()), expected);
    }

    #[rstest]
    #[case(TemplateMappings { windows: Some(String::new()), ..Default::default() }, "test-tool--x86_64")]
    #[case(TemplateMappings { x86_64: Some(String::new()), ..Default::default() }, "test-tool-windows-")]
    fn empty_mapping_is_used_verbatim(#[case] mappings: TemplateMappings, #[case] expected: &str) {
        let binary = binary(Platform::Windows, Arch::X86_64);
        assert_eq!(resolve(&binary, "{tool}-{platform}-{arch}", &mappings), expected);
    }

    #[test]
    fn universal_asset_drops_arch() {
        let mappings = TemplateMappings { arm64: Some(String::new()), ..Default::default() };
        let binary = binary(Platform::Darwin, Arch::Arm64);
        assert_eq!(resolve(&binary, "{tool}_{platform}{arch}", &mappings), "test-tool_darwin");
    }

    #[rstest]
    #[case("no tokens at all")]
    #[case("")]
    #[case("{unknown}/{{}}/{")]
    fn templates_without_tokens_are_unchanged(#[case] template: &str) {
        assert_eq!(resolve(&binary(Platform::Linux, Arch::X86), template, &mappings()), template);
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let binary = Binary::new("odd{version}", "1.0", Platform::Linux, Arch::X86_64);
        let resolved = resolve(&binary, "{tool}-{version}", &TemplateMappings::default());
        assert_eq!(resolved, "odd{version}-1.0");
    }

    #[test]
    fn tokens_repeat() {
        let resolved = resolve(&binary(Platform::Linux, Arch::X86), "{tool}/{tool}{exe}", &mappings());
        assert_eq!(resolved, "test-tool/test-tool");
    }

    #[rstest]
    #[case(None)]
    #[case(Some(String::new()))]
    fn extract_without_template_is_identity(#[case] template: Option<String>) {
        let config = CommonConfig { archive_path_template: template, ..Default::default() };
        let raw = b"not an archive at all".to_vec();
        let out = config.extract(raw.clone(), "tool.weird", &binary(Platform::Linux, Arch::X86_64)).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn extract_resolves_member_path() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("macos/arm-64/test-tool", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"payload").unwrap();
        let raw = writer.finish().unwrap().into_inner();

        let config = CommonConfig {
            archive_path_template: Some("{platform}/{arch}/{tool}{exe}".into()),
            mappings: mappings(),
        };
        let out = config.extract(raw, "dist.zip", &binary(Platform::Darwin, Arch::Arm64)).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn extract_errors_surface_as_archive_kind() {
        let config = CommonConfig {
            archive_path_template: Some("{tool}".into()),
            ..Default::default()
        };
        let err = config.extract(vec![1, 2, 3], "dist.rar", &binary(Platform::Linux, Arch::X86)).unwrap_err();
        assert_eq!(*err, ErrorKind::Archive(ArchiveErrorKind::UnsupportedFormat("dist.rar".into())));
    }
}
