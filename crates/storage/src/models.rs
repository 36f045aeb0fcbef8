use std::convert::Infallible;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Operating system a binary is built for.
///
/// Unknown names are kept verbatim in [`Platform::Other`] so that new targets
/// can be used before this enum learns about them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        let Ok(platform) = std::env::consts::OS.parse::<Self>();
        platform
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Other(raw) => raw,
        }
    }
}

impl FromStr for Platform {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "darwin" | "macos" => Self::Darwin,
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            _ => Self::Other(s.to_string()),
        })
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// CPU architecture a binary is built for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm32,
    Arm64,
    Other(String),
}

impl Arch {
    /// The architecture this process is running on.
    pub fn current() -> Self {
        let Ok(arch) = std::env::consts::ARCH.parse::<Self>();
        arch
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Arm32 => "arm32",
            Self::Arm64 => "arm64",
            Self::Other(raw) => raw,
        }
    }
}

impl FromStr for Arch {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "x86" | "386" | "i386" | "i686" => Self::X86,
            "x86_64" | "amd64" => Self::X86_64,
            "arm32" | "arm" => Self::Arm32,
            "arm64" | "aarch64" => Self::Arm64,
            _ => Self::Other(s.to_string()),
        })
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Identity of one fetchable artifact.
///
/// Equality is exact on all four fields; versions are opaque strings and are
/// never compared semantically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Binary {
    pub tool: String,
    pub version: String,
    pub platform: Platform,
    pub arch: Arch,
}

impl Binary {
    pub fn new(tool: impl Into<String>, version: impl Into<String>, platform: Platform, arch: Arch) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            platform,
            arch,
        }
    }

    /// The binary for the running platform and architecture.
    pub fn current(tool: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(tool, version, Platform::current(), Arch::current())
    }

    /// Suffix executables carry on this binary's platform.
    pub fn exe_suffix(&self) -> &'static str {
        match self.platform {
            Platform::Windows => ".exe",
            _ => "",
        }
    }
}

impl Display for Binary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}-{}-{}@{}", self.tool, self.platform, self.arch, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("darwin", Platform::Darwin)]
    #[case("macos", Platform::Darwin)]
    #[case("Linux", Platform::Linux)]
    #[case("windows", Platform::Windows)]
    #[case("freebsd", Platform::Other("freebsd".into()))]
    fn parse_platform(#[case] input: &str, #[case] expected: Platform) {
        assert_eq!(input.parse::<Platform>().unwrap(), expected);
    }

    #[rstest]
    #[case("amd64", Arch::X86_64)]
    #[case("x86_64", Arch::X86_64)]
    #[case("386", Arch::X86)]
    #[case("aarch64", Arch::Arm64)]
    #[case("arm", Arch::Arm32)]
    #[case("riscv64", Arch::Other("riscv64".into()))]
    fn parse_arch(#[case] input: &str, #[case] expected: Arch) {
        assert_eq!(input.parse::<Arch>().unwrap(), expected);
    }

    #[test]
    fn unknown_values_keep_their_raw_form() {
        assert_eq!(Platform::Other("plan9".into()).to_string(), "plan9");
        assert_eq!(Arch::Other("mips".into()).to_string(), "mips");
    }

    #[test]
    fn binary_display() {
        let binary = Binary::new("gotestsum", "v1.12.0", Platform::Linux, Arch::X86_64);
        assert_eq!(binary.to_string(), "gotestsum-linux-x86_64@v1.12.0");
    }

    #[test]
    fn exe_suffix_only_on_windows() {
        assert_eq!(Binary::new("t", "1", Platform::Windows, Arch::X86).exe_suffix(), ".exe");
        assert_eq!(Binary::new("t", "1", Platform::Darwin, Arch::Arm64).exe_suffix(), "");
    }
}
