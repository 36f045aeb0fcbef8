//! Backend configuration shapes.
//!
//! A source is declared as a flat map of fields. The field prefix decides the
//! shape (`file_`, `gcs_`, `github_`, `https_`, `s3_`), and exactly one shape
//! may be populated. [`SourceConfig::validate`] turns the loosely-typed map
//! into the closed [`Source`] enum, so an invalid source is rejected when the
//! configuration is loaded rather than on first use.

use crate::error::{ErrorKind, Result};
use crate::template::{CommonConfig, TemplateMappings};
use exn::OptionExt;
use serde::Deserialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Source declaration as it appears in a settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub archive_path_template: Option<String>,
    pub template_mappings: TemplateMappings,

    pub file_path_template: Option<String>,

    pub gcs_bucket: Option<String>,
    pub gcs_path_template: Option<String>,

    pub github_base_url: Option<String>,
    pub github_slug: Option<String>,
    pub github_release_asset_template: Option<String>,

    pub https_url_template: Option<String>,

    pub s3_bucket: Option<String>,
    pub s3_path_template: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSystemConfig {
    pub common: CommonConfig,
    pub path_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcsConfig {
    pub common: CommonConfig,
    pub bucket: String,
    pub path_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitHubConfig {
    pub common: CommonConfig,
    /// API root; `None` means the public `https://api.github.com`.
    pub base_url: Option<String>,
    /// `owner/repo`
    pub slug: String,
    pub asset_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpsConfig {
    pub common: CommonConfig,
    pub url_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Config {
    pub common: CommonConfig,
    pub bucket: String,
    pub path_template: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
}

/// A validated source: exactly one backend shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    FileSystem(FileSystemConfig),
    Gcs(GcsConfig),
    GitHub(GitHubConfig),
    Https(HttpsConfig),
    S3(S3Config),
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Source::FileSystem(c) => f.write_str(&c.path_template),
            Source::Gcs(c) => write!(f, "gs://{}/{}", c.bucket, c.path_template),
            Source::GitHub(c) => write!(
                f,
                "{}/{}:{}",
                c.base_url.as_deref().unwrap_or("github.com"),
                c.slug,
                c.asset_template
            ),
            Source::Https(c) => f.write_str(&c.url_template),
            Source::S3(c) => write!(f, "s3://{}/{}", c.bucket, c.path_template),
        }
    }
}

impl SourceConfig {
    /// Check that exactly one shape is populated and that it carries its
    /// required fields.
    pub fn validate(&self) -> Result<Source> {
        let shapes = [
            ("filesystem", self.file_path_template.is_some()),
            ("gcs", self.gcs_bucket.is_some() || self.gcs_path_template.is_some()),
            (
                "github",
                self.github_base_url.is_some()
                    || self.github_slug.is_some()
                    || self.github_release_asset_template.is_some(),
            ),
            ("https", self.https_url_template.is_some()),
            (
                "s3",
                self.s3_bucket.is_some()
                    || self.s3_path_template.is_some()
                    || self.s3_region.is_some()
                    || self.s3_endpoint.is_some(),
            ),
        ];
        let populated: Vec<&str> = shapes.iter().filter(|(_, set)| *set).map(|(name, _)| *name).collect();
        let shape = match populated.as_slice() {
            [] => exn::bail!(ErrorKind::InvalidConfig("no backend configuration attached".into())),
            [shape] => *shape,
            many => exn::bail!(ErrorKind::InvalidConfig(format!(
                "multiple backend configurations attached: {}",
                many.join(", ")
            ))),
        };

        let common = CommonConfig {
            archive_path_template: self.archive_path_template.clone(),
            mappings: self.template_mappings.clone(),
        };
        Ok(match shape {
            "filesystem" => Source::FileSystem(FileSystemConfig {
                common,
                path_template: required(&self.file_path_template, "file_path_template")?,
            }),
            "gcs" => Source::Gcs(GcsConfig {
                common,
                bucket: required(&self.gcs_bucket, "gcs_bucket")?,
                path_template: required(&self.gcs_path_template, "gcs_path_template")?,
            }),
            "github" => Source::GitHub(GitHubConfig {
                common,
                base_url: optional(&self.github_base_url),
                slug: required(&self.github_slug, "github_slug")?,
                asset_template: required(&self.github_release_asset_template, "github_release_asset_template")?,
            }),
            "https" => Source::Https(HttpsConfig {
                common,
                url_template: required(&self.https_url_template, "https_url_template")?,
            }),
            _ => Source::S3(S3Config {
                common,
                bucket: required(&self.s3_bucket, "s3_bucket")?,
                path_template: required(&self.s3_path_template, "s3_path_template")?,
                region: optional(&self.s3_region),
                endpoint: optional(&self.s3_endpoint),
            }),
        })
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    optional(value).ok_or_raise(|| ErrorKind::InvalidConfig(format!("`{field}` must be set")))
}

fn optional(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> SourceConfig {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(json!({"file_path_template": "/opt/tools/{tool}"}), "/opt/tools/{tool}")]
    #[case(json!({"gcs_bucket": "b", "gcs_path_template": "{tool}/{version}"}), "gs://b/{tool}/{version}")]
    #[case(json!({"s3_bucket": "b", "s3_path_template": "{tool}"}), "s3://b/{tool}")]
    #[case(json!({"https_url_template": "https://dl.example.com/{tool}"}), "https://dl.example.com/{tool}")]
    #[case(
        json!({"github_slug": "acme/tool", "github_release_asset_template": "{tool}_{platform}"}),
        "github.com/acme/tool:{tool}_{platform}"
    )]
    #[case(
        json!({
            "github_base_url": "https://ghe.example.com/api/v3",
            "github_slug": "acme/tool",
            "github_release_asset_template": "{tool}"
        }),
        "https://ghe.example.com/api/v3/acme/tool:{tool}"
    )]
    fn valid_shapes(#[case] value: serde_json::Value, #[case] description: &str) {
        let source = parse(value).validate().unwrap();
        assert_eq!(source.to_string(), description);
    }

    #[test]
    fn common_block_is_carried() {
        let source = parse(json!({
            "archive_path_template": "{tool}-{version}/{tool}",
            "template_mappings": {"darwin": "macos", "x86_32": "i386"},
            "https_url_template": "https://example.com/{tool}.tar.gz",
        }))
        .validate()
        .unwrap();
        let Source::Https(config) = source else {
            panic!("expected https source");
        };
        assert_eq!(config.common.archive_path_template.as_deref(), Some("{tool}-{version}/{tool}"));
        assert_eq!(config.common.mappings.darwin.as_deref(), Some("macos"));
        assert_eq!(config.common.mappings.x86.as_deref(), Some("i386"));
    }

    #[test]
    fn no_shape_is_rejected() {
        let err = parse(json!({"archive_path_template": "{tool}"})).validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(msg) if msg.contains("no backend")));
    }

    #[test]
    fn multiple_shapes_are_rejected() {
        let err = parse(json!({
            "file_path_template": "/tmp/{tool}",
            "s3_bucket": "b",
            "s3_path_template": "{tool}",
        }))
        .validate()
        .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(msg) if msg.contains("filesystem, s3")));
    }

    #[rstest]
    #[case(json!({"gcs_bucket": "b"}), "gcs_path_template")]
    #[case(json!({"gcs_path_template": "{tool}"}), "gcs_bucket")]
    #[case(json!({"github_slug": "acme/tool"}), "github_release_asset_template")]
    #[case(json!({"github_release_asset_template": "{tool}"}), "github_slug")]
    #[case(json!({"s3_bucket": "b", "s3_path_template": ""}), "s3_path_template")]
    #[case(json!({"file_path_template": ""}), "file_path_template")]
    #[case(json!({"https_url_template": ""}), "https_url_template")]
    fn missing_required_fields(#[case] value: serde_json::Value, #[case] field: &str) {
        let err = parse(value).validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(msg) if msg.contains(field)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: std::result::Result<SourceConfig, _> = serde_json::from_value(json!({"ftp_host": "x"}));
        assert!(result.is_err());
    }
}
