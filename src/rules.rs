//! Bundled rules files.

/// Name the bundled rules report in diagnostics.
pub(crate) const BUILTIN_NAME: &str = "builtin.rules";

/// Sample rules: colors with normalized hex codes, a `foo` text rule, SSNs.
pub(crate) const BUILTIN: &str = include_str!("rules/builtin.rules");
