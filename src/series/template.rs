//! Path templates with a single identifier placeholder.
//!
//! A template such as `/data/ct_{:07.3}.tiff` maps an identifier to a path. The placeholder
//! syntax is a subset of the `std::fmt` width and precision syntax:
//!
//! * `{}`: shortest representation, integral values without a fractional part
//! * `{:W}`: right aligned in `W` characters, space padded
//! * `{:0W}`: zero padded to `W` characters
//! * `{:.P}`: fixed precision `P`
//! * `{:0W.P}`: zero padded with fixed precision
//!
//! An optional decimal mark replaces `.` inside the rendered identifier only, so that
//! `ct_{:.2}.tiff` with mark `p` renders `1.5` as `ct_1p50.tiff`.

use std::path::PathBuf;

use crate::error::Imars3dError;

/// Parsed placeholder specification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct FormatSpec {
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let mut result = FormatSpec::default();
        let (width, precision) = match spec.split_once('.') {
            Some((width, precision)) => (width, Some(precision)),
            None => (spec, None),
        };
        if let Some(precision) = precision {
            if precision.is_empty() || !precision.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            result.precision = precision.parse().ok();
        }
        if !width.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if let Some(rest) = width.strip_prefix('0') {
            result.zero_pad = true;
            if rest.is_empty() {
                return None;
            }
            result.width = rest.parse().ok()?;
        } else if !width.is_empty() {
            result.width = width.parse().ok()?;
        }
        Some(result)
    }
}

/// A path template containing exactly one identifier placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct PathTemplate {
    raw: String,
    prefix: String,
    suffix: String,
    spec: FormatSpec,
    decimal_mark: Option<String>,
}

impl PathTemplate {
    /// Parse a template. A leading `~` is expanded to the user's home directory.
    pub fn parse(template: &str) -> Result<Self, Imars3dError> {
        let invalid = |reason: &str| Imars3dError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };
        let expanded = crate::config::expand_path(template)
            .to_string_lossy()
            .into_owned();
        let open = expanded
            .find('{')
            .ok_or_else(|| invalid("missing identifier placeholder"))?;
        let close = expanded[open..]
            .find('}')
            .map(|offset| open + offset)
            .ok_or_else(|| invalid("unterminated placeholder"))?;
        let prefix = &expanded[..open];
        let suffix = &expanded[close + 1..];
        if suffix.contains(['{', '}']) || prefix.contains('}') {
            return Err(invalid("exactly one placeholder is allowed"));
        }
        let inner = &expanded[open + 1..close];
        let spec = match inner.strip_prefix(':') {
            Some(spec) => FormatSpec::parse(spec),
            None if inner.is_empty() => Some(FormatSpec::default()),
            None => None,
        }
        .ok_or_else(|| invalid("unsupported placeholder format"))?;
        Ok(PathTemplate {
            raw: template.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            spec,
            decimal_mark: None,
        })
    }

    /// Replace `.` with `mark` inside rendered identifiers.
    pub fn with_decimal_mark(mut self, mark: Option<String>) -> Result<Self, Imars3dError> {
        if let Some(mark) = &mark {
            if mark.is_empty() || mark.contains(['/', '-']) || mark.chars().any(|c| c.is_ascii_digit()) {
                return Err(Imars3dError::InvalidTemplate {
                    template: self.raw.clone(),
                    reason: format!("decimal mark {mark:?} is ambiguous"),
                });
            }
        }
        self.decimal_mark = mark;
        Ok(self)
    }

    /// The template as given by the user.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The configured decimal mark, if any.
    pub fn decimal_mark(&self) -> Option<&str> {
        self.decimal_mark.as_deref()
    }

    /// Render an identifier as it appears in a path.
    pub fn render_identifier(&self, identifier: f64) -> String {
        let text = match self.spec.precision {
            Some(precision) => format!("{identifier:.precision$}"),
            None if identifier.fract() == 0.0 && identifier.abs() < 1e15 => {
                format!("{}", identifier as i64)
            }
            None => format!("{identifier}"),
        };
        let text = if text.len() < self.spec.width {
            let padding = self.spec.width - text.len();
            if self.spec.zero_pad {
                match text.strip_prefix('-') {
                    Some(digits) => format!("-{}{digits}", "0".repeat(padding)),
                    None => format!("{}{text}", "0".repeat(padding)),
                }
            } else {
                format!("{}{text}", " ".repeat(padding))
            }
        } else {
            text
        };
        match &self.decimal_mark {
            Some(mark) => text.replace('.', mark),
            None => text,
        }
    }

    /// Path of the image with the given identifier.
    pub fn path(&self, identifier: f64) -> PathBuf {
        PathBuf::from(format!(
            "{}{}{}",
            self.prefix,
            self.render_identifier(identifier),
            self.suffix
        ))
    }

    /// Directory that holds all files of the template and the file name prefix.
    ///
    /// Fails if the placeholder is not part of the file name.
    pub(crate) fn split_directory(&self) -> Result<(PathBuf, &str, &str), Imars3dError> {
        if self.suffix.contains(std::path::MAIN_SEPARATOR) || self.suffix.contains('/') {
            return Err(Imars3dError::InvalidTemplate {
                template: self.raw.clone(),
                reason: "the placeholder must be part of the file name".to_string(),
            });
        }
        let (directory, file_prefix) = match self.prefix.rfind('/') {
            Some(index) => (&self.prefix[..=index], &self.prefix[index + 1..]),
            None => (".", self.prefix.as_str()),
        };
        Ok((PathBuf::from(directory), file_prefix, &self.suffix))
    }

    /// Recover the identifier from a file name produced by this template.
    ///
    /// Only exact round trips are accepted, so unrelated files sharing the prefix are ignored.
    pub fn parse_identifier(&self, file_name: &str) -> Option<f64> {
        let (_, file_prefix, suffix) = self.split_directory().ok()?;
        let rendered = file_name.strip_prefix(file_prefix)?.strip_suffix(suffix)?;
        let text = match &self.decimal_mark {
            Some(mark) => rendered.replace(mark.as_str(), "."),
            None => rendered.to_string(),
        };
        let identifier: f64 = text.trim_start().parse().ok()?;
        (identifier.is_finite() && self.render_identifier(identifier) == rendered).then_some(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, identifier: f64) -> String {
        PathTemplate::parse(template)
            .unwrap()
            .path(identifier)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn render_plain() {
        assert_eq!("/data/ct_12.tiff", render("/data/ct_{}.tiff", 12.0));
        assert_eq!("/data/ct_1.5.tiff", render("/data/ct_{}.tiff", 1.5));
    }

    #[test]
    fn render_padded() {
        assert_eq!("sino_0042.tiff", render("sino_{:04}.tiff", 42.0));
        assert_eq!("sino_  42.tiff", render("sino_{:4}.tiff", 42.0));
        assert_eq!("sino_-042.tiff", render("sino_{:04}.tiff", -42.0));
    }

    #[test]
    fn render_precision() {
        assert_eq!("ct_000.500.tiff", render("ct_{:07.3}.tiff", 0.5));
        assert_eq!("ct_12.25.fits", render("ct_{:.2}.fits", 12.25));
    }

    #[test]
    fn decimal_mark_only_in_identifier() {
        let template = PathTemplate::parse("/data/v1.2/ct_{:.2}.tiff")
            .unwrap()
            .with_decimal_mark(Some("p".to_string()))
            .unwrap();
        assert_eq!(
            PathBuf::from("/data/v1.2/ct_1p50.tiff"),
            template.path(1.5)
        );
        assert_eq!(Some(1.5), template.parse_identifier("ct_1p50.tiff"));
    }

    #[test]
    fn ambiguous_decimal_mark() {
        let template = PathTemplate::parse("ct_{:.2}.tiff").unwrap();
        assert!(template.with_decimal_mark(Some("1".to_string())).is_err());
    }

    #[test]
    fn parse_identifier_round_trip_only() {
        let template = PathTemplate::parse("ct_{:04}.tiff").unwrap();
        assert_eq!(Some(12.0), template.parse_identifier("ct_0012.tiff"));
        assert_eq!(None, template.parse_identifier("ct_12.tiff"));
        assert_eq!(None, template.parse_identifier("ob_0012.tiff"));
        assert_eq!(None, template.parse_identifier("ct_0012.tiff.bak"));
    }

    #[test]
    fn placeholder_in_directory_cannot_be_discovered() {
        let template = PathTemplate::parse("/data/{}/ct.tiff").unwrap();
        assert_eq!(PathBuf::from("/data/3/ct.tiff"), template.path(3.0));
        assert!(template.split_directory().is_err());
    }

    fn invalid(template: &str) -> String {
        match PathTemplate::parse(template).unwrap_err() {
            Imars3dError::InvalidTemplate { reason, .. } => reason,
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn invalid_templates() {
        assert_eq!("missing identifier placeholder", invalid("ct.tiff"));
        assert_eq!("unterminated placeholder", invalid("ct_{.tiff"));
        assert_eq!("exactly one placeholder is allowed", invalid("{}_{}.tiff"));
        assert_eq!("unsupported placeholder format", invalid("ct_{:x}.tiff"));
        assert_eq!("unsupported placeholder format", invalid("ct_{:0}.tiff"));
        assert_eq!("unsupported placeholder format", invalid("ct_{:.}.tiff"));
        assert_eq!("unsupported placeholder format", invalid("ct_{0}.tiff"));
    }
}
