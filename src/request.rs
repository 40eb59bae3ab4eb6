//! Turning submitted form fields into [`ConversionSettings`].

use std::collections::HashMap;

use crate::config::{ConversionDefaults, ProfileConfig};
use crate::converter::ConversionSettings;
use crate::error::OptionsError;
use crate::format::RequestedFormat;

/// Raw text fields of a conversion form, as submitted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub format: Option<String>,
    pub quality: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub preserve_exif: Option<String>,
    pub profile: Option<String>,
}

impl FormFields {
    /// Store a named field. Returns false for names the form does not know.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "format" => &mut self.format,
            "quality" => &mut self.quality,
            "width" => &mut self.width,
            "height" => &mut self.height,
            "preserveExif" => &mut self.preserve_exif,
            "profile" => &mut self.profile,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Read a leading integer: leading whitespace and any trailing text are
/// ignored, so `"800px"` is 800 and `"75.5"` is 75.
fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let digits_start = usize::from(value.starts_with(['+', '-']));
    let digits_end = value[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value.len(), |end| digits_start + end);

    if digits_end == digits_start {
        return None;
    }
    // Out-of-range digit runs saturate
    let digits = &value[..digits_end];
    Some(digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    }))
}

/// Quality as submitted: unparsable or zero falls back to `default`,
/// anything else is clamped to 1..=100.
pub fn parse_quality(raw: Option<&str>, default: u8) -> u8 {
    match raw.and_then(leading_integer) {
        Some(0) | None => default,
        Some(quality) => quality.clamp(1, 100) as u8,
    }
}

/// Optional resize bound; empty, zero, negative or unparsable means "no bound"
pub fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw.and_then(leading_integer)
        .filter(|value| *value > 0)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
}

pub fn parse_flag(raw: Option<&str>) -> Option<bool> {
    raw.map(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Resolve the settings for one request.
///
/// Explicit fields win over the selected profile, which wins over the
/// server defaults. The format has no server default.
pub fn resolve_settings(
    fields: &FormFields,
    defaults: &ConversionDefaults,
    profiles: &HashMap<String, ProfileConfig>,
) -> Result<ConversionSettings, OptionsError> {
    let profile = match non_empty(fields.profile.as_ref()) {
        Some(name) => Some(
            profiles
                .get(name)
                .ok_or_else(|| OptionsError::UnknownProfile(name.to_string()))?,
        ),
        None => None,
    };

    let format_token = non_empty(fields.format.as_ref())
        .or_else(|| profile.and_then(|p| non_empty(p.format.as_ref())))
        .ok_or(OptionsError::MissingFormat)?;
    let target = RequestedFormat::parse(format_token)
        .map_err(|_| OptionsError::UnsupportedFormat(format_token.to_string()))?;

    let default_quality = profile
        .and_then(|p| p.quality)
        .unwrap_or(defaults.quality)
        .clamp(1, 100);
    let quality = parse_quality(fields.quality.as_deref(), default_quality);

    let width = parse_dimension(fields.width.as_deref()).or(profile.and_then(|p| p.width));
    let height = parse_dimension(fields.height.as_deref()).or(profile.and_then(|p| p.height));

    let preserve_exif = parse_flag(fields.preserve_exif.as_deref())
        .or(profile.and_then(|p| p.preserve_exif))
        .unwrap_or(false);

    Ok(ConversionSettings {
        target,
        quality,
        width,
        height,
        preserve_exif,
    })
}
