//! Output filename derivation for downloads and zip entries.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashSet;

/// Stem used when the upload has no usable name
pub const DEFAULT_STEM: &str = "image";

// Only unreserved characters pass through `filename*` unescaped
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Derive the download name for a converted upload.
///
/// Directory components are dropped, then everything from the last `.` on.
/// An empty stem (no name, no dot, dotfile) falls back to [`DEFAULT_STEM`].
pub fn output_file_name(original: Option<&str>, extension: &str) -> String {
    let stem = original
        .map(base_name)
        .map(strip_extension)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(DEFAULT_STEM);
    format!("{stem}.{extension}")
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn strip_extension(name: &str) -> &str {
    name.rfind('.').map_or("", |idx| &name[..idx])
}

/// Hands out unique names within one archive or output directory
#[derive(Debug, Default)]
pub struct NameDeduplicator {
    seen: HashSet<String>,
}

impl NameDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `name` if unused, otherwise `stem (n).ext` for the first free `n`
    pub fn unique(&mut self, name: &str) -> String {
        if self.seen.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, extension) = match name.rfind('.') {
            Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
            _ => (name, None),
        };

        let mut counter = 1usize;
        loop {
            let candidate = match extension {
                Some(ext) => format!("{stem} ({counter}).{ext}"),
                None => format!("{stem} ({counter})"),
            };
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Build an `attachment` Content-Disposition value.
///
/// The quoted `filename` is restricted to printable ASCII; names with other
/// characters also get an RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(filename, ATTR_CHAR)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_last_extension() {
        assert_eq!(output_file_name(Some("photo.JPG"), "webp"), "photo.webp");
        assert_eq!(output_file_name(Some("a.b.c.png"), "jpg"), "a.b.c.jpg");
    }

    #[test]
    fn falls_back_to_default_stem() {
        assert_eq!(output_file_name(None, "png"), "image.png");
        assert_eq!(output_file_name(Some(""), "png"), "image.png");
        assert_eq!(output_file_name(Some("README"), "png"), "image.png");
        assert_eq!(output_file_name(Some(".hidden"), "png"), "image.png");
    }

    #[test]
    fn strips_directories() {
        assert_eq!(output_file_name(Some("../../etc/passwd.png"), "gif"), "passwd.gif");
        assert_eq!(output_file_name(Some("uploads/"), "gif"), "image.gif");
        assert_eq!(output_file_name(Some("C:\\Users\\me\\cat.bmp"), "png"), "cat.png");
        assert_eq!(output_file_name(Some("albums/2024/beach.tiff"), "avif"), "beach.avif");
    }

    #[test]
    fn dedupes_names() {
        let mut names = NameDeduplicator::new();
        assert_eq!(names.unique("photo.webp"), "photo.webp");
        assert_eq!(names.unique("photo.webp"), "photo (1).webp");
        assert_eq!(names.unique("photo.webp"), "photo (2).webp");
        assert_eq!(names.unique("other.webp"), "other.webp");
        assert_eq!(names.unique("noext"), "noext");
        assert_eq!(names.unique("noext"), "noext (1)");
    }

    #[test]
    fn disposition_escapes_unsafe_characters() {
        assert_eq!(
            content_disposition("photo.webp"),
            "attachment; filename=\"photo.webp\""
        );
        assert_eq!(
            content_disposition("say \"hi\".png"),
            "attachment; filename=\"say _hi_.png\"; filename*=UTF-8''say%20%22hi%22.png"
        );
        assert_eq!(
            content_disposition("café.jpg"),
            "attachment; filename=\"caf_.jpg\"; filename*=UTF-8''caf%C3%A9.jpg"
        );
    }

    #[test]
    fn disposition_keeps_unreserved_characters_unescaped() {
        assert_eq!(
            content_disposition("résumé-v2_final~.pdf"),
            "attachment; filename=\"r_sum_-v2_final~.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9-v2_final~.pdf"
        );
        assert_eq!(
            content_disposition("日本.png"),
            "attachment; filename=\"__.png\"; filename*=UTF-8''%E6%97%A5%E6%9C%AC.png"
        );
    }
}
