//! `Content-Type` inference from a filename extension.
//!
//! This table is explicitly out of scope for the core per the spec (the
//! core only queries it), but it has no external collaborator to delegate
//! to in this repo, so it is carried over verbatim from `http_conten_type_from_ext`
//! in the original source.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Bin,
    Bmp,
    Css,
    Csv,
    Gif,
    Html,
    Jpeg,
    Js,
    Json,
    Mp3,
    Mp4,
    Otf,
    Png,
    Pdf,
    Svg,
    Ttf,
    Txt,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Bin => "application/octet-stream",
            ContentType::Bmp => "image/bmp",
            ContentType::Css => "text/css",
            ContentType::Csv => "text/csv",
            ContentType::Gif => "image/gif",
            ContentType::Html => "text/html",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Js => "text/javascript",
            ContentType::Json => "application/json",
            ContentType::Mp3 => "audio/mpeg",
            ContentType::Mp4 => "video/mp4",
            ContentType::Otf => "font/otf",
            ContentType::Png => "image/png",
            ContentType::Pdf => "application/pdf",
            ContentType::Svg => "image/svg+xml",
            ContentType::Ttf => "font/ttf",
            ContentType::Txt => "text/plain",
        }
    }

    pub fn from_extension(ext: &str) -> ContentType {
        match ext.to_ascii_lowercase().as_str() {
            "bin" => ContentType::Bin,
            "bmp" => ContentType::Bmp,
            "css" => ContentType::Css,
            "csv" => ContentType::Csv,
            "gif" => ContentType::Gif,
            "html" | "htm" => ContentType::Html,
            "jpeg" | "jpg" => ContentType::Jpeg,
            "js" | "mjs" => ContentType::Js,
            "json" => ContentType::Json,
            "mp3" => ContentType::Mp3,
            "mp4" => ContentType::Mp4,
            "otf" => ContentType::Otf,
            "png" => ContentType::Png,
            "pdf" => ContentType::Pdf,
            "svg" => ContentType::Svg,
            "ttf" => ContentType::Ttf,
            "txt" => ContentType::Txt,
            _ => ContentType::Bin,
        }
    }

    pub fn from_path(path: &Path) -> ContentType {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ContentType::from_extension(ext),
            None => ContentType::Bin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(ContentType::from_extension("xyz"), ContentType::Bin);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(ContentType::from_extension("HTML"), ContentType::Html);
        assert_eq!(ContentType::from_extension("JPG"), ContentType::Jpeg);
    }

    #[test]
    fn aliases_share_a_type() {
        assert_eq!(ContentType::from_extension("htm"), ContentType::Html);
        assert_eq!(ContentType::from_extension("mjs"), ContentType::Js);
    }

    #[test]
    fn derives_from_path_extension() {
        assert_eq!(
            ContentType::from_path(Path::new("/srv/www/a/b.txt")),
            ContentType::Txt
        );
        assert_eq!(
            ContentType::from_path(Path::new("/srv/www/noext")),
            ContentType::Bin
        );
    }
}
