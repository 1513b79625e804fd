//! File naming and atomic writes for downloaded images.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Longest file name produced by [`sanitize_filename`], in characters.
pub const MAX_FILENAME_CHARS: usize = 120;

/// Extension used when nothing better is known.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Bytes kept from the start of a payload for type sniffing.
const SNIFF_LEN: usize = 64;

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const URL_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "svg", "ico", "avif",
];

/// Make a name safe on every common filesystem.
///
/// Path separators become `_`, control and shell-hostile characters are
/// removed, whitespace runs collapse to one space, and the result is capped
/// at [`MAX_FILENAME_CHARS`] while keeping the extension.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let (base, ext) = match trimmed.rfind('.') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    };

    let max_base = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count());
    let base = if base.chars().count() > max_base {
        base.chars()
            .take(max_base)
            .collect::<String>()
            .trim_end_matches(|c| c == ' ' || c == '.')
            .to_string()
    } else {
        base.to_string()
    };

    if WINDOWS_RESERVED.contains(&base.to_uppercase().as_str()) {
        format!("{}_{}", base, ext)
    } else {
        format!("{}{}", base, ext)
    }
}

/// Extension for an image Content-Type, ignoring parameters.
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let base = content_type.split(';').next()?.trim().to_lowercase();
    let ext = match base.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" | "image/x-tiff" => "tif",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/avif" => "avif",
        _ => return None,
    };
    Some(ext)
}

/// Extension sniffed from the payload's magic bytes.
pub fn extension_from_bytes(head: &[u8]) -> Option<&'static str> {
    infer::get(head)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.extension())
}

/// Image extension from the last path segment of a URL.
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let segment = urlencoding::decode(segment).ok()?;
    let (_, ext) = segment.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    match ext.as_str() {
        "jpeg" => Some("jpg"),
        "tiff" => Some("tif"),
        other => URL_EXTENSIONS.iter().copied().find(|known| *known == other),
    }
}

/// Pick an extension: Content-Type, then magic bytes, then URL, then `jpg`.
pub fn choose_extension(content_type: Option<&str>, head: &[u8], url: &str) -> &'static str {
    content_type
        .and_then(extension_from_content_type)
        .or_else(|| extension_from_bytes(head))
        .or_else(|| extension_from_url(url))
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Base name (without extension) for an image URL.
///
/// Uses the last path segment, falling back to `fallback` (e.g. the result
/// title) and then to `"image"`.
pub fn stem_for_url(url: &str, fallback: Option<&str>) -> String {
    let from_url = url::Url::parse(url).ok().and_then(|parsed| {
        let segment = parsed.path_segments()?.next_back()?.to_string();
        let decoded = urlencoding::decode(&segment).ok()?.into_owned();
        let stem = match decoded.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => decoded,
        };
        Some(stem).filter(|s| !s.trim().is_empty())
    });

    let raw = from_url
        .or_else(|| fallback.map(str::to_string).filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| "image".to_string());

    // Leave room for the number prefix and extension.
    let stem: String = sanitize_filename(&raw.replace('.', "_"))
        .chars()
        .take(MAX_FILENAME_CHARS - 16)
        .collect();
    stem.trim_end().to_string()
}

/// File name for the `index`-th (zero-based) image of a batch: `N. stem.ext`.
pub fn numbered_filename(index: usize, stem: &str, ext: &str) -> String {
    format!("{}. {}.{}", index + 1, stem, ext)
}

/// `dir/base.ext`, or `dir/base (n).ext` for the first free `n`.
pub fn ensure_unique_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let target = dir.join(format!("{}.{}", base, ext));
    if !target.exists() {
        return target;
    }
    let mut counter = 1u32;
    loop {
        let target = dir.join(format!("{} ({}).{}", base, counter, ext));
        if !target.exists() {
            return target;
        }
        counter += 1;
    }
}

/// A payload being written next to its destination.
///
/// Nothing appears at the destination until [`StagedFile::commit`]; dropping
/// the value deletes the temporary file.
pub struct StagedFile {
    temp: NamedTempFile,
    file: tokio::fs::File,
    bytes: u64,
    head: Vec<u8>,
}

impl StagedFile {
    /// Create a hidden temporary file in `dir`.
    pub async fn create_in(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let temp = tempfile::Builder::new()
            .prefix(".imgharvest-")
            .suffix(".part")
            .tempfile_in(dir)?;
        let file = tokio::fs::File::from_std(temp.reopen()?);
        Ok(Self {
            temp,
            file,
            bytes: 0,
            head: Vec::with_capacity(SNIFF_LEN),
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.file.write_all(chunk).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// First bytes of the payload, for type sniffing.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Flush to disk and move into place.
    ///
    /// Without `overwrite`, fails with `AlreadyExists` if `dest` exists.
    pub async fn commit(mut self, dest: &Path, overwrite: bool) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        let persisted = if overwrite {
            self.temp.persist(dest)
        } else {
            self.temp.persist_noclobber(dest)
        };
        persisted.map(|_| ()).map_err(|e| e.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_and_removes() {
        assert_eq!(sanitize_filename("path/to\\file.jpg"), "path_to_file.jpg");
        assert_eq!(sanitize_filename("file\u{0}\u{1f}\u{7f}name.jpg"), "filename.jpg");
        assert_eq!(sanitize_filename("file<>:\"|?*name.jpg"), "filename.jpg");
        assert_eq!(sanitize_filename("file    name \t test.jpg"), "file name test.jpg");
        assert_eq!(sanitize_filename("  ...filename.jpg...  "), "filename.jpg");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename(" .. "), "unnamed");
        assert_eq!(sanitize_filename("filename"), "filename");
    }

    #[test]
    fn test_sanitize_caps_length_keeping_extension() {
        let name = format!("{}.jpg", "a".repeat(150));
        let result = sanitize_filename(&name);
        assert_eq!(result.chars().count(), MAX_FILENAME_CHARS);
        assert!(result.ends_with(".jpg"));

        let name = format!("{}.longextension", "x".repeat(150));
        let result = sanitize_filename(&name);
        assert!(result.ends_with(".longextension"));
        assert!(result.chars().count() <= MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_sanitize_windows_reserved_names() {
        for name in ["CON", "PRN", "AUX", "NUL", "COM1", "LPT1"] {
            assert_eq!(sanitize_filename(&format!("{}.jpg", name)), format!("{}_.jpg", name));
            let lower = name.to_lowercase();
            assert_eq!(sanitize_filename(&format!("{}.jpg", lower)), format!("{}_.jpg", lower));
        }
        assert_eq!(sanitize_filename("CONSOLE.jpg"), "CONSOLE.jpg");
    }

    #[test]
    fn test_extension_resolution_order() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

        assert_eq!(choose_extension(Some("image/jpeg"), &png_magic, "http://x.example/a.gif"), "jpg");
        assert_eq!(choose_extension(Some("image/tiff; q=1"), &[], "http://x.example/a"), "tif");
        assert_eq!(
            choose_extension(Some("application/octet-stream"), &png_magic, "http://x.example/a.gif"),
            "png"
        );
        assert_eq!(choose_extension(None, b"plain text", "http://x.example/a.GIF?w=2"), "gif");
        assert_eq!(choose_extension(None, &[], "http://x.example/photo.jpeg"), "jpg");
        assert_eq!(choose_extension(None, &[], "http://x.example/page.html"), "jpg");
        assert_eq!(choose_extension(None, &[], "not a url"), "jpg");
    }

    #[test]
    fn test_stem_for_url() {
        assert_eq!(stem_for_url("https://img.example/path/sea%20view.jpg?x=1", None), "sea view");
        assert_eq!(stem_for_url("https://img.example/", Some("Blue ocean")), "Blue ocean");
        assert_eq!(stem_for_url("https://img.example/", None), "image");
        assert_eq!(stem_for_url("https://img.example/a.b.c.png", None), "a_b_c");
        assert_eq!(numbered_filename(0, "sea view", "jpg"), "1. sea view.jpg");
    }

    #[test]
    fn test_ensure_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_unique_path(dir.path(), "cat", "png");
        assert_eq!(first, dir.path().join("cat.png"));

        std::fs::write(&first, b"x").unwrap();
        let second = ensure_unique_path(dir.path(), "cat", "png");
        assert_eq!(second, dir.path().join("cat (1).png"));

        std::fs::write(&second, b"x").unwrap();
        assert_eq!(ensure_unique_path(dir.path(), "cat", "png"), dir.path().join("cat (2).png"));
    }

    #[tokio::test]
    async fn test_staged_file_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1. photo.jpg");

        let mut staged = StagedFile::create_in(dir.path()).await.unwrap();
        staged.write_chunk(b"hello ").await.unwrap();
        staged.write_chunk(b"world").await.unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        assert!(temp_path.exists());
        assert!(!dest.exists());
        assert_eq!(staged.bytes(), 11);
        assert_eq!(staged.head(), b"hello world");

        staged.commit(&dest, false).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_dropped_staged_file_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedFile::create_in(dir.path()).await.unwrap();
        staged.write_chunk(b"partial").await.unwrap();
        drop(staged);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_commit_without_overwrite_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("taken.jpg");
        std::fs::write(&dest, b"original").unwrap();

        let mut staged = StagedFile::create_in(dir.path()).await.unwrap();
        staged.write_chunk(b"replacement").await.unwrap();
        let err = staged.commit(&dest, false).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&dest).unwrap(), b"original");

        let mut staged = StagedFile::create_in(dir.path()).await.unwrap();
        staged.write_chunk(b"replacement").await.unwrap();
        staged.commit(&dest, true).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"replacement");
    }
}
