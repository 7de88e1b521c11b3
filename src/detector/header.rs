//! File header (magic byte) validation
//!
//! Ransomware encrypts entire files including headers. A .docx that doesn't
//! start with PK (ZIP signature) has been encrypted. This module checks that
//! the leading bytes of a file match what its declared mime type (or, failing
//! that, its extension) promises. Types without a header convention are never
//! reported as corrupted.

/// A magic byte sequence expected at a fixed offset
struct Signature {
    offset: usize,
    magic: &'static [u8],
    extensions: &'static [&'static str],
}

const fn sig(
    offset: usize,
    magic: &'static [u8],
    extensions: &'static [&'static str],
) -> Signature {
    Signature {
        offset,
        magic,
        extensions,
    }
}

/// Known file signatures
const SIGNATURES: &[Signature] = &[
    // Documents
    sig(0, b"PK\x03\x04", &["docx", "xlsx", "pptx", "odt", "ods", "odp", "zip", "jar", "apk", "epub"]),
    sig(0, b"%PDF", &["pdf"]),
    sig(0, b"\xD0\xCF\x11\xE0", &["doc", "xls", "ppt", "msg"]), // OLE2
    sig(0, b"{\\rtf", &["rtf"]),

    // Images
    sig(0, b"\x89PNG\r\n\x1A\n", &["png"]),
    sig(0, b"\xFF\xD8\xFF", &["jpg", "jpeg"]),
    sig(0, b"GIF87a", &["gif"]),
    sig(0, b"GIF89a", &["gif"]),
    sig(0, b"RIFF", &["webp", "wav", "avi"]),
    sig(0, b"BM", &["bmp"]),
    sig(0, b"II*\x00", &["tif", "tiff"]),
    sig(0, b"MM\x00*", &["tif", "tiff"]),

    // Audio/Video
    sig(0, b"ID3", &["mp3"]),
    sig(0, b"\xFF\xFB", &["mp3"]),
    sig(0, b"\xFF\xFA", &["mp3"]),
    sig(0, b"\xFF\xF3", &["mp3"]),
    sig(0, b"OggS", &["ogg", "ogv", "oga", "opus"]),
    sig(0, b"fLaC", &["flac"]),
    sig(0, b"\x1A\x45\xDF\xA3", &["mkv", "webm"]),
    sig(4, b"ftyp", &["mp4", "m4a", "m4v", "mov", "heic"]),

    // Archives
    sig(0, b"\x1F\x8B", &["gz", "tgz"]),
    sig(0, b"BZh", &["bz2"]),
    sig(0, b"\xFD7zXZ\x00", &["xz"]),
    sig(0, b"7z\xBC\xAF\x27\x1C", &["7z"]),
    sig(0, b"Rar!\x1A\x07", &["rar"]),
    sig(257, b"ustar", &["tar"]),

    // Executables
    sig(0, b"\x7FELF", &["elf", "so"]),
    sig(0, b"MZ", &["exe", "dll"]),

    // Databases
    sig(0, b"SQLite format 3", &["sqlite", "db", "sqlite3"]),

    // Fonts
    sig(0, b"\x00\x01\x00\x00", &["ttf"]),
    sig(0, b"OTTO", &["otf"]),
    sig(0, b"wOFF", &["woff"]),
    sig(0, b"wOF2", &["woff2"]),
];

/// Mime types and the extensions they cover
const MIME_TYPES: &[(&str, &[&str])] = &[
    ("application/pdf", &["pdf"]),
    ("application/zip", &["zip"]),
    ("application/msword", &["doc"]),
    ("application/vnd.ms-excel", &["xls"]),
    ("application/vnd.ms-powerpoint", &["ppt"]),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", &["docx"]),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", &["xlsx"]),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", &["pptx"]),
    ("application/vnd.oasis.opendocument.text", &["odt"]),
    ("application/vnd.oasis.opendocument.spreadsheet", &["ods"]),
    ("application/vnd.oasis.opendocument.presentation", &["odp"]),
    ("application/epub+zip", &["epub"]),
    ("application/rtf", &["rtf"]),
    ("application/gzip", &["gz", "tgz"]),
    ("application/x-bzip2", &["bz2"]),
    ("application/x-xz", &["xz"]),
    ("application/x-7z-compressed", &["7z"]),
    ("application/x-rar-compressed", &["rar"]),
    ("application/x-tar", &["tar"]),
    ("application/vnd.sqlite3", &["sqlite", "sqlite3", "db"]),
    ("application/json", &["json"]),
    ("application/xml", &["xml"]),
    ("image/png", &["png"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("image/bmp", &["bmp"]),
    ("image/tiff", &["tif", "tiff"]),
    ("image/heic", &["heic"]),
    ("image/svg+xml", &["svg"]),
    ("audio/mpeg", &["mp3"]),
    ("audio/ogg", &["ogg", "oga", "opus"]),
    ("audio/flac", &["flac"]),
    ("audio/wav", &["wav"]),
    ("audio/mp4", &["m4a"]),
    ("video/mp4", &["mp4", "m4v"]),
    ("video/quicktime", &["mov"]),
    ("video/x-matroska", &["mkv"]),
    ("video/webm", &["webm"]),
    ("video/x-msvideo", &["avi"]),
    ("font/ttf", &["ttf"]),
    ("font/otf", &["otf"]),
    ("font/woff", &["woff"]),
    ("font/woff2", &["woff2"]),
    ("text/plain", &["txt", "log", "ini", "cfg", "conf"]),
    ("text/csv", &["csv"]),
    ("text/markdown", &["md", "markdown", "rst"]),
    ("text/html", &["html", "htm"]),
    ("text/css", &["css"]),
    ("text/javascript", &["js", "mjs", "ts"]),
    ("text/x-script", &["sh", "bash", "py", "pl", "rb", "rs", "go", "c", "h", "cpp", "java"]),
    ("text/yaml", &["yaml", "yml", "toml"]),
];

/// Fallback for anything not in the table
pub const OPAQUE_MIME: &str = "application/octet-stream";

/// Derive a mime type from a file name's extension
pub fn mime_for_name(name: &str) -> &'static str {
    let Some(ext) = crate::monitor::extension(name) else {
        return OPAQUE_MIME;
    };
    MIME_TYPES
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(mime, _)| *mime)
        .unwrap_or(OPAQUE_MIME)
}

/// Extensions a declared type stands for
///
/// A declared value without a slash is taken as a bare extension. Unknown
/// mime types fall back to the extension of `name`.
fn declared_extensions(mime_type: &str, name: &str) -> Vec<String> {
    let mime = mime_type.trim().to_lowercase();
    if !mime.is_empty() && !mime.contains('/') {
        return vec![mime.trim_start_matches('.').to_string()];
    }
    if let Some((_, exts)) = MIME_TYPES.iter().find(|(m, _)| *m == mime) {
        return exts.iter().map(|e| e.to_string()).collect();
    }
    crate::monitor::extension(name).into_iter().collect()
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(mime, "application/json" | "application/xml" | "image/svg+xml")
}

fn is_text_type(mime_type: &str, extensions: &[String]) -> bool {
    if is_text_mime(&mime_type.trim().to_lowercase()) {
        return true;
    }
    extensions.iter().any(|ext| {
        MIME_TYPES
            .iter()
            .filter(|(mime, _)| is_text_mime(mime))
            .any(|(_, exts)| exts.contains(&ext.as_str()))
    })
}

/// Whether content contradicts its declared type
///
/// Binary types are checked against their magic bytes, text types against
/// looking like random data. Anything else, or content too short to judge,
/// is not corrupted.
pub fn is_corrupted(mime_type: &str, name: &str, content: &[u8]) -> bool {
    // Need at least some bytes to check
    if content.len() < 8 {
        return false;
    }

    let extensions = declared_extensions(mime_type, name);
    if extensions.is_empty() {
        return false;
    }

    let expected: Vec<&Signature> = SIGNATURES
        .iter()
        .filter(|s| s.extensions.iter().any(|e| extensions.iter().any(|x| x.as_str() == *e)))
        .collect();

    if !expected.is_empty() {
        // Header too short to hold the signature: can't tell
        if expected.iter().all(|s| content.len() < s.offset + s.magic.len()) {
            return false;
        }
        return !expected.iter().any(|s| matches(s, content));
    }

    if is_text_type(mime_type, &extensions) {
        return looks_encrypted(content);
    }

    false
}

fn matches(signature: &Signature, content: &[u8]) -> bool {
    content
        .get(signature.offset..signature.offset + signature.magic.len())
        .is_some_and(|head| head == signature.magic)
}

/// Get the file type based on magic bytes
pub fn detect_type(content: &[u8]) -> Option<&'static str> {
    if content.len() < 4 {
        return None;
    }

    SIGNATURES
        .iter()
        .find(|s| matches(s, content))
        .and_then(|s| s.extensions.first().copied())
}

/// Check if content looks like encrypted/random data
pub fn looks_encrypted(content: &[u8]) -> bool {
    if content.len() < 16 {
        return false;
    }

    // If it starts with any known signature, not encrypted
    if detect_type(content).is_some() {
        return false;
    }

    // Byte order marks
    if content.starts_with(b"\xEF\xBB\xBF") || content.starts_with(b"\xFF\xFE") || content.starts_with(b"\xFE\xFF") {
        return false;
    }

    let head = &content[..content.len().min(64)];

    // Valid UTF-8 text, possibly cut mid-character at the end
    match std::str::from_utf8(head) {
        Ok(_) => return false,
        Err(e) if e.error_len().is_none() => return false,
        Err(_) => {}
    }

    let first_16 = &content[..16];

    // Check for printable ASCII (text files)
    let printable_count = first_16.iter().filter(|&&b| (0x20..0x7F).contains(&b)).count();
    if printable_count > 12 {
        return false; // Probably text
    }

    // Check for null bytes pattern (common in some formats)
    let null_count = first_16.iter().filter(|&&b| b == 0).count();
    if null_count > 8 {
        return false; // Probably structured binary
    }

    true // Looks like random data
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANDOM: &[u8] = b"\xDE\xAD\xBE\xEF\x00\x11\x22\x33\x9A\xF1\x07\xC3\x88\x5E\xB4\x1D\xE0\x02";

    #[test]
    fn test_valid_png() {
        let content = b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR";
        assert!(!is_corrupted("image/png", "test.png", content));
    }

    #[test]
    fn test_invalid_png_header() {
        assert!(is_corrupted("image/png", "test.png", RANDOM));
    }

    #[test]
    fn test_valid_pdf() {
        let content = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3";
        assert!(!is_corrupted("application/pdf", "document.pdf", content));
    }

    #[test]
    fn test_encrypted_pdf() {
        let content = b"\x7B\x2F\x8A\x3C\x99\x12\xAB\xCD"; // Random bytes
        assert!(is_corrupted("application/pdf", "document.pdf", content));
    }

    #[test]
    fn test_bare_extension_as_mime() {
        let content = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3";
        assert!(!is_corrupted("pdf", "test.csv", content));
        assert!(is_corrupted("pdf", "test.csv", RANDOM));
    }

    #[test]
    fn test_unknown_mime_falls_back_to_extension() {
        assert!(is_corrupted("", "photo.jpg", RANDOM));
        assert!(is_corrupted("application/x-unknown", "photo.jpg", RANDOM));
    }

    #[test]
    fn test_unknown_type_not_corrupted() {
        assert!(!is_corrupted(OPAQUE_MIME, "file.xyz", RANDOM));
        assert!(!is_corrupted("", "noext", RANDOM));
    }

    #[test]
    fn test_short_content_not_corrupted() {
        assert!(!is_corrupted("image/png", "a.png", b"\x01\x02"));
    }

    #[test]
    fn test_offset_signature() {
        let content = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00";
        assert!(!is_corrupted("video/mp4", "clip.mp4", content));
        assert!(is_corrupted("video/mp4", "clip.mp4", RANDOM));
    }

    #[test]
    fn test_text_types() {
        assert!(!is_corrupted("text/csv", "data.csv", b"id,name,amount\n1,alice,10\n"));
        assert!(!is_corrupted("text/plain", "jp.txt", "日本語のテキストファイルです".as_bytes()));
        assert!(is_corrupted("text/plain", "notes.txt", RANDOM));
        // Script without shebang is still fine
        assert!(!is_corrupted("", "tool.py", b"import os\nprint(os.getcwd())\n"));
    }

    #[test]
    fn test_idempotent() {
        let first = is_corrupted("image/png", "test.png", RANDOM);
        let second = is_corrupted("image/png", "test.png", RANDOM);
        assert_eq!(first, second);
    }

    #[test]
    fn test_detect_type() {
        assert_eq!(detect_type(b"\x89PNG\r\n\x1A\n"), Some("png"));
        assert_eq!(detect_type(b"%PDF-1.4"), Some("pdf"));
        assert_eq!(detect_type(b"PK\x03\x04"), Some("docx"));
        assert_eq!(detect_type(b"\xDE\xAD\xBE\xEF"), None);
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("a.PDF"), "application/pdf");
        assert_eq!(mime_for_name("b.csv"), "text/csv");
        assert_eq!(mime_for_name("c.locky"), OPAQUE_MIME);
    }
}
