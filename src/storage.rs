use std::path::{Path, PathBuf};

use actix_web::HttpResponse;
use chrono::Utc;
use uuid::Uuid;

use crate::utils::errors::ServiceError;

pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub const ALLOWED_FILE_EXTENSIONS: &[&str] = &[
    "7z", "aac", "accdb", "accft", "adx", "ai", "aiff", "aifc", "amr", "amv", "avi", "avif",
    "bmp", "blend", "cdf", "cdr", "cgm", "csv", "doc", "docx", "docm", "dot", "dotx", "dpx",
    "drc", "dtd", "dwf", "dwg", "dxf", "email", "emf", "eml", "emz", "eot", "esd", "exp", "f4v",
    "fbx", "flac", "flv", "fni", "fnx", "fodg", "fodp", "fods", "fodt", "gif", "gz", "hdi",
    "icl", "ico", "img", "info", "iso", "j2c", "jp2", "jpe", "jpeg", "jpg", "json", "jxl", "ldb",
    "lz", "m3u", "m3u8", "m4a", "m4p", "m4r", "m4v", "md", "mdf", "mdi", "mov", "mp2", "mp3",
    "mp4", "mpa", "mpc", "mpeg", "mpg", "mso", "mxf", "odb", "odf", "odg", "odp", "ods", "odt",
    "oga", "ogg", "ogv", "ogx", "ost", "otf", "otg", "otp", "ots", "ott", "pdf", "pgn", "png",
    "pptx", "ppsx", "ppt", "psd", "psdc", "pub", "rar", "rtf", "svg", "swf", "stc", "std", "sti",
    "stw", "sxc", "sxd", "sxg", "sxi", "sxm", "sxw", "tak", "tar", "taz", "tb2", "tbz", "tbz2",
    "tif", "tiff", "torrent", "ttc", "ttf", "url", "uxf", "wav", "webm", "wma", "wmdb", "wmf",
    "wmv", "wtx", "xls", "xlsb", "xlsm", "xlsx", "xmf", "xml", "xps", "zip",
];

/// Lowercased extension after the last dot, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    let ext = ext.to_lowercase();
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

pub fn allowed_file(file_name: &str, allowed_extensions: &[&str]) -> bool {
    file_extension(file_name)
        .map(|ext| allowed_extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn mime_for(file_name: &str) -> mime::Mime {
    let mime_type = match file_extension(file_name).as_deref() {
        Some("jpg") | Some("jpeg") | Some("jpe") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("txt") | Some("md") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("rar") => "application/x-rar-compressed",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };

    mime_type.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Builds a file download response for `bytes` named `original_name`.
pub fn download_response(bytes: Vec<u8>, original_name: &str) -> HttpResponse {
    let safe_name = original_name.replace(['"', '\\', '\r', '\n'], "_");
    HttpResponse::Ok()
        .content_type(mime_for(original_name).to_string())
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", safe_name)))
        .body(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Attachment,
    Image,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path recorded in the database
    pub path: String,
    pub stored_name: String,
}

/// Local-disk storage for uploaded attachments and profile images.
#[derive(Debug, Clone)]
pub struct FileStore {
    attachments_dir: PathBuf,
    images_dir: PathBuf,
}

impl FileStore {
    pub fn new(attachments_dir: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            attachments_dir: attachments_dir.into(),
            images_dir: images_dir.into(),
        }
    }

    fn dir(&self, kind: FileKind) -> &Path {
        match kind {
            FileKind::Attachment => &self.attachments_dir,
            FileKind::Image => &self.images_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), ServiceError> {
        for dir in [&self.attachments_dir, &self.images_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    log::error!("Failed to create upload directory {}: {}", dir.display(), e);
                    ServiceError::InternalError("Failed to create upload directory".to_string())
                })?;
            }
        }
        Ok(())
    }

    /// Collision-free name keeping the original extension.
    pub fn stored_name(original_name: &str, suffix: &str) -> String {
        let ext = file_extension(original_name).unwrap_or_else(|| "bin".to_string());
        format!(
            "{}_{}{}.{}",
            Utc::now().format("%d_%m_%Y_%H_%M_%S"),
            Uuid::new_v4().simple(),
            suffix,
            ext
        )
    }

    pub async fn save(
        &self,
        kind: FileKind,
        original_name: &str,
        suffix: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, ServiceError> {
        self.ensure_dirs()?;

        let stored_name = Self::stored_name(original_name, suffix);
        let path = self.dir(kind).join(&stored_name);

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            log::error!("Failed to write file {}: {}", path.display(), e);
            ServiceError::InternalError("Failed to save file".to_string())
        })?;

        log::info!("Stored {} as {}", original_name, path.display());
        Ok(StoredFile {
            path: path.to_string_lossy().to_string(),
            stored_name,
        })
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("File not found on disk: {}", path);
                Err(ServiceError::not_found("File not found on disk"))
            }
            Err(e) => {
                log::error!("Failed to read file {}: {}", path, e);
                Err(ServiceError::InternalError("Failed to read file".to_string()))
            }
        }
    }

    /// Best-effort removal; a missing or locked file never fails the request.
    pub async fn remove(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to delete file {}: {}", path, e);
            }
        }
    }

    pub async fn remove_all<I>(&self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        for path in paths {
            self.remove(&path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileStore {
        let root = std::env::temp_dir().join(format!("taskhub-store-{}", Uuid::new_v4().simple()));
        FileStore::new(root.join("attachments"), root.join("images"))
    }

    #[test]
    fn extension_is_lowercased_and_required() {
        assert_eq!(file_extension("Report.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn image_allow_list_is_narrow() {
        assert!(allowed_file("avatar.webp", ALLOWED_IMAGE_EXTENSIONS));
        assert!(!allowed_file("avatar.pdf", ALLOWED_IMAGE_EXTENSIONS));
        assert!(allowed_file("brief.pdf", ALLOWED_FILE_EXTENSIONS));
        assert!(!allowed_file("run.sh", ALLOWED_FILE_EXTENSIONS));
    }

    #[test]
    fn mime_falls_back_to_octet_stream() {
        assert_eq!(mime_for("photo.JPG"), mime::IMAGE_JPEG);
        assert_eq!(mime_for("data.csv").to_string(), "text/csv");
        assert_eq!(mime_for("model.blend"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn stored_names_are_unique_and_keep_extension() {
        let a = FileStore::stored_name("notes.txt", "_idx_0");
        let b = FileStore::stored_name("notes.txt", "_idx_0");
        assert_ne!(a, b);
        assert!(a.ends_with("_idx_0.txt"));
        assert!(FileStore::stored_name("noext", "").ends_with(".bin"));
    }

    #[actix_web::test]
    async fn save_read_and_remove() {
        let store = temp_store();
        let stored = store
            .save(FileKind::Attachment, "hello.txt", "", b"hello world")
            .await
            .unwrap();

        assert_eq!(store.read(&stored.path).await.unwrap(), b"hello world");

        store.remove(&stored.path).await;
        let err = store.read(&stored.path).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // removing twice is harmless
        store.remove(&stored.path).await;
    }

    #[test]
    fn download_response_sets_headers() {
        let resp = download_response(b"x".to_vec(), "my \"file\".pdf");
        let disposition = resp.headers().get("Content-Disposition").unwrap().to_str().unwrap();
        assert_eq!(disposition, "attachment; filename=\"my _file_.pdf\"");
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, "application/pdf");
    }
}
