use std::collections::HashMap;

use actix_multipart::Multipart;
use futures_util::TryStreamExt;

use crate::utils::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A fully buffered multipart body: text fields by name plus the uploaded files.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require_field(&self, name: &str) -> Result<&str, ServiceError> {
        self.field(name)
            .ok_or_else(|| ServiceError::validation(format!("Missing form field '{}'", name)))
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file_name.as_str()).collect()
    }

    /// The one file a single-upload endpoint expects.
    pub fn single_file(mut self) -> Result<UploadedFile, ServiceError> {
        if self.files.is_empty() {
            return Err(ServiceError::validation("No selected file"));
        }
        Ok(self.files.swap_remove(0))
    }

    /// Parses a JSON text field into `T`.
    pub fn json_field<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ServiceError> {
        let raw = self.require_field(name)?;
        serde_json::from_str(raw)
            .map_err(|e| ServiceError::validation(format!("Invalid JSON in '{}': {}", name, e)))
    }
}

/// Buffers the whole multipart payload, collecting parts named `file_field`
/// as files. The combined size of all parts is capped at `max_bytes`.
pub async fn read_multipart(
    mut payload: Multipart,
    file_field: &str,
    max_bytes: usize,
) -> Result<MultipartForm, ServiceError> {
    let mut form = MultipartForm::default();
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("Multipart error: {}", e);
        ServiceError::validation("Invalid multipart data")
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("File chunk error: {}", e);
            ServiceError::validation("Error reading file data")
        })? {
            total += chunk.len();
            // Check size during upload to prevent memory issues
            if total > max_bytes {
                return Err(ServiceError::validation(format!(
                    "Upload exceeds {}MB limit",
                    max_bytes / (1024 * 1024)
                )));
            }
            data.extend_from_slice(&chunk);
        }

        match file_name {
            Some(file_name) if name == file_field => {
                if file_name.is_empty() {
                    continue;
                }
                log::info!("Received file: {} ({} bytes)", file_name, data.len());
                form.files.push(UploadedFile { file_name, bytes: data });
            }
            Some(file_name) => {
                log::warn!("Ignoring unexpected file part '{}' ({})", name, file_name);
            }
            None => {
                let value = String::from_utf8(data)
                    .map_err(|_| ServiceError::validation(format!("Field '{}' is not valid UTF-8", name)))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::SendMessageBody;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, web, App, HttpResponse};

    const BOUNDARY: &str = "taskhub-boundary";

    fn multipart_body(file_name: &str, content: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = file_name,
            c = content
        )
    }

    async fn upload_capped(payload: Multipart) -> Result<HttpResponse, ServiceError> {
        let form = read_multipart(payload, "file", 16).await?;
        Ok(HttpResponse::Ok().json(form.file_names()))
    }

    fn upload_request(body: String) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/upload")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    fn form_with(fields: &[(&str, &str)], files: &[&str]) -> MultipartForm {
        MultipartForm {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            files: files
                .iter()
                .map(|name| UploadedFile { file_name: name.to_string(), bytes: vec![1, 2, 3] })
                .collect(),
        }
    }

    #[::core::prelude::v1::test]
    fn json_field_parses_message_body() {
        let form = form_with(
            &[("messageBody", r#"{"receiverId": 7, "title": "Hello", "description": "World"}"#)],
            &[],
        );
        let body: SendMessageBody = form.json_field("messageBody").unwrap();
        assert_eq!(body.receiver_id, 7);
        assert_eq!(body.title, "Hello");
    }

    #[::core::prelude::v1::test]
    fn missing_field_is_a_validation_error() {
        let form = form_with(&[], &[]);
        let err = form.json_field::<SendMessageBody>("messageBody").unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(msg) if msg.contains("messageBody")));
    }

    #[::core::prelude::v1::test]
    fn single_file_requires_a_file() {
        assert!(form_with(&[], &[]).single_file().is_err());
        let file = form_with(&[], &["a.png"]).single_file().unwrap();
        assert_eq!(file.file_name, "a.png");
    }

    #[::core::prelude::v1::test]
    fn file_names_follow_upload_order() {
        let form = form_with(&[], &["a.txt", "b.pdf"]);
        assert_eq!(form.file_names(), vec!["a.txt", "b.pdf"]);
    }

    #[actix_web::test]
    async fn upload_within_cap_is_collected() {
        let app = test::init_service(App::new().route("/upload", web::post().to(upload_capped))).await;

        let resp = test::call_service(&app, upload_request(multipart_body("notes.txt", "hello")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let names: Vec<String> = test::read_body_json(resp).await;
        assert_eq!(names, vec!["notes.txt".to_string()]);
    }

    #[actix_web::test]
    async fn upload_over_cap_is_rejected() {
        let app = test::init_service(App::new().route("/upload", web::post().to(upload_capped))).await;

        let resp = test::call_service(&app, upload_request(multipart_body("notes.txt", &"x".repeat(64))).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["type"], "Validation Error");
        assert!(body["message"].as_str().unwrap().starts_with("Upload exceeds"));
    }
}
