pub mod date_format;
pub mod errors;
pub mod multipart;
pub mod validation;
