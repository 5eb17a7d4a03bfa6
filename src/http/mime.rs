//! # Resolución de Tipos MIME
//! src/http/mime.rs
//!
//! Mapea la extensión del archivo al `Content-Type` de la respuesta.

/// Resuelve el tipo MIME a partir de la extensión de la ruta
///
/// # Ejemplo
/// ```
/// use prefork_server::http::mime_type;
///
/// assert_eq!(mime_type("/var/www/html/index.html"), "text/html");
/// assert_eq!(mime_type("/data/logo.png"), "image/png");
/// assert_eq!(mime_type("/bin/blob"), "application/octet-stream");
/// ```
pub fn mime_type(path: &str) -> &'static str {
    let ext = match path.rsplit('.').next() {
        Some(e) if path.contains('.') => e,
        _ => return "application/octet-stream",
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
