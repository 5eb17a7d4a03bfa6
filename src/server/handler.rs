//! # Manejo de Conexiones
//! src/server/handler.rs
//!
//! Pipeline por request que ejecutan los threads del pool: una única
//! lectura de 8 KiB, parsing de la request line, normalización del
//! target y entrega del archivo (desde caché o disco). Cada camino de
//! salida cierra el socket exactamente una vez (por ownership) y
//! empareja el incremento del gauge de conexiones activas con su
//! decremento.

use crate::cache::{FileCache, MAX_CACHEABLE_BYTES};
use crate::config::Config;
use crate::http::{mime_type, Method, ParseError, Request, Response, StatusCode};
use crate::server::endpoints;
use crate::stats::SharedStats;
use crate::sys;
use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Instant;

/// Tamaño del buffer de lectura del request
pub const READ_BUF_SIZE: usize = 8192;

/// Maneja una conexión desencolada por un thread del pool
pub fn handle_connection(
    mut stream: TcpStream,
    config: &Config,
    cache: Option<&FileCache>,
    stats: &SharedStats,
) {
    stats.increment_active();
    let start = Instant::now();

    let mut buffer = [0u8; READ_BUF_SIZE];
    let bytes_read = match stream.read(&mut buffer) {
        Ok(0) | Err(_) => {
            // Cliente cerró o falló antes de mandar el request
            stats.decrement_active();
            return;
        }
        Ok(n) => n,
    };

    let request = match Request::parse(&buffer[..bytes_read]) {
        Ok(req) => req,
        Err(ParseError::UnsupportedMethod(_)) => {
            send_error(&mut stream, StatusCode::NotImplemented, stats);
            stats.decrement_active();
            return;
        }
        Err(_) => {
            send_error(&mut stream, StatusCode::BadRequest, stats);
            stats.decrement_active();
            return;
        }
    };

    // Endpoints de observabilidad atendidos también desde el pool
    // (cuando llegaron encolados en vez de por el fast path)
    if endpoints::is_observability_target(request.target()) {
        endpoints::respond(&mut stream, request.method(), request.target(), stats, false);
        stats.decrement_active();
        return;
    }

    // Normalización del target
    let rel_path = if request.target() == "/" {
        "/index.html".to_string()
    } else {
        // Recortar el query string en el primer '?'
        let without_query = match request.target().split_once('?') {
            Some((path, _)) => path,
            None => request.target(),
        };

        // Rechazar intentos de path traversal
        if without_query.contains("..") {
            send_error(&mut stream, StatusCode::Forbidden, stats);
            stats.decrement_active();
            return;
        }

        without_query.to_string()
    };

    let full_path = format!("{}{}", config.document_root, rel_path);

    deliver_file(&mut stream, &full_path, request.method(), cache, stats);

    // Cerrar el socket antes de contabilizar el tiempo de respuesta
    drop(stream);

    let elapsed_ms = start.elapsed().as_millis() as u64;
    stats.add_response_time(elapsed_ms);
    stats.decrement_active();
}

/// Entrega un archivo: caché primero, luego disco (sendfile)
fn deliver_file(
    stream: &mut TcpStream,
    full_path: &str,
    method: Method,
    cache: Option<&FileCache>,
    stats: &SharedStats,
) {
    // 1. Intentar el caché
    if let Some(cache) = cache {
        if let Some(content) = cache.get(full_path) {
            let mut response = Response::new(StatusCode::Ok)
                .with_header("Content-Type", mime_type(full_path))
                .with_header("Content-Length", &content.len().to_string())
                .with_header("X-Cache", "HIT");

            if method == Method::GET {
                response = response.with_body_bytes(content.as_ref().clone());
            }

            let _ = stream.write_all(&response.to_bytes());
            stats.record_response(content.len(), 200);
            return;
        }
    }

    // 2. Abrir el archivo
    let mut file = match File::open(full_path) {
        Ok(f) => f,
        Err(_) => {
            send_error(stream, StatusCode::NotFound, stats);
            return;
        }
    };

    let metadata = match file.metadata() {
        Ok(m) => m,
        Err(_) => {
            send_error(stream, StatusCode::InternalServerError, stats);
            return;
        }
    };

    if metadata.is_dir() {
        send_error(stream, StatusCode::Forbidden, stats);
        return;
    }

    let file_size = metadata.len();

    // 3. Archivo cacheable: leerlo completo, insertarlo y enviar el buffer
    if cache.is_some() && file_size > 0 && file_size <= MAX_CACHEABLE_BYTES as u64 {
        let mut content = Vec::with_capacity(file_size as usize);
        if file.read_to_end(&mut content).is_ok() && content.len() == file_size as usize {
            if let Some(cache) = cache {
                cache.put(full_path, &content);
            }

            let mut response = Response::new(StatusCode::Ok)
                .with_header("Content-Type", mime_type(full_path))
                .with_header("Content-Length", &content.len().to_string())
                .with_header("X-Cache", "MISS");

            if method == Method::GET {
                response = response.with_body_bytes(content);
            }

            let _ = stream.write_all(&response.to_bytes());
            stats.record_response(file_size as usize, 200);
            return;
        }
        // Lectura fallida: reabrir y caer al camino de sendfile
        file = match File::open(full_path) {
            Ok(f) => f,
            Err(_) => {
                send_error(stream, StatusCode::InternalServerError, stats);
                return;
            }
        };
    }

    // 4. Archivo grande o caché deshabilitado: headers + sendfile
    let response = Response::new(StatusCode::Ok)
        .with_header("Content-Type", mime_type(full_path))
        .with_header("Content-Length", &file_size.to_string())
        .with_header("X-Cache", "MISS");

    let _ = stream.write_all(&response.to_bytes());

    if method == Method::GET {
        // Copia archivo a socket en el kernel, con reintento en EINTR
        let _ = sys::sendfile_all(&file, stream, file_size);
    }

    stats.record_response(file_size as usize, 200);
}

/// Envía una respuesta de error HTML mínima y la registra
fn send_error(stream: &mut TcpStream, status: StatusCode, stats: &SharedStats) {
    let response = Response::html_error(status);
    let _ = stream.write_all(&response.to_bytes());
    stats.record_response(response.body().len(), status.as_u16());
}

/// Envía el 503 de backpressure cuando la cola está saturada
pub fn send_503(mut stream: TcpStream, stats: &SharedStats) {
    let response = Response::html_error(StatusCode::ServiceUnavailable)
        .with_header("Retry-After", "1");

    let _ = stream.write_all(&response.to_bytes());
    stats.record_response(response.body().len(), 503);
    // El drop cierra la conexión
}
