//! # Prefork HTTP Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos implementado para demostrar
//! conceptos de sistemas operativos: procesos prefork, thread pools,
//! semáforos contadores, memoria compartida y transferencia zero-copy.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `config`: Carga y validación de la configuración `KEY=VALUE`
//! - `http`: Request line, respuestas, códigos de estado y MIME
//! - `sync`: Semáforo contador (Mutex + Condvar)
//! - `queue`: Cola acotada de conexiones (anillo + semáforos)
//! - `cache`: Caché LRU de archivos por worker
//! - `stats`: Estadísticas en memoria compartida entre procesos
//! - `sys`: Wrappers de syscalls (fork, señales, sendfile, sockets)
//! - `server`: Master prefork, workers, handler y endpoints
//!
//! ## Flujo de una conexión
//!
//! ```text
//! master ──fork──> worker ──accept──> ¿prioritaria? ──sí──> fast path
//!                                          │no
//!                                     try_enqueue ──llena──> 503
//!                                          │ok
//!                                     thread pool ──> handler ──> archivo
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod queue;
pub mod server;
pub mod stats;
pub mod sync;
pub mod sys;
