//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Arquitectura prefork: el master forkea N workers que comparten el
//! socket de escucha; cada worker corre un accept loop productor y un
//! pool fijo de threads consumidores unidos por la cola acotada.

pub mod endpoints;
pub mod handler;
pub mod master;
pub mod worker;

// Re-exportar para facilitar el uso
pub use master::Master;
