//! # Configuración del Servidor
//! src/config.rs
//!
//! La configuración se carga desde un archivo de líneas `KEY=VALUE`.
//! Las líneas que empiezan con `#` y las vacías se ignoran; se recorta
//! el whitespace alrededor de claves y valores. El binario recibe la
//! ruta del archivo como único argumento posicional opcional.
//!
//! ## Ejemplo de archivo
//!
//! ```text
//! # server.conf
//! PORT=8080
//! DOCUMENT_ROOT=/var/www/html
//! NUM_WORKERS=4
//! THREADS_PER_WORKER=10
//! TIMEOUT_SECONDS=30
//! CACHE_SIZE_MB=10
//! ```

use clap::Parser;
use std::fs;
use std::path::Path;

/// Argumentos de línea de comandos
#[derive(Debug, Parser)]
#[command(name = "prefork_server")]
#[command(about = "Servidor HTTP/1.1 de archivos estáticos con arquitectura prefork")]
#[command(version)]
pub struct Cli {
    /// Ruta del archivo de configuración
    #[arg(default_value = "server.conf")]
    pub config_file: String,
}

/// Configuración del servidor
#[derive(Debug, Clone)]
pub struct Config {
    /// Puerto TCP de escucha
    pub port: u16,

    /// Prefijo del filesystem para los targets
    pub document_root: String,

    /// Cantidad de procesos worker
    pub num_workers: usize,

    /// Tamaño del thread pool de cada worker
    pub threads_per_worker: usize,

    /// Timeout de recv/send por conexión, en segundos
    pub timeout_seconds: u64,

    /// Capacidad del caché por worker en MiB (0 lo deshabilita)
    pub cache_size_mb: usize,
}

impl Config {
    /// Carga la configuración desde un archivo `KEY=VALUE`
    ///
    /// Si el archivo no existe se advierte y se continúa con los
    /// valores por defecto. Claves desconocidas se ignoran.
    pub fn load(path: &str) -> Self {
        let mut config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                eprintln!(
                    "[!] No se pudo abrir la configuración '{}', usando valores por defecto",
                    path
                );
                return config;
            }
        };

        for line in contents.lines() {
            let line = line.trim();

            // Saltar comentarios y líneas vacías
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => continue,
            };

            match key {
                "PORT" => {
                    if let Ok(v) = value.parse() {
                        config.port = v;
                    }
                }
                "DOCUMENT_ROOT" => config.document_root = value.to_string(),
                "NUM_WORKERS" => {
                    if let Ok(v) = value.parse() {
                        config.num_workers = v;
                    }
                }
                "THREADS_PER_WORKER" => {
                    if let Ok(v) = value.parse() {
                        config.threads_per_worker = v;
                    }
                }
                "TIMEOUT_SECONDS" => {
                    if let Ok(v) = value.parse() {
                        config.timeout_seconds = v;
                    }
                }
                "CACHE_SIZE_MB" => {
                    if let Ok(v) = value.parse() {
                        config.cache_size_mb = v;
                    }
                }
                _ => {}
            }
        }

        config
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("PORT must be >= 1".to_string());
        }
        if self.num_workers == 0 {
            return Err("NUM_WORKERS must be >= 1".to_string());
        }
        if self.threads_per_worker == 0 {
            return Err("THREADS_PER_WORKER must be >= 1".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("TIMEOUT_SECONDS must be >= 1".to_string());
        }
        if !Path::new(&self.document_root).is_absolute() {
            return Err("DOCUMENT_ROOT must be an absolute path".to_string());
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════╗");
        println!("║       Prefork HTTP Server - Config         ║");
        println!("╚════════════════════════════════════════════╝");
        println!();
        println!("🌐 Red:");
        println!("   Puerto:          {}", self.port);
        println!("   Document root:   {}", self.document_root);
        println!();
        println!("👷 Concurrencia:");
        println!("   Workers:         {}", self.num_workers);
        println!("   Threads/worker:  {}", self.threads_per_worker);
        println!("   Timeout:         {} s", self.timeout_seconds);
        println!();
        if self.cache_size_mb > 0 {
            println!("💾 Caché:           {} MB por worker", self.cache_size_mb);
        } else {
            println!("💾 Caché:           deshabilitado");
        }
        println!();
        println!("══════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            document_root: "/var/www/html".to_string(),
            num_workers: 4,
            threads_per_worker: 10,
            timeout_seconds: 30,
            cache_size_mb: 10,
        }
    }
}
