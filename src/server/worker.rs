//! # Runtime del Worker
//! src/server/worker.rs
//!
//! Cada worker es un subproceso forkeado por el master que hereda el
//! socket de escucha. Internamente corre un loop productor (accept →
//! fast path de observabilidad o encolado no bloqueante) y un pool fijo
//! de threads consumidores que desencolan y atienden las conexiones.

use crate::cache::FileCache;
use crate::config::Config;
use crate::http::Method;
use crate::queue::ConnectionQueue;
use crate::server::{endpoints, handler};
use crate::stats::SharedStats;
use crate::sys;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timeout acotado aplicado antes del peek del fast path
///
/// Evita que un cliente lento bloquee el accept loop indefinidamente;
/// los threads del pool re-aplican el timeout configurado al desencolar.
const PEEK_TIMEOUT_SECS: u64 = 5;

/// Bytes examinados (sin consumir) para detectar endpoints prioritarios
const PEEK_BUF_SIZE: usize = 512;

/// Pool fijo de threads consumidores de la cola
pub struct ThreadPool {
    handles: Vec<JoinHandle<()>>,
    active: Arc<Mutex<usize>>,
}

impl ThreadPool {
    /// Crea el pool y lanza los threads consumidores
    pub fn spawn(
        size: usize,
        worker_id: usize,
        queue: Arc<ConnectionQueue>,
        config: Arc<Config>,
        cache: Option<Arc<FileCache>>,
        stats: SharedStats,
    ) -> Self {
        // Contador local de threads activos, con su propio mutex
        // (no participa de la sincronización en memoria compartida)
        let active = Arc::new(Mutex::new(0usize));
        let mut handles = Vec::with_capacity(size);

        for thread_id in 0..size {
            let queue = Arc::clone(&queue);
            let config = Arc::clone(&config);
            let cache = cache.clone();
            let active = Arc::clone(&active);

            let handle = thread::Builder::new()
                .name(format!("worker-{}-thread-{}", worker_id, thread_id))
                .spawn(move || {
                    {
                        let mut count = active.lock().unwrap();
                        *count += 1;
                    }

                    // Consumidor: desencolar hasta que la cola señale shutdown
                    while let Some(stream) = queue.dequeue() {
                        let timeout = Duration::from_secs(config.timeout_seconds);
                        let _ = stream.set_read_timeout(Some(timeout));
                        let _ = stream.set_write_timeout(Some(timeout));

                        handler::handle_connection(stream, &config, cache.as_deref(), &stats);
                    }

                    {
                        let mut count = active.lock().unwrap();
                        *count -= 1;
                    }
                })
                .expect("failed to spawn pool thread");

            handles.push(handle);
        }

        Self { handles, active }
    }

    /// Cantidad de threads actualmente vivos en el pool
    pub fn active_threads(&self) -> usize {
        *self.active.lock().unwrap()
    }

    /// Espera a que todos los threads terminen
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Extrae método y target de la primera línea de un request
///
/// Exige que el token de versión esté presente: así un peek que cortó
/// el target a la mitad (ej. `GET /health` de `GET /healthcheck.html`)
/// no se confunde con un target completo. El query string se recorta
/// en el primer `?`.
fn parse_request_head(bytes: &[u8]) -> Option<(Method, String)> {
    let text = String::from_utf8_lossy(bytes);
    let mut parts = text.split_whitespace();

    let method = match parts.next() {
        Some("GET") => Method::GET,
        Some("HEAD") => Method::HEAD,
        _ => return None,
    };

    let target = parts.next()?;
    parts.next()?; // el target solo está completo si hay versión detrás

    let target = target.split('?').next().unwrap_or(target);
    Some((method, target.to_string()))
}

/// Verifica si los primeros bytes corresponden a un endpoint prioritario
///
/// El target parseado se compara de forma exacta (con su variante de
/// barra final); un archivo como `/healthcheck.html` va a la cola.
pub fn is_priority_request(peeked: &[u8]) -> bool {
    match parse_request_head(peeked) {
        Some((_, target)) => endpoints::is_observability_target(&target),
        None => false,
    }
}

/// Examina el request sin consumirlo (MSG_PEEK vía `TcpStream::peek`)
fn peek_is_priority(stream: &TcpStream) -> bool {
    // Pre-timeout acotado: un peer que no manda nada no puede colgar
    // el accept loop
    let _ = stream.set_read_timeout(Some(Duration::from_secs(PEEK_TIMEOUT_SECS)));

    let mut buf = [0u8; PEEK_BUF_SIZE];
    match stream.peek(&mut buf) {
        Ok(n) if n > 0 => is_priority_request(&buf[..n]),
        _ => false,
    }
}

/// Atiende un endpoint prioritario en línea, sin pasar por la cola
fn handle_priority(mut stream: TcpStream, stats: &SharedStats) {
    let mut buf = [0u8; PEEK_BUF_SIZE];
    let bytes_read = match stream.read(&mut buf) {
        Ok(n) if n > 0 => n,
        _ => return,
    };

    // Mismo parse que usó la detección sobre el peek
    let (method, target) = match parse_request_head(&buf[..bytes_read]) {
        Some(head) => head,
        None => return,
    };

    endpoints::respond(&mut stream, method, &target, stats, true);
    // El drop cierra la conexión
}

/// Resultado del despacho de una conexión aceptada
pub enum Dispatch {
    /// Atendida en línea por el fast path de observabilidad
    Priority,
    /// Encolada para el thread pool
    Enqueued,
    /// Rechazada con 503 (cola llena o en shutdown)
    Rejected,
}

/// Despacha una conexión recién aceptada
///
/// Los endpoints de observabilidad se atienden en línea sin pasar por
/// la cola, para que sigan respondiendo bajo sobrecarga; el resto se
/// encola sin bloquear y la saturación se convierte en 503.
pub fn dispatch_connection(
    stream: TcpStream,
    queue: &ConnectionQueue,
    stats: &SharedStats,
) -> Dispatch {
    if peek_is_priority(&stream) {
        handle_priority(stream, stats);
        return Dispatch::Priority;
    }

    match queue.try_enqueue(stream) {
        Ok(()) => Dispatch::Enqueued,
        Err(stream) => {
            handler::send_503(stream, stats);
            Dispatch::Rejected
        }
    }
}

/// Loop principal del proceso worker
///
/// Corre hasta recibir la señal de terminación; después apaga la cola,
/// espera a los threads del pool y reporta las estadísticas finales del
/// caché.
pub fn worker_process(
    listener: TcpListener,
    worker_id: usize,
    config: Arc<Config>,
    stats: SharedStats,
) {
    // Los workers atrapan la misma señal para salir del accept loop
    sys::install_shutdown_handler();

    println!(
        "[Worker {}] iniciado (PID: {}) con {} threads",
        worker_id,
        std::process::id(),
        config.threads_per_worker
    );

    // Caché de archivos por worker (si está habilitado)
    let cache = if config.cache_size_mb > 0 {
        println!(
            "[Worker {}] caché de archivos inicializado ({} MB)",
            worker_id, config.cache_size_mb
        );
        Some(Arc::new(FileCache::new(config.cache_size_mb)))
    } else {
        println!("[Worker {}] caché deshabilitado (CACHE_SIZE_MB=0)", worker_id);
        None
    };

    let queue = Arc::new(ConnectionQueue::new());

    let pool = ThreadPool::spawn(
        config.threads_per_worker,
        worker_id,
        Arc::clone(&queue),
        Arc::clone(&config),
        cache.clone(),
        stats,
    );

    println!(
        "[Worker {}] pool listo, cola acotada de {} slots",
        worker_id,
        queue.capacity()
    );

    let mut total_accepted: u64 = 0;
    let mut total_rejected: u64 = 0;
    let mut priority_handled: u64 = 0;

    // Productor: aceptar conexiones y encolarlas
    while !sys::shutdown_requested() {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("[Worker {}] error en accept: {}", worker_id, e);
                continue;
            }
        };

        total_accepted += 1;

        match dispatch_connection(stream, &queue, &stats) {
            Dispatch::Priority => priority_handled += 1,
            Dispatch::Enqueued => {}
            Dispatch::Rejected => {
                total_rejected += 1;

                // Throttle: un log cada 100 rechazos
                if total_rejected % 100 == 1 {
                    eprintln!(
                        "[Worker {}] cola llena, {} conexiones rechazadas hasta ahora",
                        worker_id, total_rejected
                    );
                }
            }
        }
    }

    // Shutdown gracioso: no se despachan conexiones nuevas, las que
    // están en vuelo se completan
    println!(
        "[Worker {}] apagando (aceptadas: {}, prioritarias: {}, rechazadas: {})",
        worker_id, total_accepted, priority_handled, total_rejected
    );

    queue.shutdown();
    pool.join();

    if let Some(cache) = &cache {
        let (entries, bytes) = cache.stats();
        println!(
            "[Worker {}] caché final: {} entradas, {} bytes",
            worker_id, entries, bytes
        );
    }

    println!("[Worker {}] terminado (todos los threads salieron)", worker_id);
}
