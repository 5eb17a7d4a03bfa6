//! Tests de integración del servidor de archivos
//! tests/integration_test.rs
//!
//! Levanta el pipeline real del worker dentro del proceso de test:
//! accept loop productor, cola acotada, thread pool consumidor, caché y
//! estadísticas compartidas. Solo queda afuera el fork del master.

use prefork_server::cache::FileCache;
use prefork_server::config::Config;
use prefork_server::queue::ConnectionQueue;
use prefork_server::server::worker::{dispatch_connection, ThreadPool};
use prefork_server::stats::SharedStats;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Servidor de prueba: el runtime completo de un worker, sin fork
struct TestServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    pool: Option<ThreadPool>,
    queue: Arc<ConnectionQueue>,
    stats: SharedStats,
    root: PathBuf,
}

impl TestServer {
    /// Levanta el servidor sobre un puerto efímero
    ///
    /// `threads = 0` deja la cola sin consumidores (para los tests de
    /// saturación); `queue_capacity` permite colas chicas.
    fn start(tag: &str, cache_mb: usize, threads: usize, queue_capacity: usize) -> Self {
        let mut root = std::env::temp_dir();
        root.push(format!("prefork-it-{}-{}", std::process::id(), tag));
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), b"hello").unwrap();

        let mut config = Config::default();
        config.document_root = root.to_str().unwrap().to_string();
        config.timeout_seconds = 5;
        config.cache_size_mb = cache_mb;
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stats = SharedStats::create(1).unwrap();
        let queue = Arc::new(ConnectionQueue::with_capacity(queue_capacity));

        let cache = if cache_mb > 0 {
            Some(Arc::new(FileCache::new(cache_mb)))
        } else {
            None
        };

        let pool = ThreadPool::spawn(threads, 0, Arc::clone(&queue), config, cache, stats);

        let stop = Arc::new(AtomicBool::new(false));

        // Productor: el mismo despacho que usa el accept loop del worker
        let producer = thread::spawn({
            let stop = Arc::clone(&stop);
            let queue = Arc::clone(&queue);
            move || {
                for incoming in listener.incoming() {
                    let stream = match incoming {
                        Ok(s) => s,
                        Err(_) => continue,
                    };

                    if stop.load(Ordering::SeqCst) {
                        break;
                    }

                    dispatch_connection(stream, &queue, &stats);
                }
            }
        });

        Self {
            addr,
            stop,
            producer: Some(producer),
            pool: Some(pool),
            queue,
            stats,
            root,
        }
    }

    fn snapshot(&self) -> prefork_server::stats::StatsSnapshot {
        self.stats.snapshot()
    }

    /// Envía un request crudo y retorna la respuesta completa
    fn request(&self, raw: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn get(&self, path: &str) -> String {
        self.request(&format!("GET {} HTTP/1.1\r\n\r\n", path))
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Desbloquear el accept con una conexión dummy
        let _ = TcpStream::connect(self.addr);

        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }

        self.queue.shutdown();
        if let Some(pool) = self.pool.take() {
            pool.join();
        }

        fs::remove_dir_all(&self.root).ok();
    }
}

/// Helper: extrae el body de una respuesta HTTP
fn extract_body(response: &str) -> &str {
    match response.find("\r\n\r\n") {
        Some(pos) => &response[pos + 4..],
        None => "",
    }
}

#[test]
fn test_get_existing_file_then_cache_hit() {
    let server = TestServer::start("cache-hit", 8, 4, 100);

    let first = server.get("/");
    assert!(first.contains("200 OK"), "got: {}", first);
    assert!(first.contains("Content-Length: 5"));
    assert!(first.contains("X-Cache: MISS"));
    assert_eq!(extract_body(&first), "hello");

    let second = server.get("/");
    assert!(second.contains("200 OK"));
    assert!(second.contains("X-Cache: HIT"));
    assert_eq!(extract_body(&second), "hello");

    server.stop();
}

#[test]
fn test_get_absent_file_yields_404() {
    let server = TestServer::start("absent", 0, 4, 100);

    let response = server.get("/no-such");
    assert!(response.contains("404 Not Found"));
    assert!(extract_body(&response).starts_with("<h1>404"));

    server.stop();
}

#[test]
fn test_path_traversal_yields_403() {
    let server = TestServer::start("traversal", 0, 4, 100);

    let response = server.get("/../etc/passwd");
    assert!(response.contains("403 Forbidden"));
    assert!(extract_body(&response).starts_with("<h1>403"));

    server.stop();
}

#[test]
fn test_head_returns_headers_without_body() {
    let server = TestServer::start("head", 0, 4, 100);

    let get = server.get("/index.html");
    let head = server.request("HEAD /index.html HTTP/1.1\r\n\r\n");

    assert!(head.contains("200 OK"));
    assert!(head.contains("Content-Length: 5"));
    assert_eq!(extract_body(&head), "");

    // Mismos headers clave que el GET
    assert!(get.contains("Content-Length: 5"));
    assert!(get.contains("Content-Type: text/html"));
    assert!(head.contains("Content-Type: text/html"));

    server.stop();
}

#[test]
fn test_health_responds_while_queue_is_saturated() {
    // Sin consumidores: las conexiones encoladas nunca se drenan
    let server = TestServer::start("overload", 0, 0, 2);

    // Saturar la cola con requests normales que nadie va a atender
    let mut stuck = Vec::new();
    for _ in 0..2 {
        let mut client = TcpStream::connect(server.addr).unwrap();
        client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").unwrap();
        stuck.push(client);
    }

    // Esperar a que el productor las encole
    let mut waited = 0;
    while server.queue.len() < 2 && waited < 100 {
        thread::sleep(Duration::from_millis(20));
        waited += 1;
    }
    assert_eq!(server.queue.len(), 2);

    // La cola está llena: el siguiente request normal recibe 503
    let rejected = server.get("/index.html");
    assert!(rejected.contains("503 Service Unavailable"), "got: {}", rejected);
    assert!(rejected.contains("Retry-After: 1"));
    assert!(rejected.contains("Connection: close"));
    assert!(extract_body(&rejected).starts_with("<h1>503"));

    // El fast path sigue respondiendo aunque la cola esté saturada
    let health = server.get("/health");
    assert!(health.contains("200 OK"), "got: {}", health);
    assert!(health.contains("Content-Type: application/json"));
    let body = extract_body(&health);
    assert!(body.contains(r#""status":"healthy""#));
    assert!(body.contains(r#""uptime":"#));
    assert!(body.contains(r#""workers":"#));

    // El 503 quedó contabilizado en la clase 5xx
    assert!(server.snapshot().http_500_count >= 1);

    drop(stuck);
    server.stop();
}

#[test]
fn test_metrics_and_stats_endpoints() {
    let server = TestServer::start("observability", 0, 4, 100);

    // Generar algo de tráfico
    server.get("/index.html");
    server.get("/no-such");

    let metrics = server.get("/metrics");
    assert!(metrics.contains("200 OK"));
    assert!(metrics.contains("Content-Type: text/plain; version=0.0.4"));
    assert!(metrics.contains("X-Priority: high"));
    let body = extract_body(&metrics);
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("http_bytes_sent_total"));
    assert!(body.contains(r#"http_requests_by_code{code="200"} 1"#));
    assert!(body.contains(r#"http_requests_by_code{code="404"} 1"#));
    assert!(body.contains("http_active_connections"));
    assert!(body.contains("http_avg_response_time_ms"));

    let stats = server.get("/stats");
    assert!(stats.contains("200 OK"));
    assert!(stats.contains("Content-Type: application/json"));
    let body = extract_body(&stats);
    assert!(body.contains(r#""total_requests":"#));
    assert!(body.contains(r#""bytes_sent":"#));
    // La respuesta de /metrics también quedó contada como 200
    assert!(body.contains(r#""200":2"#));
    assert!(body.contains(r#""404":1"#));
    assert!(body.contains(r#""avg_response_time_ms":"#));

    server.stop();
}

#[test]
fn test_healthcheck_file_goes_through_the_queue() {
    // Un target que comparte prefijo con /health no debe tomar el fast
    // path: atraviesa la cola y se sirve como archivo estático
    let server = TestServer::start("healthcheck-file", 0, 4, 100);
    fs::write(server.root.join("healthcheck.html"), b"<p>ok</p>").unwrap();

    let response = server.get("/healthcheck.html");
    assert!(response.contains("200 OK"), "got: {}", response);
    assert!(response.contains("Content-Type: text/html"));
    assert!(response.contains("X-Cache: MISS")); // vino del handler, no del fast path
    assert_eq!(extract_body(&response), "<p>ok</p>");

    // Y la variante con barra final sí es observabilidad
    let health = server.get("/health/");
    assert!(health.contains("200 OK"));
    assert!(health.contains("Content-Type: application/json"));
    assert!(extract_body(&health).contains(r#""status":"healthy""#));

    server.stop();
}

#[test]
fn test_query_string_and_root_mapping() {
    let server = TestServer::start("normalize", 0, 4, 100);

    // "/" se reescribe a /index.html
    let root = server.get("/");
    assert!(root.contains("200 OK"));
    assert_eq!(extract_body(&root), "hello");

    // El query string se ignora
    let with_query = server.get("/index.html?version=2");
    assert!(with_query.contains("200 OK"));
    assert_eq!(extract_body(&with_query), "hello");

    server.stop();
}

#[test]
fn test_unsupported_method_and_bad_request() {
    let server = TestServer::start("errors", 0, 4, 100);

    let post = server.request("POST /index.html HTTP/1.1\r\n\r\n");
    assert!(post.contains("501 Not Implemented"));

    let garbage = server.request("not-http\r\n\r\n");
    assert!(garbage.contains("400 Bad Request"));

    server.stop();
}

#[test]
fn test_burst_of_concurrent_requests() {
    let server = TestServer::start("burst", 8, 8, 100);

    let mut clients = Vec::new();
    for _ in 0..30 {
        let addr = server.addr;
        clients.push(thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();
            stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        }));
    }

    let mut ok = 0;
    let mut unavailable = 0;
    for client in clients {
        let response = client.join().unwrap();
        if response.contains("200 OK") {
            ok += 1;
        } else if response.contains("503 Service Unavailable") {
            // Bajo ráfaga puede haber backpressure; debe venir bien formado
            assert!(response.contains("Retry-After: 1"));
            unavailable += 1;
        } else {
            panic!("unexpected response: {}", response);
        }
    }

    assert_eq!(ok + unavailable, 30);
    assert!(ok > 0);

    // El gauge vuelve a cero en tiempo acotado después de la ráfaga
    let mut waited = 0;
    while server.snapshot().active_connections > 0 && waited < 100 {
        thread::sleep(Duration::from_millis(20));
        waited += 1;
    }
    assert_eq!(server.snapshot().active_connections, 0);

    server.stop();
}
