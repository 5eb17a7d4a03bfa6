//! # Endpoints de Observabilidad
//! src/server/endpoints.rs
//!
//! Genera los cuerpos de `/health`, `/stats` (JSON) y `/metrics`
//! (formato de texto Prometheus). Cada respuesta toma un único snapshot
//! consistente del registro de estadísticas compartido.

use crate::http::{Method, Response, StatusCode};
use crate::stats::SharedStats;
use serde::Serialize;
use std::io::Write;
use std::net::TcpStream;

/// Cuerpo JSON de `/health`
#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    uptime: u64,
    workers: u32,
}

/// Cuerpo JSON de `/stats`
#[derive(Debug, Serialize)]
struct StatsBody {
    total_requests: u64,
    bytes_sent: u64,
    http_codes: HttpCodes,
    active_connections: u64,
    avg_response_time_ms: f64,
}

#[derive(Debug, Serialize)]
struct HttpCodes {
    #[serde(rename = "200")]
    ok: u64,
    #[serde(rename = "404")]
    not_found: u64,
    #[serde(rename = "500")]
    server_error: u64,
}

/// Genera el cuerpo JSON de `/health`
pub fn health_body(stats: &SharedStats) -> String {
    let snap = stats.snapshot();

    let body = HealthBody {
        status: "healthy",
        uptime: snap.uptime_secs,
        workers: snap.num_workers,
    };

    serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
}

/// Genera el cuerpo JSON de `/stats` (promedio global de latencia)
pub fn stats_body(stats: &SharedStats) -> String {
    let snap = stats.snapshot();

    let body = StatsBody {
        total_requests: snap.total_requests,
        bytes_sent: snap.bytes_sent,
        http_codes: HttpCodes {
            ok: snap.http_200_count,
            not_found: snap.http_404_count,
            server_error: snap.http_500_count,
        },
        active_connections: snap.active_connections,
        avg_response_time_ms: snap.avg_response_time_ms(),
    };

    serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
}

/// Genera el cuerpo de `/metrics` en formato de texto Prometheus
///
/// El gauge de latencia expone el promedio "desde el último scrape",
/// derivado del par de snapshot del registro compartido.
pub fn metrics_body(stats: &SharedStats) -> String {
    let (snap, delta_avg_ms) = stats.scrape();

    format!(
        "# HELP http_requests_total Total HTTP requests processed\n\
         # TYPE http_requests_total counter\n\
         http_requests_total {}\n\
         # HELP http_bytes_sent_total Total bytes sent to clients\n\
         # TYPE http_bytes_sent_total counter\n\
         http_bytes_sent_total {}\n\
         # HELP http_requests_by_code HTTP requests by status code\n\
         # TYPE http_requests_by_code counter\n\
         http_requests_by_code{{code=\"200\"}} {}\n\
         http_requests_by_code{{code=\"404\"}} {}\n\
         http_requests_by_code{{code=\"500\"}} {}\n\
         # HELP http_active_connections Connections currently being served\n\
         # TYPE http_active_connections gauge\n\
         http_active_connections {}\n\
         # HELP http_avg_response_time_ms Average response time since last scrape\n\
         # TYPE http_avg_response_time_ms gauge\n\
         http_avg_response_time_ms {:.2}\n",
        snap.total_requests,
        snap.bytes_sent,
        snap.http_200_count,
        snap.http_404_count,
        snap.http_500_count,
        snap.active_connections,
        delta_avg_ms,
    )
}

/// Verifica si el target es un endpoint de observabilidad
///
/// Acepta la variante con barra final (`/health/`).
pub fn is_observability_target(target: &str) -> bool {
    matches!(
        target,
        "/health" | "/health/" | "/metrics" | "/metrics/" | "/stats" | "/stats/"
    )
}

/// Responde un endpoint de observabilidad sobre el socket
///
/// Para HEAD se emiten solo los headers. Con `priority` en `true` (fast
/// path del accept loop) se agrega el header `X-Priority: high`.
/// Registra la respuesta en las estadísticas.
pub fn respond(
    stream: &mut TcpStream,
    method: Method,
    target: &str,
    stats: &SharedStats,
    priority: bool,
) {
    let (body, content_type) = match target {
        "/health" | "/health/" => (health_body(stats), "application/json"),
        "/stats" | "/stats/" => (stats_body(stats), "application/json"),
        "/metrics" | "/metrics/" => (metrics_body(stats), "text/plain; version=0.0.4"),
        _ => return,
    };

    let mut response = Response::new(StatusCode::Ok)
        .with_header("Content-Type", content_type)
        .with_header("Content-Length", &body.len().to_string());

    if priority {
        response = response.with_header("X-Priority", "high");
    }

    if method == Method::GET {
        response = response.with_body_bytes(body.clone().into_bytes());
    }

    let _ = stream.write_all(&response.to_bytes());
    stats.record_response(body.len(), 200);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::SharedStats;

    #[test]
    fn test_health_body_shape() {
        let stats = SharedStats::create(4).unwrap();
        let body = health_body(&stats);

        assert!(body.contains(r#""status":"healthy""#));
        assert!(body.contains(r#""workers":4"#));
        assert!(body.contains(r#""uptime":"#));
    }

    #[test]
    fn test_stats_body_shape() {
        let stats = SharedStats::create(2).unwrap();
        stats.record_response(100, 200);
        stats.record_response(22, 404);
        stats.add_response_time(10);

        let body = stats_body(&stats);

        assert!(body.contains(r#""total_requests":2"#));
        assert!(body.contains(r#""bytes_sent":122"#));
        assert!(body.contains(r#""200":1"#));
        assert!(body.contains(r#""404":1"#));
        assert!(body.contains(r#""500":0"#));
        assert!(body.contains(r#""active_connections":0"#));
        assert!(body.contains(r#""avg_response_time_ms":10.0"#));
    }

    #[test]
    fn test_metrics_body_families() {
        let stats = SharedStats::create(1).unwrap();
        stats.record_response(512, 200);
        stats.record_response(64, 503);

        let body = metrics_body(&stats);

        assert!(body.contains("http_requests_total 2"));
        assert!(body.contains("http_bytes_sent_total 576"));
        assert!(body.contains(r#"http_requests_by_code{code="200"} 1"#));
        assert!(body.contains(r#"http_requests_by_code{code="404"} 0"#));
        assert!(body.contains(r#"http_requests_by_code{code="500"} 1"#));
        assert!(body.contains("http_active_connections 0"));
        assert!(body.contains("http_avg_response_time_ms"));
        assert!(body.contains("# TYPE http_requests_total counter"));
        assert!(body.contains("# TYPE http_active_connections gauge"));
    }

    #[test]
    fn test_metrics_average_resets_between_scrapes() {
        let stats = SharedStats::create(1).unwrap();
        stats.add_response_time(40);

        let body1 = metrics_body(&stats);
        assert!(body1.contains("http_avg_response_time_ms 40.00"));

        // Sin muestras nuevas el promedio del delta vuelve a cero
        let body2 = metrics_body(&stats);
        assert!(body2.contains("http_avg_response_time_ms 0.00"));
    }

    #[test]
    fn test_is_observability_target() {
        assert!(is_observability_target("/health"));
        assert!(is_observability_target("/health/"));
        assert!(is_observability_target("/metrics"));
        assert!(is_observability_target("/stats/"));
        assert!(!is_observability_target("/index.html"));
        assert!(!is_observability_target("/healthcheck"));
    }
}
