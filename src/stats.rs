//! # Estadísticas Compartidas entre Procesos
//! src/stats.rs
//!
//! El registro de estadísticas vive en una región de memoria anónima
//! mapeada con `MAP_SHARED` por el master *antes* del fork, de modo que
//! el master y todos los workers ven el mismo registro. La exclusión
//! mutua la da un único `pthread_mutex_t` embebido en el registro e
//! inicializado con el atributo `PTHREAD_PROCESS_SHARED`.
//!
//! Todas las secciones críticas son actualizaciones escalares O(1) y
//! nunca se anidan con ningún otro lock del sistema.

use std::io;
use std::mem;
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Registro de estadísticas en memoria compartida
#[repr(C)]
struct SharedStatsData {
    total_requests: u64,
    bytes_sent: u64,

    // Contadores por código HTTP
    http_200_count: u64,
    http_404_count: u64,
    http_500_count: u64, // clase 5xx

    // Gauge de conexiones activas (nunca negativo)
    active_connections: u64,

    // Tiempo de respuesta acumulado y cantidad de muestras
    total_response_time_ms: u64,
    response_count: u64,

    // Snapshot del acumulador para el promedio "desde el último scrape"
    snap_response_time_ms: u64,
    snap_response_count: u64,

    // Datos de arranque consumidos por /health
    start_epoch: u64,
    num_workers: u32,

    mutex: libc::pthread_mutex_t,
}

/// Snapshot consistente de todos los campos (tomado bajo el mutex)
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub bytes_sent: u64,
    pub http_200_count: u64,
    pub http_404_count: u64,
    pub http_500_count: u64,
    pub active_connections: u64,
    pub total_response_time_ms: u64,
    pub response_count: u64,
    pub num_workers: u32,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Promedio global de tiempo de respuesta en milisegundos
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.response_count == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.response_count as f64
        }
    }
}

/// Handle hacia el registro compartido
///
/// Es un puntero a la región mapeada: copiarlo entre threads o heredarlo
/// por fork siempre refiere al mismo registro físico.
#[derive(Clone, Copy)]
pub struct SharedStats {
    data: *mut SharedStatsData,
}

// El acceso al registro siempre pasa por el mutex process-shared
unsafe impl Send for SharedStats {}
unsafe impl Sync for SharedStats {}

impl SharedStats {
    /// Mapea e inicializa la región compartida (llamar antes del fork)
    pub fn create(num_workers: u32) -> io::Result<Self> {
        let size = mem::size_of::<SharedStatsData>();

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let data = ptr as *mut SharedStatsData;

        unsafe {
            ptr::write_bytes(data, 0, 1);

            (*data).start_epoch = now_epoch();
            (*data).num_workers = num_workers;

            // Mutex compartido entre procesos
            let mut attr: libc::pthread_mutexattr_t = mem::zeroed();
            if libc::pthread_mutexattr_init(&mut attr) != 0 {
                libc::munmap(ptr, size);
                return Err(io::Error::last_os_error());
            }
            libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);

            if libc::pthread_mutex_init(&mut (*data).mutex, &attr) != 0 {
                let err = io::Error::last_os_error();
                libc::pthread_mutexattr_destroy(&mut attr);
                libc::munmap(ptr, size);
                return Err(err);
            }
            libc::pthread_mutexattr_destroy(&mut attr);
        }

        Ok(Self { data })
    }

    fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(&mut (*self.data).mutex);
        }
    }

    fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(&mut (*self.data).mutex);
        }
    }

    /// Registra una respuesta enviada: totales + contador del código
    ///
    /// Los contadores por código cubren 200, 404 y la clase 5xx; otros
    /// códigos (400, 403, 501) solo incrementan totales y bytes.
    pub fn record_response(&self, bytes: usize, code: u16) {
        self.lock();
        unsafe {
            (*self.data).total_requests += 1;
            (*self.data).bytes_sent += bytes as u64;

            if code == 200 {
                (*self.data).http_200_count += 1;
            } else if code == 404 {
                (*self.data).http_404_count += 1;
            } else if code >= 500 {
                (*self.data).http_500_count += 1;
            }
        }
        self.unlock();
    }

    /// Incrementa el gauge de conexiones activas
    pub fn increment_active(&self) {
        self.lock();
        unsafe {
            (*self.data).active_connections += 1;
        }
        self.unlock();
    }

    /// Decrementa el gauge, saturando en cero
    pub fn decrement_active(&self) {
        self.lock();
        unsafe {
            if (*self.data).active_connections > 0 {
                (*self.data).active_connections -= 1;
            }
        }
        self.unlock();
    }

    /// Acumula el tiempo de respuesta de un request
    pub fn add_response_time(&self, time_ms: u64) {
        self.lock();
        unsafe {
            (*self.data).total_response_time_ms += time_ms;
            (*self.data).response_count += 1;
        }
        self.unlock();
    }

    /// Toma un snapshot consistente de todos los campos
    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock();
        let snap = unsafe { self.read_snapshot() };
        self.unlock();
        snap
    }

    /// Snapshot + promedio "desde el último scrape"
    ///
    /// Lee el acumulador, copia los valores actuales en los campos de
    /// snapshot y retorna el promedio del delta, todo bajo una única
    /// adquisición del mutex.
    pub fn scrape(&self) -> (StatsSnapshot, f64) {
        self.lock();

        let snap = unsafe { self.read_snapshot() };

        let delta_avg = unsafe {
            let delta_time =
                (*self.data).total_response_time_ms - (*self.data).snap_response_time_ms;
            let delta_count = (*self.data).response_count - (*self.data).snap_response_count;

            (*self.data).snap_response_time_ms = (*self.data).total_response_time_ms;
            (*self.data).snap_response_count = (*self.data).response_count;

            if delta_count == 0 {
                0.0
            } else {
                delta_time as f64 / delta_count as f64
            }
        };

        self.unlock();
        (snap, delta_avg)
    }

    /// Imprime un resumen global (lo usa el master cada 30 segundos)
    pub fn print_summary(&self) {
        let snap = self.snapshot();

        println!("=== ESTADISTICAS GLOBALES ===");
        println!("Requests totales:     {}", snap.total_requests);
        println!("Bytes enviados:       {}", snap.bytes_sent);
        println!("Respuestas 200:       {}", snap.http_200_count);
        println!("Respuestas 404:       {}", snap.http_404_count);
        println!("Respuestas 5xx:       {}", snap.http_500_count);
        println!("Conexiones activas:   {}", snap.active_connections);
        if snap.response_count > 0 {
            println!(
                "Tiempo de respuesta:  {:.2} ms (promedio)",
                snap.avg_response_time_ms()
            );
        } else {
            println!("Tiempo de respuesta:  N/A");
        }
        println!("=============================");
    }

    /// Destruye el mutex y desmapea la región (solo el master)
    pub fn destroy(self) {
        unsafe {
            libc::pthread_mutex_destroy(&mut (*self.data).mutex);
            libc::munmap(self.data as *mut libc::c_void, mem::size_of::<SharedStatsData>());
        }
    }

    // Debe llamarse con el mutex tomado
    unsafe fn read_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: (*self.data).total_requests,
            bytes_sent: (*self.data).bytes_sent,
            http_200_count: (*self.data).http_200_count,
            http_404_count: (*self.data).http_404_count,
            http_500_count: (*self.data).http_500_count,
            active_connections: (*self.data).active_connections,
            total_response_time_ms: (*self.data).total_response_time_ms,
            response_count: (*self.data).response_count,
            num_workers: (*self.data).num_workers,
            uptime_secs: now_epoch().saturating_sub((*self.data).start_epoch),
        }
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
