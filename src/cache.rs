//! # Caché LRU de Archivos
//! src/cache.rs
//!
//! Caché en memoria por worker, indexado por ruta absoluta y acotado en
//! bytes. Las entradas se mantienen en orden de recencia (índice 0 =
//! más recientemente usada) y la evicción remueve desde la cola de la
//! lista. Un `RwLock` protege la estructura: los lookups toman el lock
//! de escritura porque promueven la entrada a MRU.

use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Tamaño máximo de un archivo cacheable: 1 MiB
pub const MAX_CACHEABLE_BYTES: usize = 1024 * 1024;

/// Longitud máxima de una ruta usada como clave
pub const MAX_PATH_LEN: usize = 512;

struct CacheEntry {
    path: String,
    content: Arc<Vec<u8>>,
    last_access: Instant,
}

struct CacheInner {
    /// Entradas en orden de recencia: [0] es MRU, la última es LRU
    entries: Vec<CacheEntry>,
    total_bytes: usize,
}

/// Caché LRU de contenidos de archivo (uno por worker)
pub struct FileCache {
    inner: RwLock<CacheInner>,
    max_bytes: usize,
}

impl FileCache {
    /// Crea el caché con capacidad en MiB
    ///
    /// Con `max_size_mb == 0` el caché queda deshabilitado: todo lookup
    /// falla y toda inserción se rechaza.
    pub fn new(max_size_mb: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: Vec::new(),
                total_bytes: 0,
            }),
            max_bytes: max_size_mb * 1024 * 1024,
        }
    }

    /// Busca una entrada por ruta
    ///
    /// En hit promueve la entrada a MRU y retorna el buffer compartido.
    /// El caller no debe retener la referencia más allá del request en
    /// curso ni mutar el contenido (el `Arc` lo garantiza).
    pub fn get(&self, path: &str) -> Option<Arc<Vec<u8>>> {
        // Lock de escritura: el hit muta la lista de recencia
        let mut inner = self.inner.write().unwrap();

        let pos = inner.entries.iter().position(|e| e.path == path)?;

        let mut entry = inner.entries.remove(pos);
        entry.last_access = Instant::now();
        let content = Arc::clone(&entry.content);
        inner.entries.insert(0, entry);

        Some(content)
    }

    /// Inserta o reemplaza una entrada
    ///
    /// Rechaza contenidos mayores a 1 MiB, mayores a la capacidad total
    /// o con claves más largas que `MAX_PATH_LEN`. Retorna `true` si el
    /// contenido quedó cacheado.
    pub fn put(&self, path: &str, content: &[u8]) -> bool {
        if content.is_empty() || content.len() > MAX_CACHEABLE_BYTES {
            return false;
        }
        if self.max_bytes == 0 || content.len() > self.max_bytes {
            return false;
        }
        if path.len() > MAX_PATH_LEN {
            return false;
        }

        let mut inner = self.inner.write().unwrap();

        // Clave existente: reemplazar el buffer y promover a MRU
        if let Some(pos) = inner.entries.iter().position(|e| e.path == path) {
            let mut entry = inner.entries.remove(pos);
            inner.total_bytes -= entry.content.len();
            inner.total_bytes += content.len();
            entry.content = Arc::new(content.to_vec());
            entry.last_access = Instant::now();
            inner.entries.insert(0, entry);
            return true;
        }

        // Evictar desde la cola (LRU) hasta que el nuevo contenido quepa
        while inner.total_bytes + content.len() > self.max_bytes {
            match inner.entries.pop() {
                Some(evicted) => {
                    inner.total_bytes -= evicted.content.len();
                }
                None => break,
            }
        }

        inner.entries.insert(
            0,
            CacheEntry {
                path: path.to_string(),
                content: Arc::new(content.to_vec()),
                last_access: Instant::now(),
            },
        );
        inner.total_bytes += content.len();

        true
    }

    /// Estadísticas del caché: (cantidad de entradas, bytes totales)
    pub fn stats(&self) -> (usize, usize) {
        let inner = self.inner.read().unwrap();
        (inner.entries.len(), inner.total_bytes)
    }

    /// Capacidad máxima en bytes
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}
