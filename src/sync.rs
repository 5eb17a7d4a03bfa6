//! # Semáforo Contador
//! src/sync.rs
//!
//! Implementa un semáforo contador clásico sobre `Mutex` + `Condvar`.
//! Es la primitiva de sincronización que usa la cola de conexiones
//! acotada: `acquire` decrementa (bloqueando en cero), `release`
//! incrementa y despierta a un waiter.

use std::sync::{Condvar, Mutex};

/// Semáforo contador (no negativo)
///
/// # Ejemplo
/// ```
/// use prefork_server::sync::Semaphore;
///
/// let sem = Semaphore::new(2);
/// sem.acquire();
/// assert!(sem.try_acquire());
/// assert!(!sem.try_acquire()); // en cero: no bloquea, falla
/// sem.release();
/// ```
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Crea un semáforo con el valor inicial indicado
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Decrementa el contador, bloqueando mientras esté en cero
    pub fn acquire(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.available.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Intenta decrementar sin bloquear
    ///
    /// Retorna `true` si adquirió, `false` si el contador estaba en cero.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Incrementa el contador y despierta a un waiter
    pub fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.available.notify_one();
    }

    /// Valor actual del contador (solo para monitoreo y tests)
    pub fn value(&self) -> usize {
        *self.count.lock().unwrap()
    }
}
