//! # Cola de Conexiones Acotada
//! src/queue.rs
//!
//! Cola productor/consumidor de capacidad fija para el hand-off de
//! conexiones aceptadas hacia los threads del pool. Sincronización con
//! la solución clásica de semáforos contadores para buffers acotados:
//! `empty` cuenta slots libres, `filled` cuenta slots ocupados y un
//! mutex serializa los índices del anillo.
//!
//! Disciplina de orden: se adquiere `empty`/`filled` *antes* del mutex
//! de índices y se libera en orden inverso. Es el único anidamiento de
//! locks permitido en todo el servidor.

use crate::sync::Semaphore;
use std::net::TcpStream;
use std::sync::Mutex;

/// Capacidad del anillo (constante de diseño, no configurable)
pub const QUEUE_CAPACITY: usize = 100;

struct Ring {
    slots: Vec<Option<TcpStream>>,
    head: usize,
    tail: usize,
    shutdown: bool,
}

/// Cola acotada de conexiones con semáforos
pub struct ConnectionQueue {
    empty: Semaphore,
    filled: Semaphore,
    ring: Mutex<Ring>,
    capacity: usize,
}

impl ConnectionQueue {
    /// Crea la cola con la capacidad de diseño (100)
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    /// Crea una cola con capacidad arbitraria (para tests)
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            // empty: inicialmente todos los slots están libres
            empty: Semaphore::new(capacity),
            // filled: inicialmente ningún slot está ocupado
            filled: Semaphore::new(0),
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                shutdown: false,
            }),
            capacity,
        }
    }

    /// Encola una conexión (productor, bloqueante)
    ///
    /// Bloquea hasta que haya un slot libre. Retorna la conexión en
    /// `Err` si la cola está en shutdown, para que el caller la cierre.
    pub fn enqueue(&self, conn: TcpStream) -> Result<(), TcpStream> {
        self.empty.acquire();

        let mut ring = self.ring.lock().unwrap();
        if ring.shutdown {
            drop(ring);
            // Devolver el slot que tomamos
            self.empty.release();
            return Err(conn);
        }

        let tail = ring.tail;
        ring.slots[tail] = Some(conn);
        ring.tail = (tail + 1) % self.capacity;
        drop(ring);

        self.filled.release();
        Ok(())
    }

    /// Intenta encolar sin bloquear (para responder 503)
    ///
    /// Retorna la conexión en `Err` si la cola está llena o en shutdown.
    pub fn try_enqueue(&self, conn: TcpStream) -> Result<(), TcpStream> {
        if !self.empty.try_acquire() {
            // Cola llena
            return Err(conn);
        }

        let mut ring = self.ring.lock().unwrap();
        if ring.shutdown {
            drop(ring);
            self.empty.release();
            return Err(conn);
        }

        let tail = ring.tail;
        ring.slots[tail] = Some(conn);
        ring.tail = (tail + 1) % self.capacity;
        drop(ring);

        self.filled.release();
        Ok(())
    }

    /// Desencola una conexión (consumidor, bloqueante)
    ///
    /// Bloquea hasta que haya una conexión disponible. Retorna `None`
    /// cuando la cola fue apagada, preservando el conteo de `filled`
    /// para que los demás consumidores también despierten.
    pub fn dequeue(&self) -> Option<TcpStream> {
        self.filled.acquire();

        let mut ring = self.ring.lock().unwrap();
        if ring.shutdown {
            drop(ring);
            // Mantener el conteo correcto para los otros waiters
            self.filled.release();
            return None;
        }

        let head = ring.head;
        let conn = ring.slots[head].take();
        ring.head = (head + 1) % self.capacity;
        drop(ring);

        self.empty.release();
        conn
    }

    /// Tamaño actual de la cola (consultivo, no serializado con
    /// enqueue/dequeue concurrentes)
    pub fn len(&self) -> usize {
        let ring = self.ring.lock().unwrap();
        (ring.tail + self.capacity - ring.head) % self.capacity
    }

    /// Verifica si la cola está vacía
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacidad de la cola
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Señala shutdown y despierta a todos los consumidores bloqueados
    ///
    /// Publica `capacity` releases sobre `filled`; la capacidad debe ser
    /// mayor o igual al tamaño del thread pool para garantizar que todos
    /// los consumidores despierten.
    pub fn shutdown(&self) {
        {
            let mut ring = self.ring.lock().unwrap();
            ring.shutdown = true;
        }

        for _ in 0..self.capacity {
            self.filled.release();
        }
    }
}

impl Default for ConnectionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionQueue {
    /// Cierra cualquier conexión que haya quedado en el anillo
    fn drop(&mut self) {
        let mut ring = self.ring.lock().unwrap();
        for slot in ring.slots.iter_mut() {
            // Drop del TcpStream cierra el socket
            slot.take();
        }
    }
}
