//! # Proceso Master
//! src/server/master.rs
//!
//! El master inicializa la región de estadísticas compartida, crea el
//! socket de escucha y forkea el fleet de workers, que heredan ambos.
//! Después queda en un tick de un segundo: reporta estadísticas cada 30
//! ticks y hace reaping oportunista de hijos. Ante la señal de
//! terminación apaga el fleet y libera los recursos compartidos.

use crate::config::Config;
use crate::server::worker;
use crate::stats::SharedStats;
use crate::sys::{self, Fork};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Ticks entre reportes de estadísticas globales
const SUMMARY_INTERVAL_TICKS: u32 = 30;

/// Supervisor del fleet de workers
pub struct Master {
    config: Arc<Config>,
}

impl Master {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Corre el servidor hasta la señal de terminación
    ///
    /// Los errores de inicialización (socket, memoria compartida) son
    /// fatales y se propagan; el caller decide el código de salida.
    pub fn run(&self) -> io::Result<()> {
        // La región compartida se mapea antes del fork para que todos
        // los workers vean el mismo registro
        let stats = SharedStats::create(self.config.num_workers as u32)?;

        sys::install_shutdown_handler();
        sys::ignore_sigchld();

        let listener = sys::create_listen_socket(self.config.port)?;

        println!("[*] Master escuchando en el puerto {}", self.config.port);
        println!("[*] Document root: {}", self.config.document_root);
        println!("[*] Workers: {}", self.config.num_workers);

        // Forkear el fleet; cada worker hereda el socket de escucha
        let mut worker_pids = Vec::with_capacity(self.config.num_workers);

        for worker_id in 0..self.config.num_workers {
            match sys::fork()? {
                Fork::Child => {
                    // El hijo trabaja sobre su propio handle del socket
                    let inherited = listener.try_clone()?;
                    worker::worker_process(
                        inherited,
                        worker_id,
                        Arc::clone(&self.config),
                        stats,
                    );
                    std::process::exit(0);
                }
                Fork::Parent(pid) => {
                    worker_pids.push(pid);
                }
            }
        }

        println!("[+] Fleet de {} workers iniciado", worker_pids.len());

        // Tick de un segundo hasta la señal de terminación
        let mut tick_counter: u32 = 0;

        while !sys::shutdown_requested() {
            thread::sleep(Duration::from_secs(1));

            tick_counter += 1;
            if tick_counter >= SUMMARY_INTERVAL_TICKS {
                tick_counter = 0;
                stats.print_summary();
            }

            // Reaping oportunista; no hay respawn, un worker muerto
            // reduce la capacidad del fleet
            while let Some(pid) = sys::reap_nonblocking() {
                println!("[*] Worker terminado (PID: {})", pid);
                worker_pids.retain(|&p| p != pid);
            }
        }

        // Apagado: SIGTERM a cada worker y esperar a que salgan
        println!("[*] Master apagando, terminando workers...");

        for &pid in &worker_pids {
            sys::kill_term(pid);
        }
        for &pid in &worker_pids {
            sys::wait_for(pid);
        }

        drop(listener);
        stats.print_summary();
        stats.destroy();

        println!("[+] Apagado completo");
        Ok(())
    }
}
