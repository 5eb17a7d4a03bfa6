//! # Prefork HTTP Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor. Recibe la ruta del archivo de
//! configuración como único argumento posicional opcional.

use clap::Parser;
use prefork_server::config::{Cli, Config};
use prefork_server::server::Master;

fn main() {
    println!("=================================");
    println!("  Prefork HTTP/1.1 File Server");
    println!("=================================\n");

    let cli = Cli::parse();

    let config = Config::load(&cli.config_file);

    if let Err(e) = config.validate() {
        eprintln!("❌ Error de configuración: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    let master = Master::new(config);

    if let Err(e) = master.run() {
        eprintln!("💥 Error fatal: {}", e);
        std::process::exit(1);
    }
}
