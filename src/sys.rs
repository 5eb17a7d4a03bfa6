//! # Wrappers de Syscalls
//! src/sys.rs
//!
//! Envuelve las llamadas al sistema que la librería estándar no expone:
//! socket de escucha con SO_REUSEPORT, fork del fleet de workers,
//! señales de terminación, reaping de hijos y sendfile. Todo el código
//! `unsafe` del servidor vive en este módulo; las funciones públicas
//! retornan `io::Result`.

use libc::{c_int, c_void, socklen_t};
use std::fs::File;
use std::io;
use std::mem;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::atomic::{AtomicBool, Ordering};

/// Backlog del socket de escucha
pub const LISTEN_BACKLOG: c_int = 128;

/// Resultado de un fork
pub enum Fork {
    /// Estamos en el proceso hijo
    Child,
    /// Estamos en el padre; contiene el PID del hijo
    Parent(libc::pid_t),
}

// ---- Socket de escucha ----

/// Crea el socket de escucha en el puerto indicado
///
/// Configura SO_REUSEADDR y SO_REUSEPORT para que los workers (que
/// heredan el descriptor por fork) puedan aceptar del mismo puerto y el
/// kernel reparta las conexiones entre ellos.
pub fn create_listen_socket(port: u16) -> io::Result<TcpListener> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let opt: c_int = 1;
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const c_void,
            mem::size_of_val(&opt) as socklen_t,
        );
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            &opt as *const _ as *const c_void,
            mem::size_of_val(&opt) as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        let addr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: port.to_be(),
            sin_addr: libc::in_addr {
                s_addr: libc::INADDR_ANY.to_be(),
            },
            sin_zero: [0; 8],
        };

        if libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            mem::size_of_val(&addr) as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        if libc::listen(fd, LISTEN_BACKLOG) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(TcpListener::from_raw_fd(fd))
    }
}

// ---- Procesos ----

/// Fork del proceso actual
pub fn fork() -> io::Result<Fork> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        Err(io::Error::last_os_error())
    } else if pid == 0 {
        Ok(Fork::Child)
    } else {
        Ok(Fork::Parent(pid))
    }
}

/// Envía SIGTERM a un proceso
pub fn kill_term(pid: libc::pid_t) {
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

/// Reap no bloqueante: retorna el PID de un hijo que haya terminado
pub fn reap_nonblocking() -> Option<libc::pid_t> {
    let mut status: c_int = 0;
    let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
    if pid > 0 {
        Some(pid)
    } else {
        None
    }
}

/// Espera bloqueante por un hijo específico
pub fn wait_for(pid: libc::pid_t) {
    let mut status: c_int = 0;
    unsafe {
        libc::waitpid(pid, &mut status, 0);
    }
}

// ---- Señales ----

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_termination(_signum: c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Instala el handler de SIGINT/SIGTERM que marca el flag de shutdown
///
/// Sin SA_RESTART: un `accept` bloqueado retorna EINTR y el loop puede
/// observar el flag.
pub fn install_shutdown_handler() {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handle_termination as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;

        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}

/// Ignora SIGCHLD (el master hace reaping oportunista con waitpid)
pub fn ignore_sigchld() {
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
    }
}

/// Verifica si se recibió una señal de terminación
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

// ---- sendfile ----

/// Transfiere un archivo completo al socket con sendfile (zero-copy)
///
/// Itera sobre transferencias parciales y reintenta en EINTR. Retorna
/// los bytes efectivamente enviados.
#[cfg(target_os = "linux")]
pub fn sendfile_all(file: &File, stream: &TcpStream, size: u64) -> io::Result<u64> {
    let in_fd = file.as_raw_fd();
    let out_fd = stream.as_raw_fd();
    let mut offset: libc::off_t = 0;

    while (offset as u64) < size {
        let remaining = size - offset as u64;
        let sent = unsafe { libc::sendfile(out_fd, in_fd, &mut offset, remaining as usize) };

        if sent < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if sent == 0 {
            break;
        }
    }

    Ok(offset as u64)
}

/// Fallback sin sendfile para plataformas que no lo exponen
#[cfg(not(target_os = "linux"))]
pub fn sendfile_all(file: &File, stream: &TcpStream, size: u64) -> io::Result<u64> {
    let _ = size;
    let mut reader = file.try_clone()?;
    let mut writer = stream.try_clone()?;
    io::copy(&mut reader, &mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::net::TcpStream;

    #[test]
    fn test_create_listen_socket_accepts_connections() {
        // Puerto 0: el kernel elige uno libre
        let listener = create_listen_socket(0).expect("listen socket");
        let addr = listener.local_addr().unwrap();

        let t = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();

        assert_eq!(&t.join().unwrap(), b"ping");
    }

    #[test]
    fn test_reap_nonblocking_without_children() {
        assert!(reap_nonblocking().is_none());
    }

    #[test]
    fn test_sendfile_transfers_full_content() {
        let listener = create_listen_socket(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut path = std::env::temp_dir();
        path.push(format!("sendfile-test-{}.bin", std::process::id()));

        let payload = vec![7u8; 64 * 1024];
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&payload).unwrap();
        }

        let payload_len = payload.len() as u64;
        let sender = std::thread::spawn({
            let path = path.clone();
            move || {
                let (conn, _) = listener.accept().unwrap();
                let mut file = std::fs::File::open(&path).unwrap();
                file.seek(SeekFrom::Start(0)).unwrap();
                sendfile_all(&file, &conn, payload_len).unwrap()
            }
        });

        let mut client = TcpStream::connect(addr).unwrap();
        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();

        assert_eq!(sender.join().unwrap(), payload_len);
        assert_eq!(received, payload);

        std::fs::remove_file(&path).ok();
    }
}
