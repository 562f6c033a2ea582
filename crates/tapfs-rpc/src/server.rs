//! The Unix-socket session server.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use tapfs_core::SessionRegistry;
use tapfs_proto::{read_message, write_message, Method, TraceRequest, TraceResponse, WireError};

/// Dispatches the two trace methods against the shared registry.
pub struct CommandServer {
    registry: Arc<SessionRegistry>,
    dep_dir: PathBuf,
}

impl CommandServer {
    /// Creates a server over `registry`, announcing `dep_dir` to clients.
    pub fn new(registry: Arc<SessionRegistry>, dep_dir: PathBuf) -> Self {
        Self { registry, dep_dir }
    }

    /// Handles one request.
    pub fn dispatch(&self, request: &TraceRequest) -> TraceResponse {
        match request.method {
            Method::StartTrace => self.start_trace(request.pgid),
            Method::EndTrace => self.end_trace(request.pgid),
        }
    }

    fn start_trace(&self, pgid: i32) -> TraceResponse {
        let session = self.registry.register(pgid);
        info!(pgid, session = session.id(), "trace started");
        TraceResponse::default()
    }

    fn end_trace(&self, pgid: i32) -> TraceResponse {
        match self.registry.remove(pgid) {
            Ok(session) => {
                let ops = session.collect();
                info!(pgid, session = session.id(), "trace ended");
                TraceResponse {
                    err: None,
                    id: session.id().to_string(),
                    dep_dir: self.dep_dir.display().to_string(),
                    read: ops.read,
                    create: ops.create,
                    update: ops.update,
                    delete: ops.delete,
                }
            }
            Err(err) => {
                warn!(pgid, error = %err, "end of unknown trace");
                TraceResponse::error(err.to_string())
            }
        }
    }
}

/// A running server. Dropping the handle removes the socket directory; the
/// acceptor thread winds down when the process exits.
pub struct ServerHandle {
    socket_path: PathBuf,
    _socket_dir: TempDir,
}

impl ServerHandle {
    /// The socket path clients dial - the target of the `.tapfs` symlink.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Binds a socket in a fresh temporary directory and starts accepting
/// connections, one handler thread per client.
pub fn serve(registry: Arc<SessionRegistry>, dep_dir: PathBuf) -> io::Result<ServerHandle> {
    let socket_dir = tempfile::Builder::new().prefix("tapfs-").tempdir()?;
    let socket_path = socket_dir.path().join("socket");
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "session server listening");

    let server = Arc::new(CommandServer::new(registry, dep_dir));
    thread::spawn(move || accept_loop(listener, server));

    Ok(ServerHandle {
        socket_path,
        _socket_dir: socket_dir,
    })
}

fn accept_loop(listener: UnixListener, server: Arc<CommandServer>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let server = server.clone();
                thread::spawn(move || {
                    if let Err(err) = serve_connection(stream, &server) {
                        debug!(error = %err, "client connection ended with error");
                    }
                });
            }
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
}

/// Serves one client until it hangs up. A connection may carry several
/// calls in sequence (the runner issues `StartTrace` and `EndTrace` on the
/// same stream).
fn serve_connection(mut stream: UnixStream, server: &CommandServer) -> Result<(), WireError> {
    loop {
        let request: TraceRequest = match read_message(&mut stream) {
            Ok(request) => request,
            Err(WireError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        let response = server.dispatch(&request);
        write_message(&mut stream, &response)?;
    }
}
