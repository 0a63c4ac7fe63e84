use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};

use crate::app::commands::{handle_text, resolve_trace_id};
use crate::app::error::AppError;
use crate::app::models::ServerEvent;
use crate::app::state::{AppState, EventEmitter};

/// How long a connection blocks on the socket before flushing queued events.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

pub fn bind(address: &str, state: Arc<AppState>) -> Result<Server, AppError> {
    let trace_id = resolve_trace_id(None);
    let listener = TcpListener::bind(address)
        .map_err(|err| AppError::io(&format!("Failed to bind {address}"), err, &trace_id))?;
    Ok(Server { listener, state })
}

impl Server {
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener
            .local_addr()
            .map_err(|err| AppError::io("Failed to read listener address", err, resolve_trace_id(None)))
    }

    /// Accepts clients forever, one thread each.
    pub fn run(self) -> Result<(), AppError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, "fz-builder listening");
        }
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            std::thread::spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                info!(peer = %peer, "client connected");
                match serve_connection(stream, state) {
                    Ok(()) => info!(peer = %peer, "client disconnected"),
                    Err(err) => {
                        warn!(peer = %peer, trace_id = %err.trace_id, code = %err.code, error = %err.error, "connection closed with error")
                    }
                }
            });
        }
        Ok(())
    }
}

fn send_event(
    socket: &mut WebSocket<TcpStream>,
    event: &ServerEvent,
    trace_id: &str,
) -> Result<(), AppError> {
    let payload = serde_json::to_string(event)
        .map_err(|err| AppError::system(format!("Failed to encode event: {err}"), trace_id))?;
    debug!(trace_id = %trace_id, event = event.name(), "send");
    socket
        .send(Message::Text(payload))
        .map_err(|err| AppError::system(format!("Failed to send event: {err}"), trace_id))
}

fn is_idle(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
}

fn serve_connection(stream: TcpStream, state: Arc<AppState>) -> Result<(), AppError> {
    let trace_id = resolve_trace_id(None);
    let mut socket = tungstenite::accept(stream)
        .map_err(|err| AppError::system(format!("WebSocket handshake failed: {err}"), &trace_id))?;
    socket
        .get_ref()
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| AppError::io("Failed to configure socket", err, &trace_id))?;

    let (sender, receiver) = mpsc::channel::<ServerEvent>();
    let emitter: EventEmitter = Arc::new(move |event| {
        // The receiver is gone once the client left.
        let _ = sender.send(event);
    });

    loop {
        while let Ok(event) = receiver.try_recv() {
            send_event(&mut socket, &event, &trace_id)?;
        }
        match socket.read() {
            Ok(Message::Text(text)) => {
                handle_text(&state, &text, &emitter);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) if is_idle(&err) => {
                // Pongs queued by the read path go out here.
                if let Err(err) = socket.flush() {
                    if !is_idle(&err) {
                        return Err(AppError::system(format!("Socket flush failed: {err}"), &trace_id));
                    }
                }
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(err) => {
                return Err(AppError::system(format!("Socket read failed: {err}"), &trace_id));
            }
        }
    }
    Ok(())
}
