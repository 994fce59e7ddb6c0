//! HTTP front end: the MJPEG stream plus a few small status endpoints.

use crate::config::BridgeConfig;
use crate::mjpeg::StreamHandler;
use crate::session::StreamSession;
use crate::{Result, SuearError};
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server};

/// Serves one [`StreamSession`] over HTTP, one thread per request.
pub struct MirrorServer {
    server: Arc<Server>,
    session: Arc<StreamSession>,
}

impl MirrorServer {
    /// Listen on `config.http_addr` with a fresh session for the camera.
    pub fn bind(config: BridgeConfig) -> Result<Self> {
        let server = Server::http(config.http_addr)
            .map_err(|e| SuearError::Http(format!("bind {}: {}", config.http_addr, e)))?;
        Ok(Self {
            server: Arc::new(server),
            session: Arc::new(StreamSession::new(config)),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// Accept requests until [`unblock`](Self::unblock) is called.
    pub fn run(&self) {
        if let Some(addr) = self.local_addr() {
            log::info!("Serving MJPEG stream on http://{}/stream", addr);
        }
        for request in self.server.incoming_requests() {
            let session = self.session.clone();
            let spawned = std::thread::Builder::new()
                .name("suear-http".into())
                .spawn(move || route(request, &session));
            if let Err(e) = spawned {
                log::error!("Failed to spawn request thread: {}", e);
            }
        }
        log::info!("HTTP server stopped");
    }

    /// Make [`run`](Self::run) return. Streams already being served finish
    /// on their own when their viewers disconnect.
    pub fn unblock(&self) {
        self.server.unblock();
    }
}

fn route(request: Request, session: &StreamSession) {
    if *request.method() != Method::Get {
        respond(request, Response::empty(405));
        return;
    }
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    log::debug!("GET {}", path);

    match path.as_str() {
        "/stream" => serve_stream(request, session),
        "/viewers" => {
            let body = session.client_count().to_string();
            respond(request, text(body, "text/plain"));
        }
        "/status" => {
            let connected = device_reachable(session);
            let body = format!("{{\"connected\": {}}}", connected);
            respond(request, text(body, "application/json"));
        }
        "/favicon.ico" => respond(request, Response::empty(204)),
        _ => respond(request, Response::empty(404)),
    }
}

fn serve_stream(request: Request, session: &StreamSession) {
    let handler = match StreamHandler::attach(session) {
        Ok(handler) => handler,
        Err(e) => {
            log::error!("Failed to start camera stream: {}", e);
            respond(request, Response::empty(503));
            return;
        }
    };
    // The handler writes its own status line and multipart body.
    let mut writer = request.into_writer();
    handler.serve(&mut *writer);
}

/// Ask the camera for its device info, continuing the session's request ids.
fn device_reachable(session: &StreamSession) -> bool {
    match session.device_info() {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Device info request failed: {}", e);
            false
        }
    }
}

fn text(body: String, content_type: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(body.into_bytes());
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        response.add_header(header);
    }
    response
}

fn respond<R: std::io::Read>(request: Request, response: Response<R>) {
    if let Err(e) = request.respond(response) {
        log::debug!("Client went away before response: {}", e);
    }
}
