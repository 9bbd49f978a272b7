use log::info;
use std::io;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use gpiosim::{AppConfig, AppState, GpioManager, HttpConfig};

enum Listener {
    Unix(String),
    Tcp(String),
}

/// Listeners named by the config, unix socket first. A stale socket file is
/// removed so the daemon can be restarted in place.
fn listeners(http: &HttpConfig) -> io::Result<Vec<Listener>> {
    let mut listeners = Vec::new();
    if let Some(socket_path) = &http.unix_socket {
        if Path::new(socket_path).exists() {
            std::fs::remove_file(socket_path)?;
        }
        listeners.push(Listener::Unix(socket_path.clone()));
    }
    if let Some(host) = &http.host {
        listeners.push(Listener::Tcp(host.clone()));
    }
    if listeners.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "config needs 'unix_socket', 'host' or both",
        ));
    }
    Ok(listeners)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GPIOSIM_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load_from_file(&config_path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    let manager =
        GpioManager::from_config(&config).map_err(|e| io::Error::other(e.to_string()))?;
    let app_state = AppState {
        manager: Arc::new(manager),
    };

    let scope_path = config.http.path.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(app_state.api_scope(&scope_path))
    });

    for listener in listeners(&config.http)? {
        server = match listener {
            Listener::Unix(socket_path) => {
                info!("Listening on unix socket {socket_path}");
                server.bind_uds(&socket_path)?
            }
            Listener::Tcp(host) => {
                info!("Listening on {host}");
                server.bind_auto_h2c(&host)?
            }
        };
    }

    server.run().await
}
