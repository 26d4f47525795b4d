use anyhow::{Context, Result};
use common::{Command, Response, SpanwallError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;

use crate::DaemonState;
use crate::image_sources;

/// Bind `addr` and serve clients until shutdown
pub async fn start(state: Arc<DaemonState>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind IPC listener on {}", addr))?;
    log::info!("IPC server listening on: {}", listener.local_addr()?);

    serve(listener, state).await
}

/// Accept loop on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<DaemonState>) -> Result<()> {
    let mut shutdown = state.subscribe_shutdown();

    loop {
        if state.is_shutting_down() {
            break;
        }

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    log::debug!("Client connected from {}", addr);
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state).await {
                            log::error!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Error accepting connection: {}", e);
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(stream: TcpStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let parsed = serde_json::from_str::<Command>(line.trim());
        line.clear();

        let response = match parsed {
            Ok(Command::Subscribe) => return stream_status(reader, writer, &state).await,
            Ok(command) => handle_command(command, &state).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(SpanwallError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Forward status lines to the client until it hangs up or the daemon stops
async fn stream_status(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    state: &DaemonState,
) -> Result<()> {
    let mut rx = state.status.subscribe();
    let mut shutdown = state.subscribe_shutdown();
    write_response(&mut writer, &Response::Ok).await?;

    let mut ignored = String::new();
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Ok(message) => write_response(&mut writer, &Response::Log(message)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Status subscriber fell behind, dropped {} lines", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            read = reader.read_line(&mut ignored) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => ignored.clear(),
            },
            _ = shutdown.changed() => break,
        }
    }

    log::debug!("Status subscriber disconnected");
    Ok(())
}

/// Run a command off the async runtime: store mutations persist to disk
/// and detection calls into the OS.
async fn handle_command(command: Command, state: &Arc<DaemonState>) -> Response {
    let state = state.clone();
    tokio::task::spawn_blocking(move || dispatch(command, &state))
        .await
        .unwrap_or_else(|e| Response::Error(SpanwallError::Ipc(format!("Command failed: {}", e))))
}

/// Execute one command against the daemon state
pub fn dispatch(command: Command, state: &DaemonState) -> Response {
    log::debug!("Handling command: {:?}", command);
    let store = &state.store;

    match command {
        Command::Ping => Response::Pong,

        Command::Status => Response::Status(state.status_report()),

        Command::DetectMonitors => {
            let monitors = state.detect_monitors();
            state.request_refresh();
            Response::Monitors(monitors)
        }

        Command::GetMonitorConfig { monitor } => {
            Response::MonitorConfig(store.get_monitor_config(&monitor))
        }

        Command::UpdateMonitorConfig {
            monitor,
            key,
            value,
        } => match store.update_monitor_config(&monitor, &key, value) {
            Ok(changed) => Response::Changed(changed),
            Err(e) => Response::Error(e),
        },

        Command::AddImage { monitor, path } => Response::Changed(store.add_image(&monitor, &path)),

        Command::AddImages { monitor, sources } => {
            let paths = image_sources::resolve(&sources);
            if paths.is_empty() {
                return Response::Error(SpanwallError::NotFound(format!(
                    "No images found in {}",
                    sources.join(", ")
                )));
            }
            Response::Changed(store.add_images(&monitor, &paths) > 0)
        }

        Command::RemoveImage { monitor, path } => {
            Response::Changed(store.remove_image(&monitor, &path))
        }

        Command::ClearImages { monitor } => Response::Changed(store.clear_images(&monitor)),

        Command::MoveImage {
            monitor,
            index,
            direction,
        } => Response::Changed(store.move_image(&monitor, index, direction)),

        Command::ShiftImage { monitor, src, dest } => {
            Response::Changed(store.shift_image(&monitor, src, dest))
        }

        Command::GetAppSettings => Response::AppSettings(store.get_app_settings()),

        Command::UpdateAppSetting { key, value } => match store.update_app_setting(&key, value) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e),
        },

        Command::Refresh => {
            state.detect_monitors();
            state.request_refresh();
            Response::Ok
        }

        Command::Subscribe => Response::Error(SpanwallError::Ipc(
            "Subscribe is only valid as a stream request".to_string(),
        )),

        Command::Kill => {
            log::info!("Received kill command");
            state.request_shutdown();
            Response::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::Desktop;
    use common::MonitorDescriptor;
    use serde_json::json;
    use std::path::Path;

    struct TwoMonitors;

    impl Desktop for TwoMonitors {
        fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, SpanwallError> {
            Ok(vec![
                MonitorDescriptor::from_rect("A", 0, 0, 1920, 1080).unwrap(),
                MonitorDescriptor::from_rect("B", 1920, 0, 3840, 1080).unwrap(),
            ])
        }

        fn set_tile_mode(&self) -> Result<(), SpanwallError> {
            Ok(())
        }

        fn set_wallpaper(&self, _path: &Path) -> Result<(), SpanwallError> {
            Ok(())
        }
    }

    fn state(dir: &tempfile::TempDir) -> DaemonState {
        DaemonState::new(dir.path().join("config.json"), Arc::new(TwoMonitors))
    }

    #[test]
    fn test_detect_registers_monitors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);

        match dispatch(Command::DetectMonitors, &state) {
            Response::Monitors(monitors) => assert_eq!(monitors.len(), 2),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(state.store.snapshot().monitors.contains_key("B"));
    }

    #[test]
    fn test_unknown_monitor_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);

        let response = dispatch(
            Command::AddImage {
                monitor: "ghost".to_string(),
                path: "a.png".to_string(),
            },
            &state,
        );
        assert!(matches!(response, Response::Changed(false)));

        let response = dispatch(
            Command::ShiftImage {
                monitor: "ghost".to_string(),
                src: 0,
                dest: 3,
            },
            &state,
        );
        assert!(matches!(response, Response::Changed(false)));
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        dispatch(Command::DetectMonitors, &state);

        let response = dispatch(
            Command::UpdateMonitorConfig {
                monitor: "A".to_string(),
                key: "interval".to_string(),
                value: json!(0),
            },
            &state,
        );
        assert!(matches!(
            response,
            Response::Error(SpanwallError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_add_images_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        dispatch(Command::DetectMonitors, &state);

        let pics = dir.path().join("pics");
        std::fs::create_dir(&pics).unwrap();
        std::fs::write(pics.join("one.png"), b"").unwrap();
        std::fs::write(pics.join("two.jpg"), b"").unwrap();

        let response = dispatch(
            Command::AddImages {
                monitor: "A".to_string(),
                sources: vec![pics.to_string_lossy().into_owned()],
            },
            &state,
        );
        assert!(matches!(response, Response::Changed(true)));
        assert_eq!(state.store.get_monitor_config("A").images.len(), 2);

        let response = dispatch(
            Command::AddImages {
                monitor: "A".to_string(),
                sources: vec![dir.path().join("empty*").to_string_lossy().into_owned()],
            },
            &state,
        );
        assert!(matches!(
            response,
            Response::Error(SpanwallError::NotFound(_))
        ));
    }

    #[test]
    fn test_kill_requests_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);

        assert!(!state.is_shutting_down());
        assert!(matches!(dispatch(Command::Kill, &state), Response::Ok));
        assert!(state.is_shutting_down());
    }
}
