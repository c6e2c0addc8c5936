//! The `jacques serve` entrypoint: wires the registry, pipeline, socket
//! listener, and HTTP surfaces together and runs until interrupted.

use jacques_runtime::{
    spawn_handoff_pump, spawn_signal_pump, EventPipeline, FanoutHub, NoopActivator,
    NotificationEngine, SessionRegistry,
};
use jacques_types::{Config, ErrorKind, JacquesPaths};
use std::sync::Arc;

use crate::exit_code_for;

pub fn run_serve(paths: JacquesPaths, rest_port: u16, ws_port: u16) -> ! {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(serve(paths, rest_port, ws_port));
    std::process::exit(code);
}

async fn serve(paths: JacquesPaths, rest_port: u16, ws_port: u16) -> i32 {
    if let Err(e) = write_pid_file(&paths) {
        eprintln!("{e}");
        return exit_code_for(ErrorKind::Conflict, false);
    }

    // Clean (or refuse to clean) the hook socket before anything else.
    let socket_path = paths.socket_path();
    if let Err(e) = jacques_runtime::prepare_socket_path(&socket_path) {
        eprintln!("{e}");
        remove_pid_file(&paths);
        return exit_code_for(e.kind(), true);
    }

    let config = match Config::load_from(&paths.config_file()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cannot load config: {e}");
            remove_pid_file(&paths);
            return 1;
        }
    };

    let registry = Arc::new(SessionRegistry::new());
    let hub = Arc::new(FanoutHub::new());
    let engine = NotificationEngine::new(config.notifications.clone());
    let (pipeline, handoff_rx) = EventPipeline::new(
        paths.clone(),
        registry.clone(),
        hub.clone(),
        engine,
        Box::new(NoopActivator),
    );

    // Pick up sessions already running before we started.
    pipeline.register_discovered();

    let _signal_pump = spawn_signal_pump(registry.clone(), hub.clone());
    let _handoff_pump = spawn_handoff_pump(pipeline.clone(), handoff_rx);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let socket_task = tokio::spawn(jacques_runtime::run_socket_listener(
        socket_path,
        pipeline.clone(),
        shutdown_rx,
    ));

    let state = jacques_server::AppState::new(paths.clone(), pipeline);
    let server = jacques_server::start_server(state, rest_port, ws_port);

    let code = tokio::select! {
        result = server => match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{e}");
                exit_code_for(e.kind(), false)
            }
        },
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("shutting down"),
                Err(e) => tracing::warn!(error = %e, "signal handler failed"),
            }
            0
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = socket_task.await;
    remove_pid_file(&paths);
    code
}

/// Refuses to start when another live jacques process owns the PID file.
fn write_pid_file(paths: &JacquesPaths) -> Result<(), String> {
    let pid_file = paths.pid_file();
    if let Ok(content) = std::fs::read_to_string(&pid_file)
        && let Ok(pid) = content.trim().parse::<u32>()
        && process_alive(pid)
    {
        return Err(format!("jacques already running with pid {pid}"));
    }

    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    std::fs::write(&pid_file, format!("{}\n", std::process::id())).map_err(|e| e.to_string())
}

fn remove_pid_file(paths: &JacquesPaths) {
    let _ = std::fs::remove_file(paths.pid_file());
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()),
    );
    system.process(Pid::from_u32(pid)).is_some()
}
