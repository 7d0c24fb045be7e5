/*
 * This file is a part of Skytable
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # kilnd
//!
//! The server binary: wires together configuration loading, the reactor,
//! the listening socket, the client table and the cron tick, then runs the
//! event loop to completion.

mod alloc;
mod cfg;
mod client;
mod commands;
mod cron;
mod db;
mod dlist;
mod dstring;
mod error;
mod htable;
mod netio;
mod object;
mod reactor;
mod replication;
mod reply;
mod snapshot;

use client::ClientTable;
use db::{ReplState, Server};
use env_logger::Builder;
use kilncore::{URL, VERSION};
use reactor::EventLoop;
use std::cell::RefCell;
use std::env;
use std::fs;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PID_PATH: &str = ".kiln_pid";

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

static TEXT: &str = "\n██╗  ██╗██╗██╗     ███╗   ██╗\n██║ ██╔╝██║██║     ████╗  ██║\n█████╔╝ ██║██║     ██╔██╗ ██║\n██╔═██╗ ██║██║     ██║╚██╗██║\n██║  ██╗██║███████╗██║ ╚████║\n╚═╝  ╚═╝╚═╝╚══════╝╚═╝  ╚═══╝\n";

static SHOULD_STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_term_signal(_sig: libc::c_int) {
    SHOULD_STOP.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGHUP, libc::SIG_IGN);
        libc::signal(libc::SIGINT, handle_term_signal as usize);
        libc::signal(libc::SIGTERM, handle_term_signal as usize);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

const DAEMON_PID_PATH: &str = "/var/run/redis.pid";

/// Forks and detaches into the background: the parent exits immediately, the
/// child starts a new session, redirects stdio to `/dev/null`, and writes its
/// PID to [`DAEMON_PID_PATH`].
#[cfg(unix)]
fn daemonize() {
    match unsafe { libc::fork() } {
        -1 => {
            eprintln!("Startup failure: fork for daemonize failed");
            process::exit(1);
        }
        0 => {}
        _ => process::exit(0),
    }
    unsafe {
        libc::setsid();
        let devnull = std::ffi::CString::new("/dev/null").unwrap();
        let fd = libc::open(devnull.as_ptr(), libc::O_RDWR);
        if fd != -1 {
            libc::dup2(fd, libc::STDIN_FILENO);
            libc::dup2(fd, libc::STDOUT_FILENO);
            libc::dup2(fd, libc::STDERR_FILENO);
            if fd > libc::STDERR_FILENO {
                libc::close(fd);
            }
        }
    }
    if let Err(e) = fs::write(DAEMON_PID_PATH, process::id().to_string()) {
        log::error!("failed to write {DAEMON_PID_PATH}: {e}");
    }
}

#[cfg(not(unix))]
fn daemonize() {}

fn main() {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let cfg = match &config_path {
        Some(path) => cfg::Config::load(path).unwrap_or_else(|e| {
            eprintln!("Startup failure: {e}");
            process::exit(1);
        }),
        None => cfg::Config::default(),
    };

    Builder::new()
        .parse_filters(&env::var("SKY_LOG").unwrap_or_else(|_| cfg.loglevel.as_filter().to_owned()))
        .init();

    println!("kiln v{VERSION} | {URL}{TEXT}");

    if cfg.daemonize {
        daemonize();
    }

    let pid_file = run_pre_startup_tasks();
    install_signal_handlers();

    let mut server = Server::new(cfg.databases, cfg.dbfilename.clone(), cfg.dir.clone());
    server.save_params = cfg.save_params.clone();
    server.maxidletime = cfg.timeout;

    let dump_path = server.dump_path();
    if dump_path.exists() {
        if let Err(e) = snapshot::load(&mut server, &dump_path) {
            log::error!("Startup failure: could not load {}: {e}", dump_path.display());
            process::exit(1);
        }
    }

    if let Some((host, port)) = &cfg.slaveof {
        server.replication.state = ReplState::MustConnect;
        server.replication.master_host = Some(host.clone());
        server.replication.master_port = *port;
        log::info!("Configured as a slave of {host}:{port}");
    }

    let mut event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(e) => {
            log::error!("Startup failure: could not create event loop: {e}");
            process::exit(1);
        }
    };

    let listener = match netio::tcp_listen(&cfg.bind, cfg.port) {
        Ok(l) => l,
        Err(e) => {
            log::error!("Startup failure: could not bind {}:{}: {e}", cfg.bind, cfg.port);
            process::exit(1);
        }
    };
    log::info!("Listening on {}:{}", cfg.bind, cfg.port);
    server.listen_fd = Some(listener.as_raw_fd());

    let server = Rc::new(RefCell::new(server));
    let table: Rc<RefCell<ClientTable>> = Rc::new(RefCell::new(ClientTable::new()));

    if let Err(e) = client::install_listener(&mut event_loop, listener, server.clone(), table.clone()) {
        log::error!("Startup failure: could not register listening socket: {e}");
        process::exit(1);
    }

    cron::install(&mut event_loop, server.clone(), table.clone());
    install_idle_sweep(&mut event_loop, server.clone(), table.clone());

    while !event_loop.stop {
        if let Err(e) = event_loop.process_events(reactor::ALL_EVENTS) {
            log::error!("Fatal reactor error: {e}");
            break;
        }
        if SHOULD_STOP.load(Ordering::SeqCst) {
            event_loop.stop = true;
        }
    }

    log::info!("Stopped accepting incoming connections");
    loop {
        match snapshot::save(&mut server.borrow_mut()) {
            Ok(()) => {
                log::info!("Successfully saved data to disk");
                break;
            }
            Err(e) => {
                log::error!("Failed to write data with error '{e}'. Attempting to retry in 10s");
            }
        }
        std::thread::sleep(Duration::from_secs(10));
    }

    drop(pid_file);
    if let Err(e) = fs::remove_file(PID_PATH) {
        log::error!("Shutdown failure: failed to remove pid file: {e}");
        process::exit(1);
    }
    println!("Goodbye :)");
}

/// Installs a once-a-second time event that sweeps idle clients every ten
/// ticks, matching the cadence of the server's own cron (kept as a separate
/// event here since [`cron::install`] only has access to [`Server`], not the
/// client table).
fn install_idle_sweep(event_loop: &mut EventLoop, server: Rc<RefCell<Server>>, table: Rc<RefCell<ClientTable>>) {
    let mut ticks: u64 = 0;
    event_loop.create_time_event(
        Duration::from_secs(1),
        Box::new(move |el| {
            ticks += 1;
            if ticks % 10 == 0 {
                let maxidletime = server.borrow().maxidletime;
                table.borrow_mut().sweep_idle(el, maxidletime);
            }
            1000
        }),
    );
}

/// Refuses to start if another process is already using this data directory,
/// otherwise claims it by writing our PID to [`PID_PATH`].
fn run_pre_startup_tasks() -> fs::File {
    let path = Path::new(PID_PATH);
    if path.exists() {
        let pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
        log::error!("Startup failure: another process with PID {pid} is using the data directory");
        process::exit(1);
    }
    let mut file = match fs::OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            log::error!("Startup failure: failed to open pid file: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = file.write_all(process::id().to_string().as_bytes()) {
        log::error!("Startup failure: failed to write pid file: {e}");
        process::exit(1);
    }
    file
}
