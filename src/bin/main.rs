//! CLI entry point for `thermal-controld`.
//!
//! Thin wrapper over the library's control algorithm: parses arguments,
//! wires up logging/daemonization/signal handling, and drives the
//! `start|stop|restart|suspend|resume|status` lifecycle. All control-loop
//! logic lives in the library crate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use colored::Colorize;

use thermal_controld::config::{self, Command, Flags};
use thermal_controld::controller::ThermalController;
use thermal_controld::daemon_proc::{self, Pidfile, DEFAULT_PIDFILE};
use thermal_controld::hwmtree::HwmTree;
use thermal_controld::logging::{self, DaemonLogger};
use thermal_controld::ticker::{RepeatingTicker, DEFAULT_POLLING_SECS, DEFAULT_REPORT_SECS};

fn main() {
    let cli = match config::load_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    };

    let exit_code = match cli.command {
        Command::Start => cmd_start(&cli.flags),
        Command::Stop => cmd_stop(&cli.flags),
        Command::Restart => {
            let _ = cmd_stop(&cli.flags);
            cmd_start(&cli.flags)
        }
        Command::Suspend => cmd_suspend(&cli.flags),
        Command::Resume => cmd_resume(&cli.flags),
        Command::Status => cmd_status(&cli.flags),
    };

    std::process::exit(exit_code);
}

fn cmd_start(flags: &Flags) -> i32 {
    let pidfile = Pidfile::new(DEFAULT_PIDFILE);
    let daemon_log = DaemonLogger::new();

    if let Some(pid) = pidfile.read_pid() {
        if Pidfile::process_alive(pid) {
            daemon_log.warn("Mellanox thermal control is already running.");
            return 1;
        }
    }

    println!("{}", "Thermal-algo: starting...".cyan());

    if flags.daemonize {
        // Must happen before any threads exist: forking a multithreaded
        // process is unsound, and no tickers have been spawned yet.
        if let Err(e) = daemon_proc::daemonize() {
            eprintln!("{} failed to daemonize: {e}", "error:".red().bold());
            return 1;
        }
    }

    if let Err(e) = daemon_proc::install_handlers() {
        eprintln!("{} failed to install signal handlers: {e}", "error:".red().bold());
        return 1;
    }

    if let Err(e) = logging::init(flags.log_file.as_deref(), flags.syslog) {
        eprintln!("{} failed to initialize logging: {e}", "error:".red().bold());
        return 1;
    }

    if let Err(e) = pidfile.write_current_pid() {
        eprintln!("{} {e}", "error:".red().bold());
        return 1;
    }

    let tree = HwmTree::new(flags.root_folder.clone());
    let controller = match ThermalController::new(tree, flags.class, flags.tacho, flags.psu, true) {
        Ok(c) => c,
        Err(e) => {
            log::error!("thermal control init failed: {e}");
            pidfile.remove();
            return 1;
        }
    };

    if flags.wait > 0 {
        std::thread::sleep(Duration::from_secs(flags.wait));
    }

    let controller = Arc::new(Mutex::new(controller));

    let poll_controller = controller.clone();
    let mut poll_ticker = RepeatingTicker::start(Duration::from_secs(DEFAULT_POLLING_SECS), move || {
        if let Ok(mut ctl) = poll_controller.lock() {
            if let Err(e) = ctl.tick() {
                log::error!("tick failed: {e}");
            }
        }
    });

    let report_controller = controller.clone();
    let mut report_ticker = RepeatingTicker::start(Duration::from_secs(DEFAULT_REPORT_SECS), move || {
        if let Ok(ctl) = report_controller.lock() {
            ctl.periodic_report();
        }
    });

    daemon_log.action(&format!(
        "Mellanox thermal control is started PID={}",
        std::process::id()
    ));

    loop {
        std::thread::sleep(Duration::from_secs(1));

        if daemon_proc::take_poke_requested() {
            if let Ok(mut ctl) = controller.lock() {
                ctl.poke();
            }
        }

        if daemon_proc::shutdown_requested() {
            break;
        }
    }

    poll_ticker.stop();
    report_ticker.stop();

    daemon_log.action(&format!(
        "Mellanox thermal control is terminated PID={}",
        std::process::id()
    ));
    pidfile.remove();
    0
}

fn cmd_stop(_flags: &Flags) -> i32 {
    println!("{}", "Thermal-algo: stopping...".cyan());
    let pidfile = Pidfile::new(DEFAULT_PIDFILE);

    let Some(pid) = pidfile.read_pid() else {
        println!(
            "Err. PID file {} doesn't exist. Is thermal-controld running?",
            DEFAULT_PIDFILE
        );
        return 1;
    };

    let nix_pid = nix::unistd::Pid::from_raw(pid as i32);
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGTERM) {
            Ok(()) => {
                if std::time::Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(nix::errno::Errno::ESRCH) => {
                pidfile.remove();
                return 0;
            }
            Err(e) => {
                eprintln!("{} kill({pid}) failed: {e}", "error:".red().bold());
                return 1;
            }
        }
    }

    let _ = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGKILL);
    pidfile.remove();
    0
}

fn cmd_suspend(flags: &Flags) -> i32 {
    let daemon_log = DaemonLogger::new();
    let tree = HwmTree::new(flags.root_folder.clone());
    tree.write("config/suspend", 1);
    daemon_log.action("Thermal algorithm is manually suspended");
    0
}

fn cmd_resume(flags: &Flags) -> i32 {
    let daemon_log = DaemonLogger::new();
    let tree = HwmTree::new(flags.root_folder.clone());
    tree.write("config/suspend", 0);
    daemon_log.action("Thermal algorithm is manually resumed");
    0
}

fn cmd_status(_flags: &Flags) -> i32 {
    let pidfile = Pidfile::new(DEFAULT_PIDFILE);
    if let Some(pid) = pidfile.read_pid() {
        if Pidfile::process_alive(pid) {
            println!("{}", "service is running".green());
            return 0;
        }
    }
    println!("{}", "service stopped".yellow());
    0
}
