//! `avon-cli` – Avon server binary
//!
//! Serves a simulated world over HTTP.  It:
//!
//! 1. Loads `~/.avon/config.toml`, writing the defaults on first run.
//! 2. Builds the configured [`SimWorld`], registers its models and installs
//!    its handlers on an HTTP server.
//! 3. Runs the event loop, stepping the simulation between requests.
//! 4. Intercepts **Ctrl-C** to wake the loop and shut down cleanly.

mod config;
mod telemetry;

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use avon_core::SimWorld;
use avon_types::AvonError;
use colored::Colorize;
use tracing::{info, warn};

fn main() -> ExitCode {
    let cfg = load_config();
    let _guard = telemetry::init_tracing("avon", cfg.verbose);

    print_banner();

    match run(&cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Server error".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn run(cfg: &config::Config) -> Result<(), AvonError> {
    let world = Rc::new(RefCell::new(cfg.world.build()?));
    let (mut server, interrupter) = avon_http::init(cfg.server_config())?;
    SimWorld::attach(&world, &mut server)?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        running_clone.store(false, Ordering::SeqCst);
        interrupter.interrupt();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    server.start()?;
    println!(
        "  Serving {} model(s) on {}",
        server.registry().len(),
        format!("http://{}:{}", cfg.host, cfg.port).bold()
    );

    let tick = Duration::from_millis(cfg.tick_ms.max(1));
    let mut last = Instant::now();
    while running.load(Ordering::SeqCst) {
        if cfg.blocking {
            server.wait()?;
        } else {
            server.check()?;
            std::thread::sleep(tick);
        }
        let now = Instant::now();
        world.borrow_mut().step((now - last).as_secs_f64());
        last = now;
    }

    server.shutdown();
    info!(sim_time_us = world.borrow().time(), "avon stopped");
    println!("{}", "  ✓ Exiting Avon.".green());
    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", r#"    ___                 "#.bold().cyan());
    println!("{}", r#"   /   |_   ______  ____ "#.bold().cyan());
    println!("{}", r#"  / /| | | / / __ \/ __ \"#.bold().cyan());
    println!("{}", r#" / ___ | |/ / /_/ / / / /"#.bold().cyan());
    println!("{}", r#"/_/  |_|___/\____/_/ /_/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Avon".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Lightweight robot telemetry server");
    println!();
}
