//! Print the effective desock configuration
//!
//! Shows what a target started with the current environment would get:
//! limits, fallback switches, logging, the channel handoff and the admission
//! primitive for this platform.

use std::process;

use desock::{log_level, new_platform_admission, Admission, DesockConfig, CHANNEL_ENV, HEADER_SIZE};

fn main() {
    desock::init_logging();
    let config = DesockConfig::from_env();
    config.print();

    if let Err(e) = config.validate() {
        eprintln!("desock-info: {}", e);
        process::exit(1);
    }

    println!("Logging:");
    println!("  level:           {:?}", log_level());

    println!("Packet channel:");
    match std::env::var(CHANNEL_ENV) {
        Ok(raw) => println!("  {}: {}", CHANNEL_ENV, raw),
        Err(_) => println!("  {}: (unset)", CHANNEL_ENV),
    }
    println!("  record header:   {} bytes", HEADER_SIZE);

    println!("Admission:");
    match new_platform_admission(config.max_conns) {
        Ok(admission) => {
            println!("  primitive:       {}", std::any::type_name_of_val(&admission));
            println!("  permits:         {}", admission.available());
        }
        Err(e) => {
            eprintln!("desock-info: {}", e);
            process::exit(1);
        }
    }

    println!("Build:");
    println!("  version:         {}", env!("CARGO_PKG_VERSION"));
    println!("  target os:       {}", std::env::consts::OS);
    println!("  epoll emulation: {}", cfg!(any(target_os = "linux", target_os = "android")));
}
