use std::path::PathBuf;

use edge_charger::adapters::machine_id::{DEFAULT_MACHINE_ID_PATHS, read_machine_uid};

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to read machine uid: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut paths: Vec<PathBuf> = Vec::new();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                paths.push(PathBuf::from(value));
                index += 2;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    if paths.is_empty() {
        paths = DEFAULT_MACHINE_ID_PATHS.iter().map(PathBuf::from).collect();
    }

    let uid = read_machine_uid(&paths).map_err(|error| error.to_string())?;
    println!("{uid}");
    Ok(())
}

fn print_help() {
    println!("machine_uid");
    println!();
    println!("Prints the identity this controller claims in the device collection.");
    println!();
    println!("Usage:");
    println!("  cargo run --bin machine_uid -- [--path <file>]...");
    println!();
    println!("Options:");
    println!("  --path <file>   machine id source, repeatable (default: dbus then /etc)");
}
