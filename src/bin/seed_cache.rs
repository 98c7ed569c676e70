use std::path::Path;

use edge_charger::adapters::record_cache::{JsonFileCache, RecordCache};
use edge_charger::domain::device_record::DeviceRecord;

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to seed cache: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = "./data/device.json".to_string();
    let mut id = String::new();
    let mut force = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--id" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--id requires a value".to_string());
                };
                id = value.trim().to_string();
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
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

    let path_ref = Path::new(&path);
    if path_ref.exists() && !force {
        return Err(format!("{path} already exists, pass --force to overwrite"));
    }
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    let record = DeviceRecord {
        id,
        ..DeviceRecord::default()
    };
    JsonFileCache::new(path_ref)
        .save(&record)
        .map_err(|error| error.to_string())?;

    if record.id.is_empty() {
        println!("created cache at {path}; the device will be located by machine uid");
    } else {
        println!("created cache at {path} for document {}", record.id);
    }
    Ok(())
}

fn print_help() {
    println!("seed_cache");
    println!();
    println!("Usage:");
    println!("  cargo run --bin seed_cache -- [--path <file>] [--id <document id>] [--force]");
    println!();
    println!("Options:");
    println!("  --path <file>   cache file to create (default: ./data/device.json)");
    println!("  --id <id>       document id to try first at boot (default: none)");
    println!("  --force         overwrite an existing cache file");
}
