pub mod cable_detector;
pub mod device_store;
pub mod firestore;
pub mod firestore_value;
pub mod gpio;
pub mod host_power;
pub mod machine_id;
pub mod record_cache;
pub mod relay_bank;
