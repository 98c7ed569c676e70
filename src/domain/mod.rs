pub mod cable_debounce;
pub mod clock;
pub mod device_record;
pub mod session_policy;
