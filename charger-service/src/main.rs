fn main() {
    if let Err(err) = edge_charger::app::run() {
        eprintln!("charger controller stopped: {err}");
        std::process::exit(1);
    }
}
