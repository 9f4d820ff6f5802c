fn main() {
    if let Err(e) = trackbench::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(trackbench::exit_code(&e));
    }
}
