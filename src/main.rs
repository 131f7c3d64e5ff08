fn main() {
    if let Err(err) = sheet_bridge::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
