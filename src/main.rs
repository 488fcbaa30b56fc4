fn main() {
    if let Err(err) = sheet_master::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
