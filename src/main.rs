fn main() {
    if let Err(err) = tourguard_lib::run() {
        eprintln!("tourguard: {err:#}");
        std::process::exit(1);
    }
}
