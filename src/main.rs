fn main() {
    if let Err(err) = fz_builder_lib::run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
