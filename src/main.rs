fn main() {
    prompty::app::cli::run();
}
