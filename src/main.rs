fn main() {
    std::process::exit(stepgate::run());
}
