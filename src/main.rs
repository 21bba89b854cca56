fn main() {
    seismic_prep::cli::run();
}
