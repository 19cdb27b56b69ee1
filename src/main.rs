fn main() {
    tdms_pipeline::cli::run();
}
