fn main() {
    modlink_cli::cli::modlink_main()
}
