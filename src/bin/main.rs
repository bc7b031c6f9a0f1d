fn main() {
    stratum_engine::main();
}
