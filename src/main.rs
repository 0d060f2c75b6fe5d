fn main() {
  penplus_probe_lib::run()
}
