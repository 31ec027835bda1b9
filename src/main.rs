fn main() {
  readlog_lib::run();
}
