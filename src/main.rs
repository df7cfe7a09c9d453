//! Entry point for the csv-paged binary.
//!
//! Delegates to [`csv_paged::run()`] and translates its `Result` into
//! process exit codes: `0` on success, `1` on any error.

fn main() {
    if csv_paged::run().is_err() {
        std::process::exit(1);
    }
}
