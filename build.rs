//! Rebuilds the crate whenever a file under `migrations/` changes.
//!
//! Migrations are embedded at compile time, so their directory is tracked
//! explicitly.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
