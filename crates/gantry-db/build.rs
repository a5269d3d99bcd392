//! Build script for embedded migrations.
//!
//! `sqlx::migrate!` embeds the files under `migrations/` at compile time,
//! so the crate must be rebuilt whenever one of them changes.

fn main() {
    println!("cargo:rerun-if-changed=migrations/");
}
