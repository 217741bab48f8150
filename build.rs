use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=src");

    // Delete stale log file if it exists
    if Path::new("tutorlink.log").exists() {
        fs::remove_file("tutorlink.log").expect("Failed to delete log file");
        println!("cargo:warning=Deleted tutorlink.log");
    }
}
