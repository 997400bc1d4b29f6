//! Build script for the acquisition crate
//!
//! Links the vendor radio library when a hardware backend is enabled.

fn main() {
    #[cfg(feature = "uhd")]
    {
        println!("cargo:rustc-link-lib=uhd");
    }
}
