use std::env;
use std::path::PathBuf;

#[allow(dead_code)]
fn print_env_error(title: &str, details: &[&str], fixes: &[&str]) {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║ VIO SDK BUILD ERROR: {:<43} ║", title);
    eprintln!("╠══════════════════════════════════════════════════════════════════╣");
    for detail in details {
        eprintln!("║ {:<66} ║", detail);
    }
    eprintln!("╠══════════════════════════════════════════════════════════════════╣");
    eprintln!("║ HOW TO FIX:                                                      ║");
    for fix in fixes {
        eprintln!("║   {:<64} ║", fix);
    }
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();
}

#[allow(dead_code)]
fn find_vio_sdk() -> Option<PathBuf> {
    let candidates = ["/opt/vio/sdk", "/usr/local/vio/sdk", "/opt/rockchip/vio/sdk"];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join("include").exists())
}

#[allow(dead_code)]
fn find_vio_lib() -> Option<PathBuf> {
    let candidates = [
        "/opt/vio/lib",
        "/usr/local/lib",
        "/usr/lib/aarch64-linux-gnu",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join("libpetcam_vio.so").exists())
}

#[allow(dead_code)]
fn print_env_diagnostics() {
    eprintln!();
    eprintln!("=== VIO SDK build diagnostics ===");
    eprintln!("VIO_SDK_DIR: {:?}", env::var("VIO_SDK_DIR").ok());
    eprintln!("VIO_LIB_DIR: {:?}", env::var("VIO_LIB_DIR").ok());
    if let Some(found) = find_vio_sdk() {
        eprintln!("auto-detected SDK at: {:?}", found);
    }
    if let Some(found) = find_vio_lib() {
        eprintln!("auto-detected lib at: {:?}", found);
    }
    eprintln!("==================================");
    eprintln!();
}

fn main() {
    // With the `vendor-sdk` feature off, we ship a dummy bindings module so the
    // HAL adapter and the rest of the workspace build on a dev machine with no
    // ISP board attached. Only boards built with `--features vendor-sdk` need
    // the SDK headers and shared library present.
    #[cfg(feature = "vendor-sdk")]
    {
        println!("cargo:rerun-if-env-changed=VIO_SDK_DIR");
        println!("cargo:rerun-if-env-changed=VIO_LIB_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = match env::var("VIO_SDK_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                if let Some(found) = find_vio_sdk() {
                    println!("cargo:warning=VIO_SDK_DIR not set, auto-detected: {}", found.display());
                    found
                } else {
                    print_env_diagnostics();
                    print_env_error(
                        "VIO_SDK_DIR not set",
                        &[
                            "The vendor-sdk feature requires the board ISP/VENC SDK.",
                            "This variable tells bindgen where to find the headers.",
                        ],
                        &["export VIO_SDK_DIR=/opt/vio/sdk"],
                    );
                    panic!("VIO_SDK_DIR must be set when the `vendor-sdk` feature is enabled");
                }
            }
        };

        let sdk_include_path = sdk_dir.join("include");
        let sdk_lib_path = match env::var("VIO_LIB_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => find_vio_lib().unwrap_or_else(|| sdk_dir.join("lib")),
        };

        if !sdk_include_path.exists() {
            print_env_diagnostics();
            print_env_error(
                "SDK include path not found",
                &[&format!("Expected headers at: {}", sdk_include_path.display())],
                &["Verify the SDK is installed and VIO_SDK_DIR points at it"],
            );
            panic!("VIO SDK include path does not exist: {:?}", sdk_include_path);
        }

        if !sdk_lib_path.exists() {
            println!("cargo:warning=VIO SDK lib path does not exist: {}", sdk_lib_path.display());
            println!("cargo:warning=linker will fall back to LIBRARY_PATH and standard search paths");
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            .allowlist_function("vio_.*")
            .allowlist_function("venc_.*")
            .allowlist_function("vdec_.*")
            .allowlist_type("VIO_.*")
            .allowlist_type("VENC_.*")
            .allowlist_type("VDEC_.*")
            .constified_enum("VIO_CHN_.*")
            .default_enum_style(bindgen::EnumVariation::Rust { non_exhaustive: false })
            .allowlist_var("VIO_.*")
            .allowlist_var("VENC_.*")
            .generate()
            .expect("unable to generate VIO SDK bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("couldn't write bindings.rs");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());
        println!("cargo:rustc-link-lib=petcam_vio");
    }
    #[cfg(not(feature = "vendor-sdk"))]
    {
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings: `vendor-sdk` feature disabled, no board SDK linked.\n",
        )
        .expect("couldn't write dummy bindings.rs");
    }
}
