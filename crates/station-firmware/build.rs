//! Bake WiFi settings from the environment (or a `.env` file) into the binary.
//!
//! `WIFI_SSID` and `WIFI_PASS` are required. The numeric settings are checked
//! here so a typo fails the build instead of the boot; the auth mode name is
//! validated at startup by `station_core::config`.

const REQUIRED: [&str; 2] = ["WIFI_SSID", "WIFI_PASS"];
const OPTIONAL: [&str; 3] = ["WIFI_AUTH_MODE", "WIFI_MAX_RETRY", "WIFI_CONNECT_TIMEOUT_MS"];

fn main() {
    // Searches upwards from the crate, so a workspace-level .env works too.
    match dotenvy::dotenv() {
        Ok(path) => println!("cargo:rerun-if-changed={}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => panic!("failed to read .env: {err}"),
    }

    for key in REQUIRED {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => println!("cargo:rustc-env={key}={value}"),
            _ => panic!("{key} must be set in .env or the environment (see .env.example)"),
        }
    }

    for key in OPTIONAL {
        println!("cargo:rerun-if-env-changed={key}");
        let Ok(value) = std::env::var(key) else {
            continue;
        };
        match key {
            "WIFI_MAX_RETRY" => {
                value
                    .trim()
                    .parse::<u32>()
                    .unwrap_or_else(|_| panic!("{key} must be a non-negative integer"));
            }
            "WIFI_CONNECT_TIMEOUT_MS" => {
                let timeout = value
                    .trim()
                    .parse::<u64>()
                    .unwrap_or_else(|_| panic!("{key} must be an integer number of milliseconds"));
                assert!(timeout > 0, "{key} must be greater than zero");
            }
            _ => {}
        }
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
