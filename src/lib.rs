pub mod config;
pub mod iperf3;
pub mod web;

const fn version_or_cargo(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Build version, overridable at compile time through `IPERF_RELAY_VERSION`.
pub const VERSION: &str = version_or_cargo(option_env!("IPERF_RELAY_VERSION"));
