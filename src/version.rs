use std::sync::LazyLock;

/// Version of the software: the Cargo package version, with the git commit appended when
/// `FGSCREEN_GIT_HASH` was set at build time.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("FGSCREEN_GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{version}-{hash}"),
        _ => version.to_string(),
    }
});
