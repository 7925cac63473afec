pub const APP_NAME: &str = "Precios Admin";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_DESCRIBE: Option<&str> = option_env!("PRECIOS_BUILD_DESCRIBE");

/// `git describe` output when it names a tag, otherwise the crate version
/// with the commit appended as build metadata.
pub fn version_label() -> String {
    label_for(BUILD_DESCRIBE, APP_VERSION)
}

fn label_for(describe: Option<&str>, version: &str) -> String {
    match describe {
        Some(tagged) if tagged.starts_with('v') => tagged.to_string(),
        Some(commit) => format!("v{version}+{commit}"),
        None => format!("v{version}"),
    }
}
