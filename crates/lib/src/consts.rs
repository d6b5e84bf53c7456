/// Environment variable overriding the install root.
pub const ROOT_ENV_VAR: &str = "PKGPRESS_ROOT";

/// Settings file name, looked up in the configuration directory.
pub const SETTINGS_FILENAME: &str = "pkgpress.toml";
