//! Configuration loading: resource files (YAML) and user settings (TOML).
pub mod resources;
pub mod settings;
pub mod toml_loader;
