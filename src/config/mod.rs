//! Configuration loading.
//!
//! Settings are layered: built-in defaults, then an optional file
//! (`config/default.toml` and friends), then `FANOUT__*` environment variables
//! such as `FANOUT__SERVER__PORT=9000`.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{LogSettings, ServerSettings, Settings, StreamSettings};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FANOUT";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the file at `path` (extension optional, file
/// optional) and environment variables, merged over the defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = partial.merge(Settings::default());
    settings.stream.validate()?;

    Ok(settings)
}
