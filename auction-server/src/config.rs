use {
    crate::auction::service::LifecycleConfig,
    anyhow::Result,
    clap::{
        crate_authors,
        crate_description,
        crate_name,
        crate_version,
        Args,
        Parser,
    },
    std::{
        fs,
        time::Duration,
    },
};

mod lifecycle;
mod notification;
mod server;

// `Options` is a structup definition to provide clean command-line args for the auction server.
#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
#[allow(clippy::large_enum_variant)]
pub enum Options {
    /// Run the auction server service.
    Run(RunOptions),
    /// Run the database migrations and exit.
    Migrate(MigrateOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Server Options
    #[command(flatten)]
    pub server: server::Options,

    #[command(flatten)]
    pub lifecycle: lifecycle::Options,

    #[command(flatten)]
    pub notification: notification::Options,

    #[command(flatten)]
    pub config: ConfigOptions,
}

#[derive(Args, Clone, Debug)]
pub struct MigrateOptions {
    /// database url for persistent storage.
    #[arg(long = "database-url")]
    #[arg(env = "DATABASE_URL")]
    pub database_url: String,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Config Options")]
#[group(id = "Config")]
pub struct ConfigOptions {
    /// Path to a configuration file with the lifecycle windows. Defaults are used without it.
    #[arg(long = "config")]
    #[arg(env = "LIVE_AUCTION_CONFIG")]
    pub config: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub lifecycle: LifecycleFileConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        // Open and read the YAML file
        let yaml_content = fs::read_to_string(path)?;
        Self::parse(&yaml_content)
    }

    fn parse(yaml_content: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(yaml_content)?;
        Ok(config)
    }

    /// Lifecycle settings of the file, with the interval taken from the command line when set.
    pub fn lifecycle_config(&self, options: &lifecycle::Options) -> LifecycleConfig {
        let file = &self.lifecycle;
        LifecycleConfig {
            interval:        options.interval.unwrap_or(file.interval),
            catch_up_window: file.catch_up_window,
            start_soon_lead: file.start_soon_lead,
            ends_soon_lead:  file.ends_soon_lead,
            soon_tolerance:  file.soon_tolerance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LifecycleFileConfig {
    /// Time between two lifecycle sweeps.
    #[serde(with = "humantime_serde")]
    pub interval:        Duration,
    /// How far back started and ended auctions are re-checked for missing notifications.
    #[serde(with = "humantime_serde")]
    pub catch_up_window: Duration,
    /// How long before the start of an auction its participants are reminded.
    #[serde(with = "humantime_serde")]
    pub start_soon_lead: Duration,
    /// How long before the end of an auction its participants are reminded.
    #[serde(with = "humantime_serde")]
    pub ends_soon_lead:  Duration,
    #[serde(with = "humantime_serde")]
    pub soon_tolerance:  Duration,
}

impl Default for LifecycleFileConfig {
    fn default() -> Self {
        let defaults = LifecycleConfig::default();
        Self {
            interval:        defaults.interval,
            catch_up_window: defaults.catch_up_window,
            start_soon_lead: defaults.start_soon_lead,
            ends_soon_lead:  defaults.ends_soon_lead,
            soon_tolerance:  defaults.soon_tolerance,
        }
    }
}
