use {
    clap::Args,
    humantime_serde::re::humantime,
    std::time::Duration,
};

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Lifecycle Options")]
#[group(id = "Lifecycle")]
pub struct Options {
    /// Time between two lifecycle sweeps, e.g. `30s`. Overrides the config file.
    #[arg(long = "lifecycle-interval")]
    #[arg(env = "LIFECYCLE_INTERVAL")]
    #[arg(value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}
