use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use env_logger::Env;
use swcache::{
    cache::FileCache,
    cli::{parse_cli, CliOptions},
    cmds,
    config::Config,
    error::{AddContext, SWError},
    http::Client,
    worker::OfflineCache,
    Result,
};

const CONFIG_PATH: &str = ".config/swcache/config.toml";

fn config_path(path: Option<String>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(PathBuf::from(path)),
        None => {
            let home_dir = std::env::var("HOME").err_context(SWError::ConfigurationError(
                "HOME is not set, use --config to locate the config file".to_string(),
            ))?;
            Ok(Path::new(&home_dir).join(CONFIG_PATH))
        }
    }
}

fn main() -> Result<()> {
    let option_args = parse_cli();
    let cli_args = option_args.cli_args;
    if cli_args.verbose {
        let env = Env::default().default_filter_or("info");
        env_logger::init_from_env(env);
    }
    let config_file = config_path(cli_args.config)?;
    let f = File::open(&config_file).err_context(SWError::ConfigurationError(format!(
        "Unable to open config file {}",
        config_file.display()
    )))?;
    let config = Arc::new(Config::new(f, &cli_args.app)?);
    let storage = Arc::new(FileCache::new(config.clone()));
    storage.validate_cache_location()?;

    let stdout = std::io::stdout();
    match option_args.cli_options {
        CliOptions::Cache(options) => {
            cmds::cache::execute(options, &storage, config.as_ref(), stdout.lock())
        }
        cli_options => {
            let cache = OfflineCache::new(storage, Client::new(config.clone()), config)?;
            let result = match cli_options {
                CliOptions::Install(options) => {
                    cmds::install::install(options, &cache, stdout.lock())
                }
                CliOptions::Activate(options) => {
                    cmds::install::activate(options, &cache, stdout.lock())
                }
                CliOptions::Fetch(options) => cmds::fetch::execute(options, &cache, stdout.lock()),
                // Cache inspection is handled above without a network client.
                CliOptions::Cache(_) => unreachable!(),
            };
            cache.flush();
            result
        }
    }
}
