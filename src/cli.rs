use std::fmt::{self, Display, Formatter};

use crate::http::{Method, Request, RequestMode};
use cache::{CacheCommand, CacheOptions};

use clap::{Parser, ValueEnum};

pub mod cache;

#[derive(Parser)]
#[command(about = "Offline resource cache for web applications", version)]
struct Args {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(Clone, Parser)]
#[clap(next_help_heading = "Global options")]
struct GlobalArgs {
    /// Path to the configuration file. Defaults to
    /// ~/.config/swcache/config.toml
    #[clap(long, global = true, value_name = "PATH")]
    pub config: Option<String>,
    /// Application table to read from the configuration file
    #[clap(long, global = true, default_value = "default", value_name = "NAME")]
    pub app: String,
    /// Verbose mode. Logs go to STDERR, honoring RUST_LOG
    #[clap(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Parser)]
enum Command {
    #[clap(about = "Precache the manifest into the configured version")]
    Install(InstallCommand),
    #[clap(about = "Make an installed version current and remove the others")]
    Activate(ActivateCommand),
    #[clap(about = "Resolve a request cache-first, falling back to the network")]
    Fetch(FetchCommand),
    #[clap(about = "Inspect the local cache")]
    Cache(CacheCommand),
}

#[derive(Parser)]
struct InstallCommand {
    /// Activate the new version right after installing it
    #[clap(long)]
    pub activate: bool,
}

#[derive(Parser)]
struct ActivateCommand {
    /// Version to activate. Defaults to the configured version
    #[clap()]
    pub version: Option<String>,
}

#[derive(Parser)]
struct FetchCommand {
    /// Absolute URL or path relative to the configured origin
    #[clap()]
    pub url: String,
    /// HTTP method
    #[clap(long, short = 'X', value_enum, default_value_t = MethodCli::Get)]
    pub method: MethodCli,
    /// Treat the request as a page navigation. Offline navigations are
    /// answered with the offline fallback page
    #[clap(long)]
    pub navigate: bool,
    /// Print the status line and headers before the body
    #[clap(long, short)]
    pub include: bool,
}

#[derive(ValueEnum, Clone, Debug)]
enum MethodCli {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Display for MethodCli {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MethodCli::Get => write!(f, "get"),
            MethodCli::Head => write!(f, "head"),
            MethodCli::Post => write!(f, "post"),
            MethodCli::Put => write!(f, "put"),
            MethodCli::Patch => write!(f, "patch"),
            MethodCli::Delete => write!(f, "delete"),
        }
    }
}

impl From<MethodCli> for Method {
    fn from(method: MethodCli) -> Self {
        match method {
            MethodCli::Get => Method::GET,
            MethodCli::Head => Method::HEAD,
            MethodCli::Post => Method::POST,
            MethodCli::Put => Method::PUT,
            MethodCli::Patch => Method::PATCH,
            MethodCli::Delete => Method::DELETE,
        }
    }
}

pub struct CliArgs {
    pub config: Option<String>,
    pub app: String,
    pub verbose: bool,
}

pub struct OptionArgs {
    pub cli_options: CliOptions,
    pub cli_args: CliArgs,
}

pub enum CliOptions {
    Install(InstallOptions),
    Activate(ActivateOptions),
    Fetch(FetchOptions),
    Cache(CacheOptions),
}

pub struct InstallOptions {
    pub activate: bool,
}

pub struct ActivateOptions {
    pub version: Option<String>,
}

pub struct FetchOptions {
    pub request: Request,
    pub include: bool,
}

pub fn parse_cli() -> OptionArgs {
    Args::parse().into()
}

// From impls - private clap structs to public domain structs. Keeps clap
// from leaking further down the stack.

impl From<Args> for OptionArgs {
    fn from(args: Args) -> Self {
        let cli_options = match args.command {
            Command::Install(options) => CliOptions::Install(options.into()),
            Command::Activate(options) => CliOptions::Activate(options.into()),
            Command::Fetch(options) => CliOptions::Fetch(options.into()),
            Command::Cache(options) => CliOptions::Cache(options.into()),
        };
        OptionArgs {
            cli_options,
            cli_args: args.global_args.into(),
        }
    }
}

impl From<GlobalArgs> for CliArgs {
    fn from(args: GlobalArgs) -> Self {
        CliArgs {
            config: args.config,
            app: args.app,
            verbose: args.verbose,
        }
    }
}

impl From<InstallCommand> for InstallOptions {
    fn from(options: InstallCommand) -> Self {
        InstallOptions {
            activate: options.activate,
        }
    }
}

impl From<ActivateCommand> for ActivateOptions {
    fn from(options: ActivateCommand) -> Self {
        ActivateOptions {
            version: options.version,
        }
    }
}

impl From<FetchCommand> for FetchOptions {
    fn from(options: FetchCommand) -> Self {
        let mut request = Request::new(&options.url, options.method.into());
        if options.navigate {
            request.mode = RequestMode::Navigate;
        }
        FetchOptions {
            request,
            include: options.include,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> OptionArgs {
        Args::try_parse_from(args).unwrap().into()
    }

    #[test]
    fn test_global_args_defaults() {
        let options = parse(&["swc", "install"]);
        assert_eq!("default", options.cli_args.app);
        assert!(options.cli_args.config.is_none());
        assert!(!options.cli_args.verbose);
        match options.cli_options {
            CliOptions::Install(options) => assert!(!options.activate),
            _ => panic!("Expected install options"),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let options = parse(&[
            "swc",
            "activate",
            "v2",
            "--app",
            "space-explorer",
            "--config",
            "/tmp/swc.toml",
            "-v",
        ]);
        assert_eq!("space-explorer", options.cli_args.app);
        assert_eq!(Some("/tmp/swc.toml".to_string()), options.cli_args.config);
        assert!(options.cli_args.verbose);
        match options.cli_options {
            CliOptions::Activate(options) => assert_eq!(Some("v2".to_string()), options.version),
            _ => panic!("Expected activate options"),
        }
    }

    #[test]
    fn test_fetch_options() {
        let options = parse(&["swc", "fetch", "/planets", "--navigate", "-X", "head", "-i"]);
        match options.cli_options {
            CliOptions::Fetch(options) => {
                assert!(options.include);
                assert!(options.request.is_navigation());
                assert_eq!(Method::HEAD, options.request.method);
                assert_eq!("/planets", options.request.url());
            }
            _ => panic!("Expected fetch options"),
        }
    }

    #[test]
    fn test_fetch_defaults_to_get_subresource() {
        let options = parse(&["swc", "fetch", "http://localhost/app.js"]);
        match options.cli_options {
            CliOptions::Fetch(options) => {
                assert!(!options.include);
                assert!(!options.request.is_navigation());
                assert_eq!(Method::GET, options.request.method);
            }
            _ => panic!("Expected fetch options"),
        }
    }

    #[test]
    fn test_cache_list_options() {
        let options = parse(&["swc", "cache", "list", "v1"]);
        match options.cli_options {
            CliOptions::Cache(CacheOptions::List { generation }) => {
                assert_eq!(Some("v1".to_string()), generation)
            }
            _ => panic!("Expected cache list options"),
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        assert!(Args::try_parse_from(["swc", "fetch", "/", "-X", "trace"]).is_err());
    }
}
