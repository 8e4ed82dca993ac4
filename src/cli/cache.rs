use clap::Parser;

#[derive(Parser)]
pub struct CacheCommand {
    #[clap(subcommand)]
    subcommand: CacheSubcommand,
}

#[derive(Parser)]
enum CacheSubcommand {
    #[clap(name = "info", about = "Get local cache size, location and generations")]
    Info,
    #[clap(
        name = "list",
        about = "List generations, or the entries stored in one generation"
    )]
    List(ListGenerations),
}

#[derive(Parser)]
struct ListGenerations {
    /// Generation whose entries are listed
    #[clap()]
    generation: Option<String>,
}

pub enum CacheOptions {
    Info,
    List { generation: Option<String> },
}

impl From<CacheCommand> for CacheOptions {
    fn from(options: CacheCommand) -> Self {
        match options.subcommand {
            CacheSubcommand::Info => CacheOptions::Info,
            CacheSubcommand::List(options) => CacheOptions::List {
                generation: options.generation,
            },
        }
    }
}
