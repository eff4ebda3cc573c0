mod commands;
mod terminal;

use commands::{CommandLine, Commands, list, probe};
use terminal::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    logging::init_logging(commands.verbose)?;

    match commands.command {
        Commands::Probe(args) => probe::probe(args).await,
        Commands::List => {
            list::list();
            Ok(())
        }
    }
}
