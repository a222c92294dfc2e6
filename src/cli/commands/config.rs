use crate::cli::Context;
use crate::config::Config;
use crate::errors::AppResult;

/// Handle the `config` subcommand
pub fn handle(ctx: &Context, print_config: bool) -> AppResult<()> {
    if print_config {
        println!("📄 Current configuration ({}):\n", Config::config_file().display());
        println!("{}", serde_yaml::to_string(&ctx.cfg)?);
    } else {
        println!("{}", Config::config_file().display());
    }
    Ok(())
}
