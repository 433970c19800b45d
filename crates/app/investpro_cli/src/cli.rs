use std::path::PathBuf;

use clap::{Parser, Subcommand};
use investpro_core::Scope;

#[derive(Parser, Debug)]
#[command(name = "investpro", version, about = "InvestPro session command line")]
pub struct Cli {
    /// Directory holding the session file
    #[arg(long, global = true, env = "INVESTPRO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Customer API root, also used for admin unless --admin-api-url is given
    #[arg(long, global = true, env = "INVESTPRO_API_BASE_URL")]
    pub api_url: Option<String>,

    /// Admin API root
    #[arg(long, global = true, env = "INVESTPRO_ADMIN_API_BASE_URL")]
    pub admin_api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore the stored session and print who is logged in
    Status,

    /// Log in as a customer or an admin, replacing any other session
    Login {
        /// `customer` or `admin`
        scope: Scope,

        #[arg(long)]
        email: String,

        #[arg(long, env = "INVESTPRO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the current session
    Logout,

    /// Print the logged-in profile as JSON
    Whoami,

    /// Print version
    Version,
}
