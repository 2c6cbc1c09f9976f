use anyhow::Result;
use clap::{Parser, Subcommand};
use server_api::auth::hash_password;
use shared::domain::Role;
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/transfers.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update a dashboard account. Re-running for an existing
    /// username rotates its password and role/branch assignment.
    CreateAccount {
        username: String,
        password: String,
        role: String,
        branch_code: String,
        #[arg(long)]
        display_name: Option<String>,
    },
    ListAccounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateAccount {
            username,
            password,
            role,
            branch_code,
            display_name,
        } => {
            let role =
                Role::parse(&role).ok_or_else(|| anyhow::anyhow!("unknown role '{role}'"))?;
            let display_name = display_name.unwrap_or_else(|| username.clone());
            let account_id = storage
                .create_account(
                    &username,
                    &hash_password(&password),
                    role,
                    &branch_code,
                    &display_name,
                )
                .await?;
            println!("created account id={} username={username}", account_id.0);
        }
        Command::ListAccounts => {
            for account in storage.list_accounts().await? {
                println!(
                    "{} role={} branch={}",
                    account.username,
                    account.role.as_str(),
                    account.branch_code
                );
            }
        }
    }

    Ok(())
}
