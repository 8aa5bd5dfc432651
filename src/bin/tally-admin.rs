use anyhow::Result;
use clap::{Parser, Subcommand};
use tally::config::Config;
use tally::storage::{open_storage, StorageError};

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally report access management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allow a user id to read analytics reports
    AddUser {
        /// User ID passed as `uid` to the report endpoint
        uid: String,
        /// Contact email, informational only
        #[arg(long)]
        email: Option<String>,
    },
    /// Revoke report access for a user id
    RemoveUser {
        uid: String,
    },
    /// List all user ids with report access
    ListUsers,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Creates the schema if this is a fresh database
    let storage = open_storage(&config.database).await?;

    match cli.command {
        Commands::AddUser { uid, email } => {
            match storage.create_user(&uid, email.as_deref()).await {
                Ok(user) => println!("✓ Added user '{}'", user.uid),
                Err(StorageError::Conflict) => println!("⚠ User '{}' already exists", uid),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::RemoveUser { uid } => {
            if storage.delete_user(&uid).await? {
                println!("✓ Removed user '{}'", uid);
            } else {
                println!("⚠ User '{}' was not found", uid);
            }
        }
        Commands::ListUsers => {
            let users = storage.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<40} {:<30} {}", "User ID", "Email", "Created");
                println!("{}", "-".repeat(100));
                for user in users {
                    println!(
                        "{:<40} {:<30} {}",
                        user.uid,
                        user.email.as_deref().unwrap_or("-"),
                        user.created_at.to_rfc3339()
                    );
                }
            }
        }
    }

    Ok(())
}
