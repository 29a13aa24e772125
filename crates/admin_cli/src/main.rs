use std::{error::Error, io::Write, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::users;
use migration::MigratorTrait;
use queue::{BUDGET_UPDATE_QUEUE, EXTRACTION_QUEUE, RESULT_QUEUE};
use sea_orm::{Database, DatabaseConnection, EntityTrait, Set};
use storage::{FilesystemStore, ObjectStore, staging};

type AnyResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "mheetang_admin")]
#[command(about = "Admin utilities for Mheetang (users, dropped messages, staged batches)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./mheetang.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Queue(Queue),
    Batch(Batch),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create {
        #[arg(long)]
        username: String,
    },
}

#[derive(Args, Debug)]
struct Queue {
    #[command(subcommand)]
    command: QueueCommand,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// List dropped messages, with the error that dropped them.
    Dropped {
        /// One of `transaction-extractor`, `transaction-extractor-result`,
        /// `budget-update`; every queue when omitted.
        #[arg(long)]
        queue: Option<String>,
    },
    /// Move a dropped message back to pending.
    Requeue {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
struct Batch {
    /// Root directory of the filesystem object store.
    #[arg(long, env = "MHEETANG__STORAGE__FILESYSTEM")]
    storage_root: PathBuf,

    #[command(subcommand)]
    command: BatchCommand,
}

#[derive(Subcommand, Debug)]
enum BatchCommand {
    /// Staged batches still waiting for a result.
    List {
        #[arg(long)]
        user: String,
    },
    /// Delete every staged image of one batch.
    Purge {
        #[arg(long)]
        user: String,
        #[arg(long)]
        batch: String,
    },
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> AnyResult<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn notice(message: &str) -> AnyResult<()> {
    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(message),
        Print("\r\n")
    )?;
    Ok(())
}

/// Read a line without echoing it; every key shows as `*`.
fn read_secret(prompt: &str) -> AnyResult<String> {
    let _raw = RawModeGuard::enter()?;
    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };
        match code {
            KeyCode::Enter => break,
            KeyCode::Backspace if buf.pop().is_some() => {
                execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
            }
            _ => {}
        }
        out.flush()?;
    }
    execute!(out, Print("\r\n"))?;
    out.flush()?;
    Ok(buf)
}

fn new_password() -> AnyResult<String> {
    for _ in 0..3 {
        let first = read_secret("Password: ")?;
        if first.is_empty() {
            notice("Password must not be empty.")?;
            continue;
        }
        if read_secret("Confirm password: ")? == first {
            return Ok(first);
        }
        notice("Passwords do not match. Try again.")?;
    }
    Err("too many attempts".into())
}

async fn connect_db(database_url: &str) -> AnyResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn create_user(db: &DatabaseConnection, username: String) -> AnyResult<()> {
    if users::Entity::find_by_id(username.clone())
        .one(db)
        .await?
        .is_some()
    {
        eprintln!("user already exists: {username}");
        std::process::exit(1);
    }
    let password = new_password()?;

    let user = users::ActiveModel {
        username: Set(username.clone()),
        password: Set(password),
    };
    users::Entity::insert(user).exec(db).await?;
    println!("created user: {username}");
    Ok(())
}

async fn list_dropped(db: &DatabaseConnection, queue: Option<String>) -> AnyResult<()> {
    let queues = match queue {
        Some(queue) => vec![queue],
        None => [EXTRACTION_QUEUE, RESULT_QUEUE, BUDGET_UPDATE_QUEUE]
            .map(String::from)
            .to_vec(),
    };
    for queue in queues {
        for message in queue::dropped(db, &queue).await? {
            println!(
                "{}\t{}\t{}\tattempts={}\t{}",
                message.id,
                message.queue,
                message.updated_at.to_rfc3339(),
                message.attempts,
                message.error.unwrap_or_default()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::User(User {
            command: UserCommand::Create { username },
        }) => {
            let db = connect_db(&cli.database_url).await?;
            create_user(&db, username).await?;
        }
        Command::Queue(Queue { command }) => {
            let db = connect_db(&cli.database_url).await?;
            match command {
                QueueCommand::Dropped { queue } => list_dropped(&db, queue).await?,
                QueueCommand::Requeue { id } => {
                    queue::requeue(&db, id).await?;
                    println!("requeued message {id}");
                }
            }
        }
        Command::Batch(Batch {
            storage_root,
            command,
        }) => {
            let store = FilesystemStore::new(storage_root);
            match command {
                BatchCommand::List { user } => {
                    for batch in staging::list_batches(&store, &user).await? {
                        println!("{batch}");
                    }
                }
                BatchCommand::Purge { user, batch } => {
                    let prefix = staging::batch_prefix(&user, &batch)?;
                    let removed = store.delete_prefix(&prefix).await?;
                    println!("removed {removed} staged objects from {prefix}");
                }
            }
        }
    }

    Ok(())
}
