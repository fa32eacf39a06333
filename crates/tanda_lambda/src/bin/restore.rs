use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use chrono::Utc;
use clap::Parser;
use tanda_core::backup::{parse_tables_config, LocalRestoreStatus, TableConfig};
use tanda_lambda::adapters::dynamodb::DynamoDbStore;
use tanda_lambda::adapters::s3::S3ObjectStore;
use tanda_lambda::handlers::restore::{local_restore_tables, restore_from_folder, RestoreService};

const RESTORE_ROLE: &str = "DynamoDBRestoreRole";
const LISTED_BACKUPS: usize = 5;

#[derive(Parser, Debug)]
#[command(
    name = "restore",
    about = "Restore DynamoDB tables from S3 backups or a local folder",
    long_about = "Restores the gzip archives written by the scheduled backup.\n\
                  With --folder, archives are read from a local directory instead of S3."
)]
struct Cli {
    /// Bucket holding the backups
    #[arg(long, env = "BACKUP_BUCKET")]
    bucket: Option<String>,
    /// Backup date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,
    /// Environment prefix of the backup keys
    #[arg(long, default_value = "production")]
    environment: String,
    /// Region of the backup bucket
    #[arg(long, default_value = "us-east-1")]
    source_region: String,
    /// Region of the tables to restore into
    #[arg(long, default_value = "us-east-1")]
    target_region: String,
    /// Account to restore into through the restore role
    #[arg(long)]
    target_account: Option<String>,
    /// Table configuration: a JSON file path or inline JSON
    #[arg(long)]
    tables: Option<String>,
    /// Validate archives without writing
    #[arg(long)]
    dry_run: bool,
    /// List available backups and exit
    #[arg(long)]
    list_backups: bool,
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
    /// Restore from archives in a local folder
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Single table for a local folder restore
    #[arg(long)]
    table: Option<String>,
}

fn load_tables(raw: &str) -> Result<Vec<TableConfig>, String> {
    let text = match std::fs::read_to_string(raw) {
        Ok(text) => text,
        Err(error) if error.kind() == io::ErrorKind::NotFound => raw.to_string(),
        Err(error) => return Err(format!("failed to read {raw}: {error}")),
    };
    parse_tables_config(&text).map_err(|error| error.message().to_string())
}

async fn source_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

async fn target_config(region: &str, account: Option<&str>) -> SdkConfig {
    let Some(account) = account else {
        return source_config(region).await;
    };
    let base = source_config(region).await;
    let role_arn = format!("arn:aws:iam::{account}:role/{RESTORE_ROLE}");
    tracing::info!(component = "restore", event = "assuming_role", role_arn = %role_arn);
    let provider = AssumeRoleProvider::builder(role_arn)
        .session_name("dynamodb-restore")
        .region(Region::new(region.to_string()))
        .configure(&base)
        .build()
        .await;
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(provider)
        .load()
        .await
}

fn confirmed(prompt: &str) -> bool {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("yes")
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("failed to render report: {error}"),
    }
}

async fn restore_local(cli: &Cli, folder: &Path) -> ExitCode {
    let tables = match &cli.table {
        Some(table) => vec![table.clone()],
        None => local_restore_tables(),
    };
    if !cli.yes && !confirmed(&format!(
        "Restaurar {} tabla(s) desde {} en {}. ¿Continuar? (yes/no): ",
        tables.len(),
        folder.display(),
        cli.target_region
    )) {
        println!("Restauración cancelada");
        return ExitCode::SUCCESS;
    }

    let target = target_config(&cli.target_region, cli.target_account.as_deref()).await;
    let store = DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&target));

    match restore_from_folder(&store, folder, &tables) {
        Ok(results) => {
            print_json(&results);
            if results
                .iter()
                .all(|result| result.status == LocalRestoreStatus::Ok)
            {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

async fn restore_remote(cli: &Cli) -> ExitCode {
    let Some(bucket) = cli.bucket.as_deref() else {
        eprintln!("--bucket is required unless --folder is given");
        return ExitCode::FAILURE;
    };
    let Some(raw_tables) = cli.tables.as_deref() else {
        eprintln!("--tables is required unless --folder is given");
        return ExitCode::FAILURE;
    };
    let tables = match load_tables(raw_tables) {
        Ok(tables) => tables,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let source = source_config(&cli.source_region).await;
    let target = target_config(&cli.target_region, cli.target_account.as_deref()).await;
    let objects = S3ObjectStore::new(bucket, aws_sdk_s3::Client::new(&source));
    let store = DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&target));
    let service = RestoreService::new(&objects, &store, ".", Utc::now());

    if cli.list_backups {
        println!("Backups disponibles en {bucket}");
        for table in &tables {
            match service.list_backups(&cli.environment, Some(&table.name)) {
                Ok(backups) => {
                    println!("\n{} ({} backups):", table.name, backups.len());
                    for backup in backups.iter().take(LISTED_BACKUPS) {
                        println!("  {}", backup.key);
                        println!(
                            "     Tamaño: {} MB | Fecha: {}",
                            backup.size_mb, backup.last_modified
                        );
                        println!("     Storage: {}", backup.storage_class);
                    }
                }
                Err(error) => {
                    eprintln!("{}: {error}", table.name);
                    return ExitCode::FAILURE;
                }
            }
        }
        return ExitCode::SUCCESS;
    }

    let Some(date) = cli.date.as_deref() else {
        eprintln!("--date is required for a restore");
        return ExitCode::FAILURE;
    };
    if !cli.dry_run
        && !cli.yes
        && !confirmed(&format!(
            "Se restaurarán {} tabla(s) del backup {date} en {}. ¿Continuar? (yes/no): ",
            tables.len(),
            cli.target_region
        ))
    {
        println!("Restauración cancelada");
        return ExitCode::SUCCESS;
    }

    let report = service.restore_from_date(date, &tables, &cli.environment, cli.dry_run);
    print_json(&report);
    if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tanda_lambda::logging::init();
    let cli = Cli::parse();
    match cli.folder.clone() {
        Some(folder) => restore_local(&cli, &folder).await,
        None => restore_remote(&cli).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_accept_inline_json() {
        let tables = load_tables(r#"[{"name":"tandas","pk":"id","target_name":"tandas-dr"}]"#)
            .expect("tables");
        assert_eq!(tables[0].restore_target(), "tandas-dr");
    }

    #[test]
    fn tables_read_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tables.json");
        std::fs::write(&path, r#"[{"name":"pagos","pk":"id","sk":"pagoId"}]"#).expect("write");
        let tables = load_tables(path.to_str().expect("utf8 path")).expect("tables");
        assert_eq!(tables[0].sk.as_deref(), Some("pagoId"));
    }

    #[test]
    fn parses_local_restore_flags() {
        let cli = Cli::parse_from(["restore", "--folder", "/tmp/backups", "--table", "pagos", "--yes"]);
        assert_eq!(cli.folder, Some(PathBuf::from("/tmp/backups")));
        assert_eq!(cli.table.as_deref(), Some("pagos"));
        assert!(cli.yes);
        assert_eq!(cli.environment, "production");
    }
}
