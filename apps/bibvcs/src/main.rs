//! bibvcs - BibTeX databases under version control
//!
//! Command-line front end: run the consistency checks, maintain the journal
//! registry and keep the bib file in canonical form.

use std::path::PathBuf;
use std::process::ExitCode;

use bibvcs_bibtex::{Journal, JournalStyle};
use bibvcs_core::{CommitGate, Database, UserConfig};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bibvcs", version, about)]
struct Cli {
    /// Database directory (defaults to the stored default, then the current directory)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run all consistency checks; exits with status 1 if any check fails
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit the journal registry
    #[command(subcommand)]
    Journals(JournalsCommand),

    /// Rewrite the bib file with every entry in canonical form
    Format {
        /// Only report whether the file is already formatted
        #[arg(long)]
        check: bool,
    },

    /// Remember the database as the default for later invocations
    SetDefault,
}

#[derive(Debug, Subcommand)]
enum JournalsCommand {
    /// List all journals
    List,

    /// Regenerate the full and abbreviated macro files
    Generate,

    /// Add a journal and regenerate the macro files
    Add {
        /// Macro name used in journal fields
        macro_name: String,
        /// Full journal name
        #[arg(long)]
        full: String,
        /// Abbreviated journal name
        #[arg(long)]
        abbr: String,
    },

    /// Remove a journal and regenerate the macro files
    Remove { macro_name: String },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let root = database_root(cli.database)?;
    debug!("using database {}", root.display());

    match cli.command {
        Command::Check { json } => run_check(root, json),
        Command::Journals(command) => run_journals(root, command),
        Command::Format { check } => run_format(root, check),
        Command::SetDefault => run_set_default(root),
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn database_root(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    let user = UserConfig::load()?;
    Ok(user.default_database.unwrap_or_else(|| PathBuf::from(".")))
}

fn run_check(root: PathBuf, json: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let database = Database::open(root)?;
    let gate = CommitGate::for_database(&database);
    let report = gate.engine().run_all(&database.snapshot()?);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_journals(root: PathBuf, command: JournalsCommand) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut database = Database::open(root)?;
    match command {
        JournalsCommand::List => {
            for journal in database.journals().iter() {
                println!(
                    "{}\t{}\t{}",
                    journal.macro_name,
                    journal.name(JournalStyle::Abbreviated),
                    journal.name(JournalStyle::Full)
                );
            }
        }
        JournalsCommand::Generate => {
            for path in database.write_journal_macros()? {
                println!("wrote {}", path.display());
            }
        }
        JournalsCommand::Add {
            macro_name,
            full,
            abbr,
        } => {
            database
                .journals_mut()
                .add(Journal::new(macro_name, full, abbr))?;
            database.save_journals()?;
        }
        JournalsCommand::Remove { macro_name } => {
            database.journals_mut().remove(&macro_name)?;
            database.save_journals()?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_format(root: PathBuf, check_only: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut database = Database::open(root)?;
    let path = database.bib_path();
    let current = std::fs::read_to_string(&path)?;
    database.bibliography_mut().reformat();
    let formatted = database.bibliography().serialize();

    if formatted == current {
        info!("{} is already formatted", path.display());
        return Ok(ExitCode::SUCCESS);
    }
    if check_only {
        println!("{} is not formatted", path.display());
        return Ok(ExitCode::FAILURE);
    }
    database.save()?;
    println!("formatted {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn run_set_default(root: PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Fail early on directories that are not databases
    Database::open(&root)?;
    let root = std::fs::canonicalize(&root)?;
    let user = UserConfig {
        default_database: Some(root.clone()),
    };
    let path = user.save()?;
    println!("default database set to {} in {}", root.display(), path.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_journal_add() {
        let cli = Cli::parse_from([
            "bibvcs",
            "-d",
            "refs",
            "journals",
            "add",
            "JCSS",
            "--full",
            "Journal of Computer and System Sciences",
            "--abbr",
            "J. Comput. Syst. Sci.",
        ]);
        assert_eq!(cli.database, Some(PathBuf::from("refs")));
        match cli.command {
            Command::Journals(JournalsCommand::Add { macro_name, .. }) => {
                assert_eq!(macro_name, "JCSS")
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_check_json() {
        let cli = Cli::parse_from(["bibvcs", "check", "--json", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Check { json: true }));
    }
}
