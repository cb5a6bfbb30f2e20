use anyhow::Context;
use clap::{Parser, ValueEnum};
use php_pdo::{ATTR_ERRMODE, FetchMode, FetchedRow, Pdo, PdoValue};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ErrMode {
    Silent,
    Warning,
    Exception,
}

impl ErrMode {
    fn attribute(self) -> i64 {
        match self {
            ErrMode::Silent => php_pdo::ERRMODE_SILENT,
            ErrMode::Warning => php_pdo::ERRMODE_WARNING,
            ErrMode::Exception => php_pdo::ERRMODE_EXCEPTION,
        }
    }
}

#[derive(Parser)]
#[command(name = "pdo-shell")]
#[command(about = "Interactive SQL shell over PDO drivers", long_about = None)]
struct Cli {
    /// Data source name, e.g. sqlite::memory: or mysql:host=localhost;dbname=test
    #[arg(name = "DSN")]
    dsn: String,

    #[arg(short = 'u', long)]
    user: Option<String>,

    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Run a statement and exit; may be repeated
    #[arg(short = 'e', long = "execute")]
    execute: Vec<String>,

    #[arg(long, value_enum, default_value_t = ErrMode::Warning)]
    errmode: ErrMode,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = [(ATTR_ERRMODE, PdoValue::Int(cli.errmode.attribute()))];
    let mut pdo = Pdo::new(
        &cli.dsn,
        cli.user.as_deref(),
        cli.password.as_deref(),
        &options,
    )
    .with_context(|| format!("connecting to {}", cli.dsn))?;

    if cli.execute.is_empty() {
        run_repl(&mut pdo)?;
    } else {
        for sql in &cli.execute {
            run_statement(&mut pdo, sql)?;
        }
    }
    Ok(())
}

fn run_repl(pdo: &mut Pdo) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("Connected via {}", pdo.driver_name());
    println!("Type 'exit' or 'quit' to quit");

    loop {
        match rl.readline("pdo> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                rl.add_history_entry(line)?;
                if let Err(e) = run_statement(pdo, line) {
                    println!("Error: {e}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    Ok(())
}

fn run_statement(pdo: &mut Pdo, sql: &str) -> anyhow::Result<()> {
    let Some(mut stmt) = pdo.query(sql)? else {
        let (state, code, message) = pdo.error_info();
        println!(
            "SQLSTATE[{state}] [{}]: {}",
            code.map_or_else(|| "-".to_string(), |c| c.to_string()),
            message.unwrap_or_default()
        );
        return Ok(());
    };

    if stmt.column_count() == 0 {
        println!("OK, {} row(s) affected", stmt.row_count());
        return Ok(());
    }

    let mut printed_header = false;
    let mut count = 0;
    while let Some(row) = stmt.fetch(FetchMode::Assoc)? {
        let FetchedRow::Assoc(map) = row else { continue };
        if !printed_header {
            println!("{}", map.keys().cloned().collect::<Vec<_>>().join(" | "));
            printed_header = true;
        }
        let cells: Vec<String> = map.values().map(PdoValue::to_string).collect();
        println!("{}", cells.join(" | "));
        count += 1;
    }
    println!("({count} row(s))");
    Ok(())
}
