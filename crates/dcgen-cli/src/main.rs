//! dcgen Command-Line Client
//!
//! Inspects and rearranges record trees described by a JSON definition and
//! stored in a local sled database.

mod commands;
mod error;
mod formatter;

use clap::{Parser, Subcommand};
use dcgen_core::ClipboardAction;
use formatter::OutputFormat;
use std::path::PathBuf;

/// dcgen Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "dcgen")]
#[command(version, about = "Relationship, sorting and clipboard tooling for record trees")]
pub struct Args {
    /// Data directory of the sled database
    #[arg(short = 'd', long, default_value = "dcgen-data")]
    pub data: PathBuf,

    /// JSON definition of the record types
    #[arg(short = 'D', long)]
    pub definition: PathBuf,

    /// Use a temporary database that is removed on exit
    #[arg(long)]
    pub temporary: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Print persist notifications after mutations
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate the definition
    Check,

    /// Save a record directly, bypassing sorting
    Add {
        /// Record type, the root type when omitted
        #[arg(long = "type")]
        record_type: Option<String>,

        /// Parent record id
        #[arg(long)]
        parent: Option<String>,

        /// Properties as KEY=VALUE; values are parsed as JSON scalars when possible
        #[arg(value_name = "KEY=VALUE")]
        properties: Vec<String>,
    },

    /// Print the record tree
    Tree {
        /// Start below this record instead of at the roots
        #[arg(long)]
        root: Option<String>,

        /// Expand every node
        #[arg(long)]
        expand_all: bool,

        /// Expand a single node (repeatable)
        #[arg(long = "expand", value_name = "ID")]
        expand: Vec<String>,
    },

    /// List the ordered siblings of a record
    Siblings {
        /// Record id, e.g. tl_page::4
        id: String,
    },

    /// Create, move or copy records to a position
    Paste {
        /// create, cut, copy or deep-copy
        #[arg(long)]
        action: ClipboardAction,

        /// Source record id (cut and copies)
        #[arg(long)]
        source: Option<String>,

        /// Record type of created records, the root type when omitted
        #[arg(long = "type")]
        record_type: Option<String>,

        /// Parent the records are meant for
        #[arg(long)]
        parent: Option<String>,

        /// Place directly after this sibling
        #[arg(long)]
        after: Option<String>,

        /// Place at the front of this parent's children
        #[arg(long)]
        into: Option<String>,

        /// Place at the front of the top level, or of the given parent
        #[arg(long, num_args = 0..=1, default_missing_value = "", value_name = "ID")]
        top: Option<String>,
    },
}

fn main() {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dcgen_cli=info,dcgen_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, error::CliError> {
    let workspace = commands::Workspace::open(args)?;
    let formatter = formatter::create_formatter(args.format);

    match &args.command {
        Command::Check => commands::check(&workspace, &*formatter),
        Command::Add {
            record_type,
            parent,
            properties,
        } => commands::add(
            &workspace,
            &*formatter,
            record_type.as_deref(),
            parent.as_deref(),
            properties,
        ),
        Command::Tree {
            root,
            expand_all,
            expand,
        } => commands::tree(&workspace, &*formatter, root.as_deref(), *expand_all, expand),
        Command::Siblings { id } => commands::siblings(&workspace, &*formatter, id),
        Command::Paste {
            action,
            source,
            record_type,
            parent,
            after,
            into,
            top,
        } => {
            let request = commands::PasteRequest {
                action: *action,
                source: source.as_deref(),
                record_type: record_type.as_deref(),
                parent: parent.as_deref(),
                after: after.as_deref(),
                into: into.as_deref(),
                top: top.as_deref(),
            };
            commands::paste(&workspace, &*formatter, &request, args.verbose)
        }
    }
}
