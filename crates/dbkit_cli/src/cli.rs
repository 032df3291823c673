//! Command-line interface definitions and command handlers.

use crate::demo::{DemoPublisher, PublishError, Published};
use crate::output;
use crate::scaffold::{Generated, ScaffoldError, ScaffoldRequest};
use clap::{Args, Parser, Subcommand};
use log::error;
use std::path::PathBuf;
use thiserror::Error;

/// dbkit - scaffolding and demo tools for dbkit_core projects.
#[derive(Parser, Debug)]
#[command(name = "dbkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level written to stderr (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish the demo project into a directory
    #[command(name = "demo-publish", visible_alias = "dp")]
    DemoPublish(DemoPublishArgs),

    /// Generate a record and repository source pair
    #[command(name = "template-generate", visible_alias = "tg")]
    TemplateGenerate(TemplateGenerateArgs),
}

/// Arguments for the `demo-publish` subcommand.
#[derive(Args, Debug)]
pub struct DemoPublishArgs {
    /// Output directory; the demo lands in `<DIR>/demo`
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Replace an existing demo directory
    #[arg(short, long)]
    pub force: bool,

    /// Show every published file with its full path
    #[arg(short, long)]
    pub verbose: bool,

    /// Publish from this tree instead of the bundled demo
    #[arg(long, hide = true)]
    pub source: Option<PathBuf>,
}

/// Arguments for the `template-generate` subcommand.
#[derive(Args, Debug)]
pub struct TemplateGenerateArgs {
    /// Record name, starting with an uppercase letter (e.g. User, BlogPost)
    pub name: String,

    /// Directory for record sources
    #[arg(short, long = "models", value_name = "DIR", default_value = "./models")]
    pub models_dir: PathBuf,

    /// Directory for repository sources
    #[arg(
        short,
        long = "repos",
        visible_alias = "repositories",
        value_name = "DIR",
        default_value = "./repositories"
    )]
    pub repos_dir: PathBuf,

    /// Referenced record (repeatable, e.g. --fk User --fk Category)
    #[arg(long = "fk", visible_alias = "foreign-key", value_name = "NAME")]
    pub foreign_keys: Vec<String>,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,

    /// Print next steps after generating
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Runs one subcommand, printing its outcome.
pub fn execute(command: Commands) -> Result<(), CommandError> {
    let (name, result) = match command {
        Commands::DemoPublish(args) => ("demo-publish", demo_publish(args)),
        Commands::TemplateGenerate(args) => ("template-generate", template_generate(args)),
    };
    if let Err(err) = &result {
        error!("event=command_run module=cli status=error command={name} error={err}");
        output::error(&err.to_string());
    }
    result
}

fn demo_publish(args: DemoPublishArgs) -> Result<(), CommandError> {
    let mut publisher = DemoPublisher::new(&args.output);
    if let Some(source) = args.source {
        publisher = publisher.with_source(source);
    }
    if args.verbose {
        output::note(&format!(
            "Copying demo from {} to {}",
            publisher.source().display(),
            publisher.target_dir().display()
        ));
    }

    let published = publisher.publish(args.force)?;
    print_published(&published, args.verbose);
    Ok(())
}

fn template_generate(args: TemplateGenerateArgs) -> Result<(), CommandError> {
    let request = ScaffoldRequest {
        name: args.name,
        models_dir: args.models_dir,
        repos_dir: args.repos_dir,
        foreign_keys: args.foreign_keys,
        force: args.force,
    };
    let generated = request.generate()?;
    print_generated(&generated, args.verbose);
    Ok(())
}

fn print_published(published: &Published, verbose: bool) {
    output::ok(&format!(
        "Demo files published to {}",
        published.target.display()
    ));
    output::section("Published files");
    for file in &published.files {
        output::note(&format!("{} ({} bytes)", file.path.display(), file.size));
        if verbose {
            output::note(&format!("  {}", published.target.join(&file.path).display()));
        }
    }
    if let Some(core) = &published.core_path {
        output::key_value("dbkit_core:", core.display());
    }
    if verbose {
        output::section("Next steps");
        if published.core_path.is_none() {
            output::note("Point the dbkit_core dependency in Cargo.toml at a local checkout");
            output::note("  e.g. dbkit_core = { path = \"/path/to/crates/dbkit_core\" }");
        }
        output::note(&format!(
            "cd {} && cargo run",
            published.target.display()
        ));
    }
}

fn print_generated(generated: &Generated, verbose: bool) {
    output::ok(&format!("Templates generated for {}", generated.struct_name));
    output::key_value("Record:", &generated.struct_name);
    output::key_value("Repository:", &generated.repository_name);
    output::key_value("Record file:", generated.record_file.display());
    output::key_value("Repository file:", generated.repository_file.display());
    if !generated.foreign_keys.is_empty() {
        output::key_value("Foreign keys:", generated.foreign_keys.join(", "));
    }

    if verbose {
        output::section("Next steps");
        output::note(&format!(
            "1. Edit {} and declare the record's columns in FIELDS",
            generated.record_file.display()
        ));
        if !generated.foreign_keys.is_empty() {
            output::note("   Uncomment the foreign key fields and their FIELDS entries");
        }
        output::note(&format!(
            "2. Add queries to {}",
            generated.repository_file.display()
        ));
        output::note(&format!(
            "3. Register it: db.register::<{}>(\"key\")?",
            generated.repository_name
        ));
    }
}
