use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::{fs, path::PathBuf, process::ExitCode};
use tmpl_frontend::{Info, DEFAULT_RECURSION_LIMIT};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    name = "tmplres",
    bin_name = "tmplres",
    about = "Resolve dependent member types in C++ templates"
)]
struct Args {
    /// The C++ source file to read.
    path: PathBuf,

    /// The name of the type aliases to resolve.
    #[clap(long, default_value = "result")]
    alias: String,

    /// How to print the resolved aliases.
    #[clap(long)]
    #[clap(value_enum, default_value_t = Format::Text)]
    format: Format,

    /// The maximum depth of nested member and alias lookups before giving up.
    #[clap(long, default_value_t = DEFAULT_RECURSION_LIMIT)]
    recursion_limit: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Resolved {
    alias: String,
    location: Info,
    before: String,
    after: String,
    dependent: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let code = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    let result = tmpl_frontend::parse(&args.path.to_string_lossy(), &code);

    for diagnostic in &result.diagnostics {
        eprintln!("{}: {}", diagnostic.info, diagnostic.item);
    }

    let mut program = result.program;
    program.set_recursion_limit(args.recursion_limit);

    let resolved = program
        .find_alias(&args.alias)
        .into_iter()
        .map(|alias| {
            let after = tmpl_resolve::resolve(&program, &alias.item.r#type);

            Resolved {
                alias: alias.item.qualified_name,
                location: alias.info,
                before: program.render(&alias.item.r#type),
                after: program.render(&after),
                dependent: after.is_dependent(),
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        aliases = resolved.len(),
        deepest_instantiation = program.deepest_instantiation(),
        "resolved aliases"
    );

    match args.format {
        Format::Text => {
            for resolved in &resolved {
                println!("{}: {} => {}", resolved.alias, resolved.before, resolved.after);
            }
        }
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }

    if resolved.is_empty() {
        if result.diagnostics.is_empty() {
            anyhow::bail!("no type alias named `{}`", args.alias);
        } else {
            anyhow::bail!(
                "{} error(s) and no type alias named `{}`",
                result.diagnostics.len(),
                args.alias
            );
        }
    }

    Ok(())
}
