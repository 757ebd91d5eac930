#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, WrapErr};
use rivet::{TranslateOptions, analyze, find_config, load_options, translate};
use rivet_ir::Program;

#[derive(Parser, Debug)]
#[command(name = "rivet", version, about = "Translate resolved IR programs into Rust source")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Resolve, analyze and emit Rust source
    Translate {
        /// IR program as JSON
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,

        /// Print ownership suggestions to stderr
        #[arg(long, default_value_t = false)]
        suggest: bool,
    },
    /// Resolve and analyze only; print warnings and suggestions
    Check {
        /// IR program as JSON
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Treat unbound names, missing fields and ambiguous builtins as errors
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Cap on derive-closure passes. Overrides `rivet.toml`.
    #[arg(long = "max-iterations")]
    max_iterations: Option<usize>,

    /// Config file (default: nearest `rivet.toml` above the input)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CommonArgs {
    fn options(&self, input: &Path) -> miette::Result<TranslateOptions> {
        let path = self.config.clone().or_else(|| find_config(input));
        let mut opts = match path {
            Some(p) => {
                log::debug!("using config {}", p.display());
                load_options(&p)?
            }
            None => TranslateOptions::default(),
        };
        if self.strict {
            opts.strict = true;
        }
        if let Some(n) = self.max_iterations {
            if n == 0 {
                miette::bail!("--max-iterations must be at least 1");
            }
            opts.max_fixpoint_iterations = n;
        }
        Ok(opts)
    }
}

fn read_program(path: &Path) -> miette::Result<Program> {
    let raw = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a valid IR program", path.display()))
}

fn main() -> miette::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Translate {
            input,
            output,
            common,
            suggest,
        } => {
            let opts = common.options(&input)?;
            let program = read_program(&input)?;
            let t = translate(program, &opts)?;

            for w in &t.warnings {
                eprintln!("{w}");
            }
            if suggest {
                for s in &t.suggestions {
                    eprintln!("suggestion: {s}");
                }
            }
            match output {
                Some(path) => fs::write(&path, &t.source)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?,
                None => print!("{}", t.source),
            }
            Ok(())
        }
        Cmd::Check { input, common } => {
            let opts = common.options(&input)?;
            let program = read_program(&input)?;
            let a = analyze(program, &opts)?;

            for w in &a.warnings {
                println!("{w}");
            }
            for s in &a.suggestions {
                println!("suggestion: {s}");
            }
            println!(
                "ok: {} copyable type(s), {} warning(s), {} suggestion(s)",
                a.outcome.copyable.len(),
                a.warnings.len(),
                a.suggestions.len()
            );
            Ok(())
        }
    }
}
