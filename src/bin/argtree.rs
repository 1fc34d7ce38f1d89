// src/bin/argtree.rs

use anyhow::{Context, Result, bail};
use argtree::{
    cli::{Cli, Command},
    core::{
        aggregator::{self, MacroEvaluator, NoopEvaluator},
        interpolator::Interpolator,
        storage, tree_display,
    },
    models::ProjectContext,
};
use clap::Parser;
use colored::Colorize;
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(error) = run() {
        eprintln!("{} {error:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Tree { file } => handle_tree(&file),
        Command::Eval {
            file,
            defines,
            no_macros,
        } => handle_eval(&file, &defines, no_macros),
    }
}

fn handle_tree(file: &Path) -> Result<()> {
    let record = storage::load_project_json(file)
        .with_context(|| format!("Failed to load project file '{}'", file.display()))?;
    let tree = storage::tree_from_record(&record);
    print!("{}", tree_display::render_tree(&tree));
    Ok(())
}

fn handle_eval(file: &Path, defines: &[String], no_macros: bool) -> Result<()> {
    let record = storage::load_project_json(file)
        .with_context(|| format!("Failed to load project file '{}'", file.display()))?;
    let tree = storage::tree_from_record(&record);

    let mut context = ProjectContext::new(record.project, record.name.clone());
    for define in defines {
        let Some((name, value)) = define.split_once('=') else {
            bail!("Invalid property definition '{define}', expected NAME=VALUE.");
        };
        context.properties.insert(name.to_string(), value.to_string());
    }

    let interpolator = Interpolator::new();
    let evaluator: &dyn MacroEvaluator = if no_macros {
        &NoopEvaluator
    } else {
        &interpolator
    };
    let config = aggregator::aggregate(&tree, &context, evaluator);

    println!("{} {}", "command line:".bold(), config.command_line);
    if let Some(cwd) = &config.working_directory {
        println!("{} {cwd}", "working dir: ".bold());
    }
    if let Some(app) = &config.launch_application {
        println!("{} {app}", "launch app:  ".bold());
    }
    if !config.environment.is_empty() {
        println!("{}", "environment:".bold());
        let mut entries: Vec<_> = config.environment.iter().collect();
        entries.sort();
        for (name, value) in entries {
            println!("  {name}={value}");
        }
    }
    Ok(())
}
