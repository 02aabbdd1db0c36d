use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "tick-client helper tasks (clippy, tests, live demo)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run workspace tests, including the HTTP gateway tests behind `test-helpers`
    Test {
        /// Only run library unit tests
        #[arg(long)]
        lib_only: bool,
    },
    /// Run the CLI walkthrough against a running shard
    Demo {
        /// Account email to sign in with
        #[arg(long, default_value = "email@example.com")]
        email: String,
        /// Persona tag to claim
        #[arg(long, default_value = "pepe5")]
        persona: String,
        /// Client config file passed through to tick-cli
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test { lib_only } => run_tests(&root, lib_only)?,
        Commands::Demo {
            email,
            persona,
            config,
        } => run_demo(&root, &email, &persona, config.as_deref())?,
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")?;
    Ok(())
}

fn run_tests(root: &Path, lib_only: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").arg("--workspace").arg("--all-features");
    if lib_only {
        cmd.arg("--lib");
    }
    cmd.current_dir(root);
    run_command(cmd, "cargo test --workspace")?;
    Ok(())
}

fn run_demo(root: &Path, email: &str, persona: &str, config: Option<&str>) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("run")
        .arg("-p")
        .arg("tick-cli")
        .arg("--")
        .arg("--email")
        .arg(email);
    if let Some(config) = config {
        cmd.arg("--config").arg(config);
    }
    cmd.arg("demo").arg("--persona").arg(persona).current_dir(root);
    run_command(cmd, "tick-cli demo")?;
    Ok(())
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {}", label);
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
