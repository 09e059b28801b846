use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for cellworld")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and doc in that order
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates, warnings denied
    Clippy,
    /// Run all tests
    Test,
    /// Run the streaming benchmark in release mode
    Bench,
    /// Build rustdoc for the workspace
    Doc,
    /// Walk a generated world with background builds as a smoke run
    Smoke,
}

/// One cargo invocation; `label` is echoed before running and in the error.
fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> {label}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{label} failed ({status})");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let fmt = || cargo("cargo fmt --check", &["fmt", "--all", "--", "--check"]);
    let clippy = || {
        cargo(
            "cargo clippy",
            &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        )
    };
    let test = || cargo("cargo test", &["test", "--workspace"]);
    let doc = || cargo("cargo doc", &["doc", "--workspace", "--no-deps"]);

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test()?;
            doc()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test => test()?,
        Commands::Doc => doc()?,
        Commands::Bench => cargo(
            "streaming benchmark",
            &[
                "bench",
                "-p",
                "cellworld-stream",
                "--bench",
                "bench_stream_update",
            ],
        )?,
        Commands::Smoke => cargo(
            "cellworld-cli walk",
            &[
                "run",
                "-p",
                "cellworld-cli",
                "--",
                "walk",
                "--to-x",
                "4",
                "--to-z",
                "-3",
                "--background",
                "2",
            ],
        )?,
    }

    Ok(())
}
