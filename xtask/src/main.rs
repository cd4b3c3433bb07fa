//! Build automation tasks for the AFL pipeline
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for the AFL pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference as Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<afl_pipeline::Cli>();

    let content = format!(
        r#"# afl-pipeline CLI Reference

Generated from the CLI source code on {}.

## Overview

`afl-pipeline` loads AFL player statistics season by season: each season is
fetched, cleaned, staged as CSV in object storage and loaded into its own
warehouse table (`afl_player_data.player_stats_{{year}}_bq`). After a batch the
combined table `afl_data.combined_player_stats_bq` is rebuilt from every season
that loaded.

## Quick Start

```bash
# Dry run with generated data, nothing leaves the process
afl-pipeline --backend memory run --years 2019,2020,2021 --sample

# Real run
export AFL_PROJECT_ID=my-project
export AFL_ACCESS_TOKEN_FILE=/secrets/warehouse-token
afl-pipeline run --years 2023 --years 2024

# Reload one season from the already staged object
afl-pipeline year 2024 --skip-upload

# Rebuild only the combined table
afl-pipeline combine --years 2019,2020,2021
```

## Commands

{}

## Environment Variables

- `AFL_PROJECT_ID` - Warehouse project (required for the cloud backend)
- `AFL_BUCKET` - Staging bucket (default: `afl-data`)
- `AFL_DATASET_LOCATION` - Location for new datasets (default: `US`)
- `AFL_ACCESS_TOKEN` / `AFL_ACCESS_TOKEN_FILE` - Warehouse bearer token
- `AFL_WAREHOUSE_API_URL` - Warehouse REST endpoint
- `AFL_STATS_SOURCE_URL` - Source feed URL template containing `{{year}}`
- `AFL_SCHEMA_FILE` - Pinned per-season schema (JSON); autodetect when unset
- `S3_ENDPOINT`, `S3_REGION`, `S3_ACCESS_KEY`, `S3_SECRET_KEY` - Object storage
- `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR` - Logging

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
