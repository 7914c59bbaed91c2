//! CLI entry point for Imbi graph model administration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use imbi_blueprint::{merge, parse_schema, schema_hash, BlueprintEngine, BlueprintSource};
use imbi_core::logging::configure_logging;
use imbi_core::settings::DEFAULT_CONFIG_FILE;
use imbi_core::{FieldDescriptor, ModelRegistry, Project, Settings};
use imbi_graph::{schema, GraphClient, Matcher};

#[derive(Parser)]
#[command(name = "imbi-admin")]
#[command(about = "Operator tooling for the Imbi graph model layer")]
struct Cli {
    /// Config file prefix (default: config).
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Human-readable output with debug logging for Imbi crates.
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to Neo4j and declare constraints and indexes.
    InitSchema {
        /// Print the statements instead of running them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the synthesized JSON Schema of a project.
    Model {
        /// Project slug.
        #[arg(long)]
        project: String,
    },

    /// Check a blueprint schema file without connecting.
    LintBlueprint {
        file: PathBuf,

        /// Entity label to check the blueprint's fields against.
        #[arg(long)]
        applies_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)?;
    configure_logging(cli.dev || settings.logging.dev);

    match cli.command {
        Command::InitSchema { dry_run } => init_schema(&settings, dry_run).await,
        Command::Model { project } => print_model(&settings, &project).await,
        Command::LintBlueprint { file, applies_to } => lint_blueprint(&file, applies_to.as_deref()),
    }
}

async fn init_schema(settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let registry = ModelRegistry::standard();
    if dry_run {
        for declaration in schema::declarations(&registry) {
            println!("{};", declaration.cypher());
        }
        return Ok(());
    }

    let client = GraphClient::with_registry(registry);
    client.initialize(&settings.neo4j).await?;
    client.close().await;
    tracing::info!("Schema initialized");
    Ok(())
}

async fn print_model(settings: &Settings, slug: &str) -> anyhow::Result<()> {
    let client = GraphClient::new();
    client.initialize(&settings.neo4j).await?;
    let engine = BlueprintEngine::new(client.clone(), &settings.blueprints);

    let project: Project = client
        .fetch_unique(&Matcher::key::<Project>(slug))
        .await?
        .ok_or_else(|| anyhow::anyhow!("project {slug} not found"))?;
    let model = engine.get_model(&project).await?;
    println!("{}", serde_json::to_string_pretty(&model.to_json_schema())?);

    client.close().await;
    Ok(())
}

fn lint_blueprint(file: &Path, applies_to: Option<&str>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", file.display()))?;
    let slug = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blueprint".to_string());

    let fields = parse_schema(&slug, &schema)?;
    if let Some(label) = applies_to {
        let registry = ModelRegistry::standard();
        let base = registry
            .get(label)
            .ok_or_else(|| anyhow::anyhow!("unknown entity label {label}"))?;
        merge(base, &[BlueprintSource::from_schema(&slug, schema.clone(), true)])?;
    }

    for field in &fields {
        println!("{}", describe(field));
    }
    println!("schema hash: {}", schema_hash(&schema));
    Ok(())
}

fn describe(field: &FieldDescriptor) -> String {
    let mut line = format!(
        "{}: {}{}",
        field.name,
        field.kind,
        if field.required { " (required)" } else { "" }
    );
    if let Some(values) = &field.enum_values {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        line.push_str(&format!(" one of [{}]", values.join(", ")));
    }
    if let Some(default) = &field.default {
        line.push_str(&format!(" default {default}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use imbi_core::FieldKind;

    #[test]
    fn test_parse_model_command() {
        let cli = Cli::parse_from(["imbi-admin", "--dev", "model", "--project", "billing-api"]);
        assert!(cli.dev);
        assert_eq!(cli.config, DEFAULT_CONFIG_FILE);
        assert!(matches!(cli.command, Command::Model { ref project } if project == "billing-api"));
    }

    #[test]
    fn test_describe_field() {
        let field = FieldDescriptor::required("cloud_provider", FieldKind::String).with_enum(["AWS", "GCP"]);
        assert_eq!(
            describe(&field),
            r#"cloud_provider: string (required) one of ["AWS", "GCP"]"#
        );
    }

    #[test]
    fn test_lint_rejects_collision_with_base() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shadow.json");
        std::fs::write(&file, r#"{"properties": {"name": {"type": "string"}}}"#).unwrap();

        assert!(lint_blueprint(&file, None).is_ok());
        assert!(lint_blueprint(&file, Some("Project")).is_err());
        assert!(lint_blueprint(&file, Some("Gadget")).is_err());
    }
}
