use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use summary_core::{
    CatalogService, FailurePolicy, GroundedChat, Identifier, NonEmptyText, SummaryConfig,
    SummaryRequest, SummaryService,
};
use summary_llm::{HttpLlmClient, LlmSettings};
use summary_warehouse::{warehouse_dir_from_env_value, SqliteWarehouse, ENV_WAREHOUSE_DIR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "summary")]
#[command(about = "Patient record summary CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases in the warehouse
    Databases,
    /// List tables of a database
    Tables {
        /// Database name
        database: String,
    },
    /// List patient identifiers of a database
    Patients {
        /// Database name
        database: String,
    },
    /// Summarise one patient's record
    Summarize {
        #[arg(long)]
        database: String,
        /// Table to include (repeatable)
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
        #[arg(long = "patient")]
        patient_id: String,
        /// File holding the consolidation prompt template
        #[arg(long)]
        template_file: PathBuf,
        /// Model for per-table summaries
        #[arg(long)]
        model: Option<String>,
        /// Model for the consolidated summary
        #[arg(long)]
        summary_model: Option<String>,
        /// `skip` or `abort`
        #[arg(long)]
        failure_policy: Option<FailurePolicy>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a question about a record summary
    Chat {
        /// File holding the record context
        #[arg(long)]
        context_file: PathBuf,
        #[arg(long)]
        question: String,
        #[arg(long)]
        model: Option<String>,
    },
}

struct Services {
    cfg: Arc<SummaryConfig>,
    warehouse: Arc<SqliteWarehouse>,
    llm: Arc<HttpLlmClient>,
}

impl Services {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let cfg = Arc::new(SummaryConfig::from_lookup(|k| std::env::var(k).ok())?);
        let warehouse = Arc::new(SqliteWarehouse::new(warehouse_dir_from_env_value(
            std::env::var(ENV_WAREHOUSE_DIR).ok(),
        ))?);
        let llm = Arc::new(HttpLlmClient::new(LlmSettings::from_lookup(|k| {
            std::env::var(k).ok()
        }))?);
        Ok(Self {
            cfg,
            warehouse,
            llm,
        })
    }

    fn catalog(&self) -> CatalogService {
        CatalogService::new(self.warehouse.clone(), self.warehouse.clone())
    }
}

fn optional_text(value: Option<String>) -> Result<Option<NonEmptyText>, summary_core::TextError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(NonEmptyText::new)
        .transpose()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("summary_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'summary --help' for commands");
        return Ok(());
    };

    let services = Services::from_env()?;

    match command {
        Commands::Databases => {
            let databases = services.catalog().list_databases().await?;
            if databases.is_empty() {
                println!("No databases found.");
            }
            for database in databases {
                println!("{database}");
            }
        }
        Commands::Tables { database } => {
            let database = Identifier::parse(&database)?;
            for table in services.catalog().list_tables(&database).await? {
                println!("{table}");
            }
        }
        Commands::Patients { database } => {
            let database = Identifier::parse(&database)?;
            let patients = services.catalog().list_patients(&database).await?;
            if patients.is_empty() {
                println!("No patients found.");
            }
            for patient in patients {
                println!("{patient}");
            }
        }
        Commands::Summarize {
            database,
            tables,
            patient_id,
            template_file,
            model,
            summary_model,
            failure_policy,
            json,
        } => {
            let template = std::fs::read_to_string(&template_file).map_err(|e| {
                format!("failed to read template {}: {e}", template_file.display())
            })?;
            let request = SummaryRequest {
                database: Identifier::parse(&database)?,
                tables: tables
                    .iter()
                    .map(Identifier::parse)
                    .collect::<Result<Vec<_>, _>>()?,
                patient_id: NonEmptyText::new(&patient_id)?,
                prompt_template: NonEmptyText::new(&template)?,
                model: optional_text(model)?,
                summary_model: optional_text(summary_model)?,
                failure_policy,
            };

            let service = SummaryService::new(
                services.cfg.clone(),
                services.warehouse.clone(),
                services.llm.clone(),
            );
            let summary = service.summarize(request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.consolidated_summary);
                for section in &summary.sections {
                    println!("\n## {}\n{}", section.table, section.summary);
                }
                if !summary.empty_tables.is_empty() {
                    let empty: Vec<&str> =
                        summary.empty_tables.iter().map(|t| t.as_str()).collect();
                    println!("\nNo rows: {}", empty.join(", "));
                }
                for failure in &summary.failures {
                    eprintln!(
                        "Skipped {} ({}): {}",
                        failure.table, failure.stage, failure.message
                    );
                }
            }
        }
        Commands::Chat {
            context_file,
            question,
            model,
        } => {
            let context = std::fs::read_to_string(&context_file).map_err(|e| {
                format!("failed to read context {}: {e}", context_file.display())
            })?;
            let question = NonEmptyText::new(&question)?;
            let model = optional_text(model)?;
            let model = model
                .as_ref()
                .unwrap_or(services.cfg.default_model())
                .as_str()
                .to_string();

            let chat = GroundedChat::new(services.llm.clone(), services.cfg.llm_timeout());
            println!("{}", chat.answer(question.as_str(), &context, &model).await?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_summarize_with_repeated_tables() {
        let cli = Cli::try_parse_from([
            "summary",
            "summarize",
            "--database",
            "healthlake_db",
            "--table",
            "observation",
            "--table",
            "condition",
            "--patient",
            "p-1",
            "--template-file",
            "prompt.txt",
            "--failure-policy",
            "abort",
        ])
        .expect("arguments should parse");

        match cli.command {
            Some(Commands::Summarize {
                tables,
                patient_id,
                failure_policy,
                json,
                ..
            }) => {
                assert_eq!(tables, vec!["observation", "condition"]);
                assert_eq!(patient_id, "p-1");
                assert_eq!(failure_policy, Some(FailurePolicy::Abort));
                assert!(!json);
            }
            _ => panic!("expected summarize command"),
        }
    }

    #[test]
    fn summarize_requires_a_table() {
        let result = Cli::try_parse_from([
            "summary",
            "summarize",
            "--database",
            "healthlake_db",
            "--patient",
            "p-1",
            "--template-file",
            "prompt.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn blank_model_is_treated_as_unset() {
        assert_eq!(optional_text(Some("  ".into())).unwrap(), None);
        assert_eq!(
            optional_text(Some("m".into())).unwrap().map(|t| t.into_inner()),
            Some("m".to_string())
        );
    }
}
