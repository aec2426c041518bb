//! Model listing command for AIOrg
//!
//! Lists the models installed on the configured server, either as a table or
//! as JSON.

use std::time::Duration;

use prettytable::{format, row, Table};

use crate::config::Config;
use crate::error::Result;
use crate::probe::{ConnectionProbe, ModelSummary};

/// List models installed on the configured server
///
/// # Arguments
///
/// * `config` - Configuration holding the server location
/// * `json` - Print JSON instead of a table
///
/// # Errors
///
/// Returns error if the server cannot be reached or answers with garbage
///
/// # Examples
///
/// ```no_run
/// use aiorg::config::Config;
/// use aiorg::commands::models::list_models;
///
/// # async fn example() -> anyhow::Result<()> {
/// list_models(&Config::default(), false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, json: bool) -> Result<()> {
    tracing::info!("Listing models from {}", config.ollama.host);

    let probe = ConnectionProbe::new()?;
    let models = probe
        .list_models(
            &config.ollama.host,
            Duration::from_secs(config.probe.timeout_seconds),
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        print!("{}", format_models_table(&models, &config.ollama.model));
    }
    Ok(())
}

/// Renders models as a table, marking the active model with `*`
pub fn format_models_table(models: &[ModelSummary], active: &str) -> String {
    if models.is_empty() {
        return "No models installed on the server.\n".to_string();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(row!["", "MODEL", "SIZE", "MODIFIED"]);

    for model in models {
        let marker = if model.name == active { "*" } else { "" };
        table.add_row(row![
            marker,
            model.name,
            model.display_size(),
            model.modified_at
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, size: u64) -> ModelSummary {
        ModelSummary {
            name: name.to_string(),
            size,
            modified_at: "2024-05-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_format_models_table_marks_active_model() {
        let table = format_models_table(
            &[model("llama3.2:latest", 2_019_393_189), model("phi3:mini", 2048)],
            "phi3:mini",
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("MODEL"));
        assert!(lines[0].contains("SIZE"));
        assert!(lines[1].trim_start().starts_with("llama3.2:latest"));
        assert!(lines[1].contains("1.9GB"));
        assert!(lines[2].trim_start().starts_with("*"));
        assert!(lines[2].contains("phi3:mini"));
    }

    #[test]
    fn test_format_models_table_aligns_non_ascii_names() {
        let table = format_models_table(
            &[model("modèle-été:7b", 4096), model("llama3.2:latest", 2048)],
            "none",
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);

        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{:?}", widths);

        let size_column: Vec<usize> = lines[1..]
            .iter()
            .map(|l| {
                let byte = l.find("KB").unwrap();
                l[..byte].chars().count()
            })
            .collect();
        assert_eq!(size_column[0], size_column[1]);
    }

    #[test]
    fn test_format_models_table_empty() {
        assert_eq!(
            format_models_table(&[], "any"),
            "No models installed on the server.\n"
        );
    }
}
