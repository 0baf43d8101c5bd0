//! `ai-insights template`: run a report template against a workspace

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use insights_core::{
    ApiClient, ClientConfig, ConsumerConfig, MessageStore, SessionOutcome, StreamConsumer,
};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::render;

/// Arguments of the `template` subcommand
#[derive(clap::Args, Debug)]
pub struct TemplateArgs {
    /// Workspace the template runs against
    #[arg(short, long, env = "AI_INSIGHTS_WORKSPACE", value_name = "ID")]
    pub workspace: String,

    /// Template to run
    #[arg(short, long, value_name = "ID")]
    pub template: String,

    /// Free-form input for the template
    #[arg(long, value_name = "TEXT", default_value = "")]
    pub input: String,

    /// Extra context passed to the template (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context)]
    pub context: Vec<(String, String)>,

    /// Wait for the whole result instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

impl TemplateArgs {
    fn additional_context(&self) -> Map<String, Value> {
        self.context
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    /// What the run is recorded as when there is no input
    fn question(&self) -> String {
        if self.input.trim().is_empty() {
            format!("Run template {}", self.template)
        } else {
            self.input.clone()
        }
    }
}

fn parse_context(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("context key is empty in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}

/// Run the `template` subcommand
pub async fn run(client: Arc<ApiClient>, config: &ClientConfig, args: TemplateArgs) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    if args.no_stream {
        let result = client
            .process_template(
                &args.workspace,
                &args.template,
                &args.input,
                args.additional_context(),
            )
            .await
            .context("Template run failed")?;

        stdout.write_all(format!("{}\n", result.result).as_bytes()).await?;
        if let Some(sources) = render::sources_block(&result.metadata) {
            stdout.write_all(sources.as_bytes()).await?;
        }
        stdout.flush().await?;
        return Ok(());
    }

    let consumer = StreamConsumer::new(client.clone(), Arc::new(MessageStore::new()))
        .with_config(ConsumerConfig::from(config));
    let mut updates = consumer.subscribe();

    let request = client.template_request(
        &args.workspace,
        &args.template,
        &args.input,
        args.additional_context(),
    );
    let handle = consumer.start(args.question(), None, request)?;

    render::follow(
        &consumer,
        &mut updates,
        handle.id(),
        &mut stdout,
        render::interrupted(),
    )
    .await?;

    match handle.wait().await {
        SessionOutcome::Completed(exchange) => {
            if let Some(sources) = exchange.metadata.as_ref().and_then(render::sources_block) {
                stdout.write_all(sources.as_bytes()).await?;
                stdout.flush().await?;
            }
            Ok(())
        }
        SessionOutcome::Errored { message } => bail!("Template run failed: {message}"),
        SessionOutcome::Cancelled { .. } | SessionOutcome::Detached => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: TemplateArgs,
    }

    #[test]
    fn test_parse_context() {
        assert_eq!(
            parse_context("quarter=Q3").unwrap(),
            ("quarter".to_string(), "Q3".to_string())
        );
        assert_eq!(
            parse_context("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert!(parse_context("novalue").is_err());
        assert!(parse_context("=x").is_err());
    }

    #[test]
    fn test_template_args() {
        let harness = Harness::try_parse_from([
            "template",
            "--workspace",
            "ws-1",
            "--template",
            "risk-summary",
            "--context",
            "quarter=Q3",
            "--context",
            "region=EU",
        ])
        .unwrap();
        let args = harness.args;

        assert_eq!(args.question(), "Run template risk-summary");
        let context = args.additional_context();
        assert_eq!(context.len(), 2);
        assert_eq!(context["region"], Value::String("EU".into()));
    }
}
