//! `ai-insights chat`: workspace questions, one-shot or interactive

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use insights_core::{
    ApiClient, Attachment, ClientConfig, ConsumerConfig, Exchange, MessageStore, QueryCache,
    QueryKey, SessionOutcome, SessionUpdate, StreamConsumer, GENERIC_FAILURE_INDICATOR,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::render;

/// Arguments of the `chat` subcommand
#[derive(clap::Args, Debug)]
pub struct ChatArgs {
    /// Workspace to ask questions about
    #[arg(short, long, env = "AI_INSIGHTS_WORKSPACE", value_name = "ID")]
    pub workspace: String,

    /// Image to attach to the first question
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Wait for whole answers instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Ask this question and exit; without it, read questions from stdin
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,
}

/// What an interactive input line asks for
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Skip,
    Quit,
    Clear,
    History,
    Question(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Self::Skip,
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/history" => Self::History,
            question => Self::Question(question),
        }
    }
}

/// One workspace conversation
struct Chat {
    client: Arc<ApiClient>,
    consumer: StreamConsumer,
    updates: UnboundedReceiver<SessionUpdate>,
    store: Arc<MessageStore>,
    cache: Arc<QueryCache>,
    workspace: String,
    no_stream: bool,
    stdout: Stdout,
}

impl Chat {
    fn new(client: Arc<ApiClient>, config: &ClientConfig, args: &ChatArgs) -> Self {
        let store = Arc::new(MessageStore::new());
        let cache = Arc::new(QueryCache::new());
        let consumer = StreamConsumer::new(client.clone(), Arc::clone(&store))
            .with_config(ConsumerConfig::from(config))
            .with_cache(Arc::clone(&cache), QueryKey::chat(&args.workspace));
        let updates = consumer.subscribe();

        Self {
            client,
            consumer,
            updates,
            store,
            cache,
            workspace: args.workspace.clone(),
            no_stream: args.no_stream,
            stdout: tokio::io::stdout(),
        }
    }

    /// Ask one question and print the answer
    ///
    /// Returns the failure message if the answer could not be produced.
    async fn ask(
        &mut self,
        question: &str,
        attachment: Option<Attachment>,
    ) -> Result<Option<String>> {
        if self.no_stream {
            return self.ask_whole(question, attachment).await;
        }

        let request = self
            .client
            .chat_request(&self.workspace, question, None, attachment.as_ref());
        let handle = self.consumer.start(question, attachment, request)?;
        render::follow(
            &self.consumer,
            &mut self.updates,
            handle.id(),
            &mut self.stdout,
            render::interrupted(),
        )
        .await?;

        match handle.wait().await {
            SessionOutcome::Errored { message } => Ok(Some(message)),
            SessionOutcome::Completed(_)
            | SessionOutcome::Cancelled { .. }
            | SessionOutcome::Detached => Ok(None),
        }
    }

    async fn ask_whole(
        &mut self,
        question: &str,
        attachment: Option<Attachment>,
    ) -> Result<Option<String>> {
        let answer = self
            .client
            .query(&self.workspace, question, None, attachment.as_ref())
            .await;

        match answer {
            Ok(response) => {
                self.stdout
                    .write_all(format!("{}\n", response.response).as_bytes())
                    .await?;
                self.store
                    .append(Exchange::new(question, response.response, attachment, None));
                self.cache.invalidate(&QueryKey::chat(&self.workspace));
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Query failed");
                self.stdout
                    .write_all(format!("{GENERIC_FAILURE_INDICATOR}\n").as_bytes())
                    .await?;
                Ok(Some(e.to_string()))
            }
        }
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }
}

/// Run the `chat` subcommand
pub async fn run(client: Arc<ApiClient>, config: &ClientConfig, args: ChatArgs) -> Result<()> {
    let mut attachment = match &args.image {
        Some(path) => Some(render::load_attachment(path).await?),
        None => None,
    };
    let mut chat = Chat::new(client, config, &args);

    if let Some(question) = &args.question {
        if let Some(message) = chat.ask(question, attachment).await? {
            bail!("Question failed: {message}");
        }
        return Ok(());
    }

    info!(workspace = %args.workspace, "Interactive chat");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    loop {
        stderr.write_all(b"> ").await?;
        stderr.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            () = render::interrupted() => None,
        };
        let Some(line) = line else { break };

        match Input::parse(&line) {
            Input::Skip => {}
            Input::Quit => break,
            Input::Clear => {
                chat.store.clear();
                chat.cache.invalidate(&QueryKey::chat(&chat.workspace));
                chat.print("Conversation cleared.\n").await?;
            }
            Input::History => {
                let history = render::format_history(&chat.store);
                chat.print(&history).await?;
            }
            Input::Question(question) => {
                // Failures are already shown in place of the answer
                chat.ask(question, attachment.take()).await?;
            }
        }
    }

    Ok(())
}
