use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use paged_rag::chat::{Assistant, ChatModel, HttpChatProvider};
use paged_rag::config::AppConfig;
use paged_rag::ingest::DocumentIngestor;
use paged_rag::retrieval::{
    HttpEmbedder, LocalVectorIndex, Retriever, VectorIndex, build_index,
};
use paged_rag::session::{ChatSession, Sender, is_exit_command};
use paged_rag::store::ChunkStore;
use paged_rag::text::TextNormalizer;
use paged_rag::text::chunking::MetadataSource;
use paged_rag::text::corpus::render_document;
use paged_rag::util::{encoding, tracing as log};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Pages in raw extracted text are separated by form feeds (pdftotext output)
const PAGE_BREAK: char = '\u{c}';

#[derive(Parser, Debug)]
#[command(
    name = "paged-rag",
    about = "Chunk page-tagged documents, index them and chat over the index"
)]
struct Cli {
    /// Base directory for relative data paths (overrides RAG_BASE_DIR)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean raw extracted text and write it as page-tagged blocks
    Normalize(NormalizeArgs),
    /// Split page-tagged documents into overlapping chunks
    Chunk(ChunkArgs),
    /// Embed the chunk collection into the vector index
    Index(IndexArgs),
    /// Answer a single question from the indexed documents
    Ask(AskArgs),
    /// Interactive chat; type "выход" or "exit" to leave
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    /// Raw text file (pages separated by form feeds) or a directory of them
    input: PathBuf,

    /// Document title (defaults to the file name)
    #[arg(long)]
    title: Option<String>,

    /// Document URL (defaults to the first link found in the text)
    #[arg(long)]
    url: Option<String>,

    /// Output directory (defaults to the extracted files path)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ChunkArgs {
    /// Directory of page-tagged .txt files
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Chunk directory or .json file
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    overlap: Option<usize>,

    /// first_page or spanning_page
    #[arg(long)]
    metadata_source: Option<MetadataSource>,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Chunk directory or .json file
    #[arg(long)]
    chunks: Option<PathBuf>,

    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Add to the existing index instead of rebuilding it
    #[arg(long, default_value_t = false)]
    append: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to answer
    query: String,

    /// gigachat-lite, gigachat-pro or gigachat-max
    #[arg(long)]
    model: Option<String>,

    /// Number of chunks used as context
    #[arg(long)]
    top_k: Option<usize>,

    /// Only print the rendered context (skip the chat model)
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// gigachat-lite, gigachat-pro or gigachat-max
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    log::tracing_init_from_env()?;
    let cli = Cli::parse();
    let mut conf = AppConfig::from_env()?;
    if let Some(base_dir) = cli.base_dir {
        conf.base_dir = base_dir;
    }

    let result = match cli.command {
        Command::Normalize(args) => normalize(&conf, args),
        Command::Chunk(args) => chunk(conf, args).await,
        Command::Index(args) => index(&conf, args).await,
        Command::Ask(args) => ask(conf, args).await,
        Command::Chat(args) => chat(&conf, args).await,
    };
    log::shutdown_tracer_provider();
    result
}

fn normalize(conf: &AppConfig, args: NormalizeArgs) -> Result<()> {
    let normalizer = TextNormalizer::new()?;
    let output_dir = args
        .output_dir
        .map(|d| conf.resolve(&d))
        .unwrap_or_else(|| conf.extracted_dir());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let inputs = if args.input.is_dir() {
        DocumentIngestor::list_documents(&args.input)?
    } else {
        vec![args.input.clone()]
    };
    if inputs.len() > 1 && (args.title.is_some() || args.url.is_some()) {
        bail!("--title and --url apply to a single input file");
    }

    for input in inputs {
        let raw = encoding::read_to_utf8(&input)?;
        let pages: Vec<&str> = raw.split(PAGE_BREAK).collect();
        let title = match &args.title {
            Some(title) => title.clone(),
            None => input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("cannot derive a title from {}", input.display()))?,
        };
        let url = args
            .url
            .as_deref()
            .or_else(|| pages.iter().find_map(|page| normalizer.find_url(page)));
        if url.is_none() {
            warn!(
                "no URL for {}: its pages will be dropped when chunking",
                input.display()
            );
        }

        let document = render_document(&normalizer, &title, url, pages.iter().copied());
        let output = output_dir.join(format!("{}.txt", title.replace(['/', '\\'], "_")));
        std::fs::write(&output, document)
            .with_context(|| format!("cannot write {}", output.display()))?;
        info!("{} pages -> {}", pages.len(), output.display());
    }
    Ok(())
}

async fn chunk(mut conf: AppConfig, args: ChunkArgs) -> Result<()> {
    if let Some(chunk_size) = args.chunk_size {
        conf.chunk_size = chunk_size;
    }
    if let Some(overlap) = args.overlap {
        conf.chunk_overlap = overlap;
    }
    let mut segmentation = conf.segmentation()?;
    if let Some(metadata_source) = args.metadata_source {
        segmentation = segmentation.with_metadata_source(metadata_source);
    }

    let input_dir = args
        .input_dir
        .map(|d| conf.resolve(&d))
        .unwrap_or_else(|| conf.extracted_dir());
    let output = args
        .output
        .map(|o| conf.resolve(&o))
        .unwrap_or_else(|| conf.chunks_dir());

    let report = DocumentIngestor::new(segmentation)?
        .run(&input_dir, &output)
        .await?;
    println!(
        "Total chunks: {} ({} documents, {} skipped) -> {}",
        report.chunks,
        report.documents,
        report.skipped,
        report.output.display()
    );
    Ok(())
}

fn embedder(conf: &AppConfig) -> Result<HttpEmbedder> {
    Ok(HttpEmbedder::new(
        conf.api_key.as_deref(),
        &conf.embedding_base_url,
        &conf.embedding_model,
        conf.request_timeout(),
        conf.embedding_batch_size,
    )?)
}

async fn index(conf: &AppConfig, args: IndexArgs) -> Result<()> {
    let chunks_path = args
        .chunks
        .map(|c| conf.resolve(&c))
        .unwrap_or_else(|| conf.chunks_dir());
    let index_dir = args
        .index_dir
        .map(|d| conf.resolve(&d))
        .unwrap_or_else(|| conf.index_dir());

    let chunks = ChunkStore::read(&chunks_path)?;
    let mut index = if args.append {
        LocalVectorIndex::open(&index_dir)?
    } else {
        LocalVectorIndex::new(&index_dir)
    };
    let embedder = embedder(conf)?;
    build_index(&chunks, &embedder, &mut index, conf.embedding_batch_size).await?;
    index.persist()?;
    println!(
        "Vector index initialized: {} entries in {}",
        index.len(),
        index.path().display()
    );
    Ok(())
}

fn retriever(conf: &AppConfig) -> Result<Arc<Retriever>> {
    let index = LocalVectorIndex::open(&conf.index_dir())?;
    if index.is_empty() {
        warn!(
            "vector index at {} is empty; run `paged-rag index` first",
            conf.index_dir().display()
        );
    }
    Ok(Arc::new(Retriever::new(
        Arc::new(embedder(conf)?),
        Arc::new(index),
    )))
}

fn assistant(conf: &AppConfig, retriever: Arc<Retriever>, model: ChatModel) -> Result<Assistant> {
    let mut provider = HttpChatProvider::new(
        conf.api_key.as_deref(),
        &conf.chat_base_url,
        conf.request_timeout(),
    )?;
    if let Some(temperature) = conf.temperature {
        provider = provider.with_temperature(temperature);
    }
    if let Some(max_tokens) = conf.max_tokens {
        provider = provider.with_max_tokens(max_tokens);
    }
    Ok(Assistant::new(retriever, Arc::new(provider), model)
        .with_system_prompt(conf.system_prompt())
        .with_top_k(conf.top_k))
}

fn select_model(conf: &AppConfig, name: Option<&str>) -> Result<ChatModel> {
    Ok(match name {
        Some(name) => name.parse()?,
        None => conf.chat_model()?,
    })
}

async fn ask(mut conf: AppConfig, args: AskArgs) -> Result<()> {
    if let Some(top_k) = args.top_k {
        conf.top_k = top_k;
    }
    let model = select_model(&conf, args.model.as_deref())?;
    let retriever = retriever(&conf)?;

    if args.dry_run {
        let context = retriever.get_relevant_context(&args.query, conf.top_k).await?;
        println!("{}", paged_rag::chat::format_context(&context));
        return Ok(());
    }

    let assistant = assistant(&conf, retriever, model)?;
    println!("{}", assistant.respond(&args.query).await);
    Ok(())
}

fn prompt(label: &str) -> Result<()> {
    print!("{label}: ");
    std::io::stdout().flush().context("flush stdout")
}

async fn chat(conf: &AppConfig, args: ChatArgs) -> Result<()> {
    let model = select_model(conf, args.model.as_deref())?;
    let mut assistant = assistant(conf, retriever(conf)?, model)?;
    let mut session = ChatSession::new();
    session.start(model);

    println!("\n=== Чат с ИИ ({model}) ===");
    println!("/new [модель] начинает новый чат, \"выход\" завершает.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(Sender::User.label())?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit_command(query) {
            break;
        }
        if let Some(rest) = query.strip_prefix("/new") {
            let model = match rest.trim() {
                "" => session.model().unwrap_or(model),
                name => match name.parse::<ChatModel>() {
                    Ok(model) => model,
                    Err(e) => {
                        println!("{e}\n");
                        continue;
                    }
                },
            };
            session.reset();
            session.start(model);
            assistant.set_model(model);
            println!("Чат с моделью {model} создан.\n");
            continue;
        }

        session.push_user(query);
        let response = assistant.respond(query).await;
        println!("{}: {response}\n", Sender::Assistant.label());
        session.push_assistant(response);
    }
    println!("\nДо свидания!");
    info!(
        "chat session ended after {} messages",
        session.history().len()
    );
    Ok(())
}
