use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, normalize_base_url},
    ContentClient, ContentSession, Origin, Phase, RemoteContentClient, SessionEvent, UploadFile,
};
use shared::{
    domain::{NewLesson, PageId, SectionKind},
    protocol::PageRecord,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse and edit lesson pages against a content store")]
struct Args {
    /// Overrides the configured content store base url.
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List lessons and their sections.
    Lessons,
    /// Print a page.
    Page { id: String },
    /// Replace a page's markdown with the contents of a file and save it.
    Edit {
        id: String,
        #[arg(long)]
        markdown_file: PathBuf,
    },
    /// Attach a file to a page.
    Upload { id: String, path: PathBuf },
    /// Remove an attachment from a page.
    Delete { id: String, url: String },
    /// Author a new single-section lesson.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        section_title: String,
        #[arg(long, default_value = "vocab")]
        kind: SectionKind,
        #[arg(long)]
        markdown_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(base_url) = args.base_url.as_deref() {
        settings.api_base_url = normalize_base_url(base_url);
    }
    info!(base_url = %settings.api_base_url, "using content store");

    let client = Arc::new(RemoteContentClient::from_settings(&settings)?);
    let session = ContentSession::with_options(client.clone(), settings.session_options());

    match args.command {
        Command::Lessons => list_lessons(client.as_ref()).await,
        Command::Page { id } => {
            let mut events = open(&session, &id).await?;
            print_page(&session).await;
            report(&mut events);
            Ok(())
        }
        Command::Edit { id, markdown_file } => {
            let markdown = tokio::fs::read_to_string(&markdown_file)
                .await
                .with_context(|| format!("reading {}", markdown_file.display()))?;
            let mut events = open(&session, &id).await?;
            session.begin_edit().await?;
            session.update_draft(markdown).await?;
            let saved = session.save().await;
            report(&mut events);
            saved?;
            print_page(&session).await;
            Ok(())
        }
        Command::Upload { id, path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("attachment.bin")
                .to_string();
            let mut file = UploadFile::new(file_name, bytes);
            if let Some(mime_type) = mime_guess::from_path(&path).first_raw() {
                file = file.with_mime_type(mime_type);
            }
            let mut events = open(&session, &id).await?;
            let uploaded = session.upload(file).await;
            report(&mut events);
            uploaded?;
            print_materials(&session).await;
            Ok(())
        }
        Command::Delete { id, url } => {
            let mut events = open(&session, &id).await?;
            session.delete_attachment(&url).await?;
            report(&mut events);
            print_materials(&session).await;
            Ok(())
        }
        Command::Create {
            title,
            section_title,
            kind,
            markdown_file,
        } => {
            let mut lesson = NewLesson::new(title, section_title);
            lesson.section_kind = kind;
            if let Some(path) = markdown_file {
                lesson.markdown = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
            }
            let page = lesson.into_page()?;
            let created = client.create_lesson(PageRecord::from(page)).await?;
            if let Origin::Fallback { reason } = &created.origin {
                println!("warning: lesson was not persisted ({reason})");
            }
            println!("created page {}", created.value.id);
            Ok(())
        }
    }
}

async fn list_lessons(client: &dyn ContentClient) -> Result<()> {
    let lessons = client.fetch_lessons().await;
    if let Some(reason) = lessons.fallback_reason() {
        println!("warning: showing bundled lessons ({reason})");
    }
    for lesson in lessons.value {
        println!("{}  {}", lesson.id, lesson.title);
        for section in lesson.sections {
            println!("  {:<8} {}  {}", section.kind.as_str(), section.id, section.title);
        }
    }
    Ok(())
}

async fn open<C: ContentClient + ?Sized>(
    session: &ContentSession<C>,
    id: &str,
) -> Result<broadcast::Receiver<SessionEvent>> {
    let mut events = session.subscribe_events();
    session.activate(PageId::new(id)).await;
    if session.snapshot().await.phase == Phase::NotFound {
        report(&mut events);
        bail!("page {id} not found");
    }
    Ok(events)
}

async fn print_page<C: ContentClient + ?Sized>(session: &ContentSession<C>) {
    let Some(page) = session.snapshot().await.page else {
        return;
    };
    if let Some(title) = &page.title {
        println!("# {title}");
    }
    println!("{}", page.markdown);
    print_materials(session).await;
}

async fn print_materials<C: ContentClient + ?Sized>(session: &ContentSession<C>) {
    let Some(page) = session.snapshot().await.page else {
        return;
    };
    if page.materials.is_empty() {
        println!("(no attachments)");
    }
    for material in &page.materials {
        println!("- {}  {}", material.file_name, material.public_url);
    }
}

fn report(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return,
        };
        match event {
            SessionEvent::Loaded {
                origin: Origin::Fallback { reason },
                page_id,
            } => println!("warning: {page_id} served from bundled content ({reason})"),
            SessionEvent::Loaded { .. } => {}
            SessionEvent::NotFound { page_id } => println!("page {page_id} not found"),
            SessionEvent::Saved { page_id } => println!("saved {page_id}"),
            SessionEvent::SaveDegraded { page_id, reason } => {
                println!("warning: {page_id} saved locally only ({reason})")
            }
            SessionEvent::SaveFailed { page_id, reason } => {
                println!("error: saving {page_id} failed: {reason}")
            }
            SessionEvent::Uploaded { url, .. } => println!("uploaded {url}"),
            SessionEvent::UploadDegraded { url, reason, .. } => {
                println!("warning: {url} only lives in this session ({reason})")
            }
            SessionEvent::UploadFailed { page_id, reason } => {
                println!("error: upload to {page_id} failed: {reason}")
            }
            SessionEvent::Deleted { url, .. } => println!("deleted {url}"),
            SessionEvent::DeleteUnconfirmed { url, reason, .. } => {
                println!("warning: removed {url} locally, store did not confirm ({reason})")
            }
        }
    }
}
