use anyhow::Context;
use bytes::Bytes;
use chat_core::memory::{MemoryAuthService, MemoryBlobStore, MemoryDocumentStore};
use chat_core::{
    AuthService, BlobStore, ConversationResolver, DirectoryError, DocumentStore, Location,
    MediaUploader, Message, MessageKind, SessionContext, UserDirectory,
};
use chat_store::{FsBlobStore, JsonDocumentStore, LocalAuthService, StoreConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chat-sim")]
#[command(about = "Alice and Bob chatting through the conversation directory")]
struct Cli {
    /// Data directory for the local backends (default: $CHAT_ROOT or ./chat_data)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory
    #[arg(long)]
    memory: bool,

    /// Text messages Alice sends before the location and photo
    #[arg(short, long, default_value = "2")]
    messages: usize,
}

/// Backends shared by both simulated devices. Each device signs in through
/// its own auth service.
struct Backends {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    alice_auth: Arc<dyn AuthService>,
    bob_auth: Arc<dyn AuthService>,
}

async fn open_backends(cli: &Cli) -> anyhow::Result<Backends> {
    if cli.memory {
        info!("[Sim] Using in-memory backends");
        return Ok(Backends {
            documents: Arc::new(MemoryDocumentStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            alice_auth: Arc::new(MemoryAuthService::new()),
            bob_auth: Arc::new(MemoryAuthService::new()),
        });
    }

    let config = match &cli.data_dir {
        Some(dir) => StoreConfig::with_base_dir(dir),
        None => StoreConfig::default(),
    };
    info!("[Sim] Using local backends under {:?}", config.storage_dir);

    Ok(Backends {
        documents: Arc::new(JsonDocumentStore::open(&config).await?),
        blobs: Arc::new(FsBlobStore::new(&config.blob_dir).await?),
        alice_auth: Arc::new(LocalAuthService::open(&config).await?),
        bob_auth: Arc::new(LocalAuthService::open(&config).await?),
    })
}

/// Sign in, registering the account on first run.
async fn sign_in_or_register(
    users: &UserDirectory,
    auth: &dyn AuthService,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<SessionContext> {
    match users.sign_in(auth, email, password).await {
        Ok(ctx) => Ok(ctx),
        Err(DirectoryError::Auth(_)) => users
            .register(auth, name, email, password)
            .await
            .with_context(|| format!("Failed to register {}", email)),
        Err(e) => Err(e.into()),
    }
}

fn describe(message: &Message) -> String {
    match &message.kind {
        MessageKind::Text(body) => body.clone(),
        MessageKind::Photo(media) => format!("photo {}", media.url),
        MessageKind::Video(media) => format!("video {}", media.url),
        MessageKind::Location(location) => {
            format!("location {},{}", location.latitude, location.longitude)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    info!("=== Chat Simulation ===");
    let backends = open_backends(&cli).await?;
    let users = UserDirectory::new(backends.documents.clone());
    let resolver = ConversationResolver::new(backends.documents.clone());
    let media = MediaUploader::new(backends.blobs.clone());

    let alice = sign_in_or_register(
        &users,
        backends.alice_auth.as_ref(),
        "Alice",
        "alice@example.com",
        "alice-secret",
    )
    .await?;
    let bob = sign_in_or_register(
        &users,
        backends.bob_auth.as_ref(),
        "Bob",
        "bob@example.com",
        "bob-secret",
    )
    .await?;
    info!("[Sim] Signed in {} and {}", alice.id(), bob.id());

    // Alice finds Bob through the user search.
    let found = users.search_users(&alice, "bo").await?;
    let bob_profile = found
        .iter()
        .find(|profile| profile.email == bob.email())
        .context("Bob not found in user search")?;
    info!("[Sim] Alice found {} <{}>", bob_profile.name, bob_profile.email);

    let mut alice_list = resolver.subscribe_to_conversations(&alice).await?;
    let mut sent = 0;
    for n in 1..=cli.messages {
        resolver
            .send_to(&alice, &bob.participant(), MessageKind::Text(format!("hello #{}", n)))
            .await?;
        sent += 1;
    }

    let (conversation_id, _) = resolver
        .send_to(
            &bob,
            &alice.participant(),
            MessageKind::Location(Location {
                latitude: 41.0082,
                longitude: 28.9784,
            }),
        )
        .await?;
    sent += 1;

    // The blob is named after the message that carries it.
    let photo_id = resolver.next_message_id(&alice, bob.id());
    let photo = media
        .upload_message_photo(&photo_id, Bytes::from_static(b"\x89PNG\r\n\x1a\n"))
        .await?;
    let photo_message = Message::new(photo_id, alice.participant(), MessageKind::Photo(photo));
    resolver
        .send_composed_to(&alice, &bob.participant(), &photo_message)
        .await?;
    info!("[Sim] Sent photo message {}", photo_message.id);
    sent += 1;
    info!("[Sim] Sent {} messages in {}", sent, conversation_id);

    let mut feed = resolver.subscribe_to_messages(&conversation_id).await?;
    if let Some(messages) = feed.next().await {
        for message in &messages {
            info!("[Sim] {}: {}", message.sender.display_name, describe(message));
        }
    }
    feed.cancel().await;

    // Only the newest rebuild matters; each one is the whole list.
    let mut latest = None;
    while let Some(entries) = alice_list.try_next() {
        latest = Some(entries);
    }
    for entry in latest.unwrap_or_default() {
        info!(
            "[Sim] Alice's list: {} with {} ({})",
            entry.id, entry.name, entry.latest_message.message
        );
    }
    alice_list.cancel().await;

    resolver.mark_read(&bob, &conversation_id).await?;
    for entry in resolver.conversations(&bob).await? {
        let view = entry.to_conversation(bob.id());
        info!(
            "[Sim] Bob's list: {} with {} read={}",
            view.id,
            view.counterpart(),
            view.latest.is_read
        );
    }

    if let Err(e) = media.profile_picture_url(alice.id()).await {
        warn!("[Sim] Alice has no profile picture yet: {}", e);
    }

    info!("=== Simulation complete ===");
    Ok(())
}
