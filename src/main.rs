use barter_sync::api::models::{Category, DeckFilter, SwipeDirection};
use barter_sync::app::{AppConfig, ConfigStore};
use barter_sync::engine::{self, SendReceipt, ViewState};
use barter_sync::storage::MatchCache;
use barter_sync::sync::WsConnector;
use barter_sync::{Error, Result, SyncHandle};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "commands: /open <match>, /close, /matches, /deck, /filter [category] [radius_km], \
/swipe <listing> [left|right], /listings, /refresh, /dismiss, /confirm <match>, /cancel <match>, \
/signout, /quit; anything else is sent to the open conversation";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barter_sync=info,barter=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::load();
    let cache = AppConfig::cache_path().and_then(|path| match MatchCache::open(&path) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("match cache unavailable: {e}");
            None
        }
    });
    let (handle, engine_task) = engine::spawn(config, ConfigStore::Default, cache, Arc::new(WsConnector));

    if !handle.restore_session().await? {
        sign_in_from_env(&handle).await?;
    }
    tokio::spawn(print_changes(handle.clone()));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = run_line(&handle, line).await {
            eprintln!("error: {e}");
        }
        if line == "/quit" {
            break;
        }
    }

    // leaves the saved session in place for the next run
    handle.shutdown().await?;
    if let Err(e) = engine_task.await {
        log::warn!("sync engine ended abnormally: {e}");
    }
    Ok(())
}

/// `BARTER_EMAIL` / `BARTER_PASSWORD`; adds `BARTER_NAME` (and optionally
/// `BARTER_CITY`) to register a new account instead.
async fn sign_in_from_env(handle: &SyncHandle) -> Result<()> {
    let (Ok(email), Ok(password)) = (std::env::var("BARTER_EMAIL"), std::env::var("BARTER_PASSWORD"))
    else {
        println!("not signed in: set BARTER_EMAIL and BARTER_PASSWORD");
        return Ok(());
    };
    let user = match std::env::var("BARTER_NAME") {
        Ok(name) => handle.sign_up(&email, &password, &name, std::env::var("BARTER_CITY").ok()).await?,
        Err(_) => handle.sign_in(&email, &password).await?,
    };
    println!("signed in as {}", user.display_name);
    Ok(())
}

async fn run_line(handle: &SyncHandle, line: &str) -> Result<()> {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match command {
        "/open" => handle.open_conversation(arg)?,
        "/close" => handle.close_conversation()?,
        "/matches" => print_matches(&handle.view()),
        "/deck" => {
            for card in handle.view().deck {
                println!("  {} {} ({})", card.backend_id(), card.listing.title, card.listing.category.as_str());
            }
        }
        "/filter" => handle.set_deck_filter(parse_filter(arg))?,
        "/swipe" => {
            let (target, direction) = match arg.split_once(' ') {
                Some((target, "left")) => (target, SwipeDirection::Left),
                Some((target, _)) => (target, SwipeDirection::Right),
                None => (arg, SwipeDirection::Right),
            };
            if handle.swipe(target, direction).await?.match_created {
                println!("it's a match");
            }
        }
        "/listings" => {
            for listing in handle.my_listings().await? {
                println!("  {} {} [{:?}]", listing.id, listing.title, listing.status);
            }
        }
        "/refresh" => handle.refresh()?,
        "/dismiss" => handle.dismiss_notification()?,
        "/confirm" => {
            let response = handle.confirm_trade(arg).await?;
            println!("{}", response.message);
        }
        "/cancel" => handle.cancel_match(arg).await?,
        "/signout" => handle.sign_out()?,
        "/quit" => {}
        "/help" => println!("{HELP}"),
        _ => {
            let active = handle.view().active_conversation.ok_or(Error::NoActiveConversation)?;
            if let SendReceipt::Delivered(message) = handle.send(&active, line).await? {
                log::debug!("delivered {}", message.id);
            }
        }
    }
    Ok(())
}

/// `/filter books 25` narrows by category and radius; `/filter` alone clears.
fn parse_filter(arg: &str) -> DeckFilter {
    let mut filter = DeckFilter::default();
    for word in arg.split_whitespace() {
        if let Ok(radius) = word.parse::<f64>() {
            filter.radius_km = Some(radius);
        } else if let Some(category) = Category::from_name(word) {
            filter.category = Some(category);
        } else {
            println!("ignoring unknown filter {word:?}");
        }
    }
    filter
}

fn print_matches(view: &ViewState) {
    for conversation in &view.conversations {
        let active = view.active_conversation.as_deref() == Some(conversation.match_id.as_str());
        let marker = if active { "*" } else { " " };
        println!(
            "{marker} {} with {} for {} [{:?}]",
            conversation.match_id, conversation.peer_name, conversation.listing_title, conversation.status
        );
    }
}

/// Print what changed between consecutive view states.
async fn print_changes(handle: SyncHandle) {
    let mut rx = handle.subscribe();
    let mut last = rx.borrow().clone();
    while rx.changed().await.is_ok() {
        let view = rx.borrow_and_update().clone();
        if view.connection != last.connection {
            println!("[{:?}]", view.connection);
        }
        if view.active_conversation != last.active_conversation {
            if let Some(id) = &view.active_conversation {
                println!("-- conversation {id} --");
            }
        }
        let shown = if view.active_conversation == last.active_conversation {
            last.messages.len().min(view.messages.len())
        } else {
            0
        };
        for message in &view.messages[shown..] {
            println!("{}: {}", message.sender_name, message.content);
        }
        if view.show_notification && !last.show_notification {
            println!("** new match! **");
            print_matches(&view);
        }
        if last.signed_in && !view.signed_in {
            println!("signed out");
        }
        last = view;
    }
}
