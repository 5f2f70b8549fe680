//! Library listing and search commands.

use futures::StreamExt;
use std::io::Write;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::registered;
use crate::model::{Album, Song, SourceType};
use crate::registry::ServiceRegistry;

/// One line per song: artists, title and album.
fn describe(song: &Song) -> String {
    let mut line = format!("{} - {}", song.artist_line(), song.title);
    if let Some(album) = &song.album {
        line.push_str(&format!(" [{album}]"));
    }
    line
}

/// Discover local songs, printing each one as it is found
pub fn cmd_scan(
    rt: &Runtime,
    registry: &ServiceRegistry,
    refresh: bool,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let local = registered(registry, SourceType::Local)?;
        if refresh {
            println!("Reading every file again...");
            local.refresh_library_songs().await?;
        }

        let mut stream = local.library_songs(CancellationToken::new()).await?;
        let mut found: Vec<Song> = Vec::new();

        while let Some(song) = stream.next().await {
            let song = song.read().clone();
            if !json {
                println!("{}", describe(&song));
                std::io::stdout().flush()?;
            }
            found.push(song);
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&found)?);
        } else {
            println!("\nScan complete. Total: {} songs.", found.len());
        }
        info!(target: "local::discovery", songs = found.len(), "Scan complete");
        Ok(())
    })
}

/// Group local songs into albums
pub fn cmd_albums(rt: &Runtime, registry: &ServiceRegistry, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let local = registered(registry, SourceType::Local)?;
        let albums: Vec<Album> = local
            .library_albums(CancellationToken::new())
            .await?
            .map(|album| album.read().clone())
            .collect()
            .await;

        if json {
            println!("{}", serde_json::to_string_pretty(&albums)?);
            return Ok(());
        }

        for album in &albums {
            let artists: Vec<&str> = album.artists.iter().map(|a| a.title.as_str()).collect();
            println!(
                "{} - {} ({} songs)",
                artists.join(", "),
                album.title,
                album.songs.len()
            );
        }
        println!("\n{} albums", albums.len());
        Ok(())
    })
}

/// Search every enabled service
pub fn cmd_search(
    rt: &Runtime,
    registry: &ServiceRegistry,
    term: &str,
    page: usize,
) -> anyhow::Result<()> {
    if registry.enabled_services().is_empty() {
        eprintln!("No music service is enabled. Try `medley enable local`.");
        return Ok(());
    }

    rt.block_on(async {
        let mut results = registry
            .search_songs(term, page, CancellationToken::new())
            .await;

        let mut count = 0;
        while let Some(song) = results.next().await {
            let song = song.read();
            println!("{:<8} {}", song.source().as_str(), describe(&song));
            count += 1;
        }

        if count == 0 {
            println!("No results for {term:?} on page {page}.");
        }
        Ok(())
    })
}

/// Suggest search terms
pub fn cmd_hints(rt: &Runtime, registry: &ServiceRegistry, term: &str) -> anyhow::Result<()> {
    let hints = rt.block_on(registry.search_hints(term));
    for hint in hints {
        println!("{hint}");
    }
    Ok(())
}
