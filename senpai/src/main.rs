mod cli;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use senpai_core::config::ClientProfile;
use senpai_core::logging;
use senpai_core::playback::{
    generate_static_candidates, slugify, MediaIds, PlaybackCandidate, UpstreamClients,
};
use senpai_core::{Config, PlaybackRequest, PlaybackSession, PlaybackSnapshot};
use senpai_providers::catalog::Language;

use cli::{Cli, Command, MediaArgs, PlayArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration, command-line overrides win over file and env
    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.command)?;

    // 1.5. Validate configuration (fail fast on misconfigurations)
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("Config validation error: {problem}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            problems.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(catalog = %config.upstream.catalog_base_url, "Senpai starting...");

    let result = match cli.command {
        Command::Play(args) => play(&config, args).await,
        Command::Candidates(args) => {
            print_candidates(&config, &args)?;
            Ok(())
        }
        Command::Slug { title } => {
            println!("{}", slugify(&title));
            Ok(())
        }
    };

    if cli.metrics {
        print!("{}", senpai_providers::metrics::gather_text());
    }

    result
}

fn apply_overrides(config: &mut Config, command: &Command) -> Result<()> {
    let media = match command {
        Command::Play(args) => {
            if args.mobile {
                config.playback.client_profile = ClientProfile::Mobile;
            }
            &args.media
        }
        Command::Candidates(args) => args,
        Command::Slug { .. } => return Ok(()),
    };

    if let Some(language) = &media.language {
        config.playback.preferred_language = language.parse::<Language>().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

fn request_for(media: &MediaArgs) -> PlaybackRequest {
    PlaybackRequest::new(media.anilist_id, media.episode, media.title.trim())
        .with_mal_id(media.mal_id)
        .with_start_offset(media.start_at)
}

async fn play(config: &Config, args: PlayArgs) -> Result<()> {
    let clients = UpstreamClients::from_config(&config.upstream)?;

    let mut builder = PlaybackSession::builder(request_for(&args.media))
        .settings(config.playback.clone())
        .embeds(config.embeds.clone())
        .catalog(Arc::new(clients.catalog));
    if config.playback.use_metadata_fallback {
        builder = builder.metadata(Arc::new(clients.metadata));
    }
    let session = builder.build()?;

    info!(
        anilist_id = args.media.anilist_id,
        episode = args.media.episode,
        "Resolving playback source"
    );
    drive(&session).await;
    print_snapshot(&session.snapshot(), args.media.json)?;

    if let Some(error) = session.failure() {
        eprintln!("{error}. Try again later.");
        return Err(error.into());
    }

    if let Some(index) = args.select {
        let snapshot = session.select_candidate(index)?;
        print_snapshot(&snapshot, args.media.json)?;
    }

    if args.next_episode {
        let next = session.snapshot().episode + 1;
        session.change_episode(next)?;
        drive(&session).await;
        print_snapshot(&session.snapshot(), args.media.json)?;
    }

    Ok(())
}

/// Run the automatic phase and wait for preloading, or stop on Ctrl-C.
async fn drive(session: &PlaybackSession) {
    tokio::select! {
        () = async {
            session.run().await;
            session.wait_for_preload().await;
        } => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Received shutdown signal");
            session.close();
        }
    }
}

fn print_candidates(config: &Config, media: &MediaArgs) -> Result<()> {
    let ids = MediaIds {
        anilist_id: media.anilist_id,
        mal_id: media.mal_id,
    };
    let candidates = generate_static_candidates(
        ids,
        media.episode,
        media.title.trim(),
        media.start_at,
        config.playback.preferred_language,
        &config.embeds,
    );

    if media.json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else {
        for (index, candidate) in candidates.iter().enumerate() {
            println!("{}", candidate_line(index, candidate, "   "));
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &PlaybackSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!(
        "episode {} | phase {:?} | locked {} | exhausted {} | manual {}",
        snapshot.episode, snapshot.phase, snapshot.locked, snapshot.exhausted, snapshot.manual_override
    );
    for (index, candidate) in snapshot.candidates.iter().enumerate() {
        let marker = format!(
            "{}{}{}",
            if index == snapshot.current_index { '>' } else { ' ' },
            if candidate.recommended { '*' } else { ' ' },
            if snapshot.preloaded.contains(&index) { '+' } else { ' ' },
        );
        println!("{}", candidate_line(index, candidate, &marker));
    }
    match &snapshot.active_uri {
        Some(uri) => println!("active: {uri}"),
        None => println!("active: none"),
    }
    Ok(())
}

fn candidate_line(index: usize, candidate: &PlaybackCandidate, marker: &str) -> String {
    format!(
        "{marker} {index:>2}  {:<32} {:<9} {}",
        candidate.title,
        candidate.provider.as_str(),
        candidate.source_uri
    )
}
