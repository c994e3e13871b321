//! CLI command implementations

use crate::headless::HeadlessSink;
use crate::output::{format_position, print_json, styled_state, OutputFormat};
use anyhow::{bail, Context};
use cineteca_core::manifest::detect_manifest_type;
use cineteca_core::{
    event_channel, CatalogueEntry, Controller, Event, EventSender, HttpSourceResolver, JsonFileStore, MediaId,
    NoDisplay, PlayableItem, PlaybackNavigator, PlaybackRate, PlaybackState, PlaybackStore, PlayerConfig,
    PlayerRuntime, PlayerSnapshot,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

// =============================================================================
// probe
// =============================================================================

#[derive(Serialize)]
struct ProbeReport {
    url: Url,
    status: u16,
    content_type: Option<String>,
    content_length: Option<u64>,
    adaptive: bool,
    is_live: Option<bool>,
    initial_rendition: Option<String>,
    renditions: Vec<RenditionRow>,
}

#[derive(Serialize, Tabled)]
struct RenditionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Bandwidth")]
    bandwidth: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
    #[tabled(rename = "Codecs")]
    codecs: String,
}

/// Probe a source and show how it would be played
pub async fn probe(config: &PlayerConfig, url: &str, adaptive: bool, format: OutputFormat) -> anyhow::Result<()> {
    let url = Url::parse(url.trim()).with_context(|| format!("invalid URL: {url}"))?;
    let resolver = HttpSourceResolver::new(config)?;

    let spinner = spinner(format, format!("Probing {url}"))?;
    let outcome = resolver.probe(&url).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let manifest_type = detect_manifest_type(&url, outcome.content_type.as_deref());
    let plan = match manifest_type {
        Some(manifest_type) if adaptive => {
            spinner.set_message("Fetching manifest");
            Some(resolver.open_stream(&url, manifest_type).await)
        }
        _ => None,
    };
    spinner.finish_and_clear();
    let plan = plan.transpose()?;

    let report = ProbeReport {
        url: url.clone(),
        status: outcome.status,
        content_type: outcome.content_type,
        content_length: outcome.content_length,
        adaptive: plan.is_some(),
        is_live: plan.as_ref().map(|p| p.manifest.is_live),
        initial_rendition: plan.as_ref().map(|p| p.initial_rendition.label()),
        renditions: plan
            .as_ref()
            .map(|p| {
                p.manifest
                    .renditions
                    .iter()
                    .map(|r| RenditionRow {
                        id: r.id.clone(),
                        bandwidth: format!("{} kbps", r.bandwidth / 1000),
                        resolution: r.resolution.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
                        codecs: [r.video_codec.map(|c| c.to_string()), r.audio_codec.map(|c| format!("{c:?}"))]
                            .into_iter()
                            .flatten()
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text | OutputFormat::Table => {
            println!("{} {}", style("Source:").bold(), report.url);
            println!("  Status:   {}", report.status);
            println!("  Type:     {}", report.content_type.as_deref().unwrap_or("unknown"));
            if let Some(len) = report.content_length {
                println!("  Length:   {len} bytes");
            }
            match (&report.initial_rendition, manifest_type) {
                (Some(initial), _) => {
                    println!("  Playback: {}", style("adaptive").green());
                    println!("  Live:     {}", report.is_live.unwrap_or(false));
                    println!("  Start at: {initial}");
                    println!();
                    println!("{}", Table::new(&report.renditions).with(Style::rounded()));
                }
                (None, Some(_)) => println!("  Playback: {}", style("direct (manifest)").yellow()),
                (None, None) => println!("  Playback: {}", style("direct").cyan()),
            }
        }
    }

    Ok(())
}

// =============================================================================
// play
// =============================================================================

/// Hands the next catalogue entry to the controller when a title ends
struct CatalogueNavigator {
    items: Vec<PlayableItem>,
    current: usize,
    continuous: bool,
    events: EventSender,
    finished: watch::Sender<bool>,
}

impl PlaybackNavigator for CatalogueNavigator {
    fn on_ended(&mut self, media_id: &MediaId) {
        info!(%media_id, "Title finished");
    }

    fn on_next(&mut self) {
        let next = self.current + 1;
        match self.items.get(next) {
            Some(item) if self.continuous => {
                self.current = next;
                if self.events.send(Event::Load(item.clone())).is_err() {
                    self.finished.send_replace(true);
                }
            }
            _ => {
                self.finished.send_replace(true);
            }
        }
    }
}

pub struct PlayOptions<'a> {
    pub catalogue: &'a Path,
    pub id: Option<&'a str>,
    pub duration: f64,
    pub continuous: bool,
    pub store: &'a Path,
    pub format: OutputFormat,
}

/// Play a catalogue headlessly against a simulated media element
pub async fn play(config: PlayerConfig, opts: PlayOptions<'_>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(opts.catalogue)
        .with_context(|| format!("failed to read catalogue {}", opts.catalogue.display()))?;
    let entries: Vec<CatalogueEntry> = serde_json::from_str(&content).context("catalogue is not valid JSON")?;
    let items = entries
        .iter()
        .map(PlayableItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let start = match opts.id {
        Some(id) => items
            .iter()
            .position(|item| item.id.as_str() == id)
            .with_context(|| format!("no catalogue entry with id {id}"))?,
        None if items.is_empty() => bail!("catalogue is empty"),
        None => 0,
    };
    let first = items[start].clone();

    let store: Arc<dyn PlaybackStore> = Arc::new(JsonFileStore::open(opts.store)?);
    let resolver = Arc::new(HttpSourceResolver::new(&config)?);
    let (finished_tx, mut finished) = watch::channel(false);

    let (events_tx, events_rx) = event_channel();
    let sink = HeadlessSink::new(events_tx.clone(), opts.duration, true);
    let navigator = CatalogueNavigator {
        items,
        current: start,
        continuous: opts.continuous,
        events: events_tx.clone(),
        finished: finished_tx,
    };
    let controller =
        Controller::new(config, Box::new(sink), Box::new(NoDisplay), store).with_navigator(Box::new(navigator));
    let (runtime, handle) = PlayerRuntime::new(controller, resolver, (events_tx, events_rx));

    info!(media_id = %first.id, url = %first.source_url, "Starting headless playback");
    handle.load(first)?;

    let format = opts.format;
    let watcher = async {
        let mut snapshots = handle.subscribe();
        let mut view = PlaybackView::new(format)?;
        let outcome = loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    view.render(&snapshot)?;
                    if let PlaybackState::Error(fault) = &snapshot.state {
                        break Err(anyhow::anyhow!("playback failed: {fault}"));
                    }
                }
                _ = finished.wait_for(|done| *done) => break Ok(()),
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted");
                    break Ok(());
                }
            }
        };
        view.finish();
        if let Err(e) = handle.shutdown() {
            debug!(error = %e, "Runtime already stopped");
        }
        outcome
    };

    let (last, outcome) = tokio::join!(runtime.run(), watcher);
    if format != OutputFormat::Json {
        println!(
            "{} {} at {}",
            style("Stopped").bold(),
            styled_state(&last.state),
            format_position(last.position)
        );
    }
    outcome
}

/// Terminal rendering of snapshot updates
struct PlaybackView {
    format: OutputFormat,
    bar: Option<ProgressBar>,
    last_state: Option<PlaybackState>,
    last_media: Option<MediaId>,
}

impl PlaybackView {
    fn new(format: OutputFormat) -> anyhow::Result<Self> {
        let bar = match format {
            OutputFormat::Json => None,
            _ => {
                let bar = ProgressBar::new(0);
                bar.set_style(ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {msg}")?.progress_chars("=> "));
                Some(bar)
            }
        };
        Ok(Self {
            format,
            bar,
            last_state: None,
            last_media: None,
        })
    }

    fn render(&mut self, snapshot: &PlayerSnapshot) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string(snapshot)?);
            return Ok(());
        }
        let Some(bar) = &self.bar else {
            return Ok(());
        };

        if snapshot.media_id != self.last_media {
            if let Some(id) = &snapshot.media_id {
                bar.println(format!("{} {id}", style("▶").bold()));
            }
            self.last_media = snapshot.media_id.clone();
        }
        if self.last_state.as_ref() != Some(&snapshot.state) {
            bar.println(format!("  {}", styled_state(&snapshot.state)));
            self.last_state = Some(snapshot.state.clone());
        }

        let duration = snapshot.duration.unwrap_or(0.0);
        bar.set_length((duration * 1000.0) as u64);
        bar.set_position((snapshot.position * 1000.0) as u64);
        bar.set_prefix(snapshot.state.to_string());
        bar.set_message(format!(
            "{} / {}{}",
            format_position(snapshot.position),
            format_position(duration),
            snapshot.rendition.as_deref().map(|r| format!("  {r}")).unwrap_or_default()
        ));
        Ok(())
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

// =============================================================================
// progress
// =============================================================================

#[derive(Tabled)]
struct ProgressRow {
    #[tabled(rename = "Media")]
    media_id: String,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub fn progress_list(store: &JsonFileStore, format: OutputFormat) -> anyhow::Result<()> {
    let records = store.list_progress()?;
    match format {
        OutputFormat::Json => print_json(&records)?,
        _ if records.is_empty() => println!("No saved progress in {}", store.path().display()),
        OutputFormat::Table => {
            let rows: Vec<ProgressRow> = records
                .iter()
                .map(|r| ProgressRow {
                    media_id: r.media_id.to_string(),
                    position: format_position(r.position),
                    updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        OutputFormat::Text => {
            for r in &records {
                println!("{:<24} {:>9}  {}", r.media_id, format_position(r.position), r.updated_at.to_rfc3339());
            }
        }
    }
    Ok(())
}

pub fn progress_get(store: &JsonFileStore, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let record = store
        .load_progress(&MediaId::from(id))?
        .with_context(|| format!("no saved progress for {id}"))?;
    match format {
        OutputFormat::Json => print_json(&record)?,
        _ => println!("{} resumes at {}", record.media_id, format_position(record.position)),
    }
    Ok(())
}

pub fn progress_clear(store: &JsonFileStore, id: &str) -> anyhow::Result<()> {
    if store.remove_progress(&MediaId::from(id))? {
        println!("{} cleared progress for {id}", style("✓").green());
    } else {
        println!("No saved progress for {id}");
    }
    Ok(())
}

// =============================================================================
// settings
// =============================================================================

pub fn settings_show(store: &JsonFileStore, format: OutputFormat) -> anyhow::Result<()> {
    let settings = store.load_settings()?;
    match format {
        OutputFormat::Json => print_json(&settings)?,
        _ => {
            println!("Volume:        {:.0}%", settings.volume * 100.0);
            println!("Playback rate: {}", settings.playback_rate);
            println!("Autoplay:      {}", settings.autoplay);
        }
    }
    Ok(())
}

pub fn settings_set(
    store: &JsonFileStore,
    volume: Option<f64>,
    rate: Option<f64>,
    autoplay: Option<bool>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut settings = store.load_settings()?;
    if let Some(volume) = volume {
        if !(0.0..=1.0).contains(&volume) {
            bail!("volume must be between 0 and 1, got {volume}");
        }
        settings.volume = volume;
    }
    if let Some(rate) = rate {
        settings.playback_rate = PlaybackRate::try_from(rate).map_err(anyhow::Error::msg)?;
    }
    if let Some(autoplay) = autoplay {
        settings.autoplay = autoplay;
    }
    store.save_settings(&settings)?;
    settings_show(store, format)
}

fn spinner(format: OutputFormat, message: String) -> anyhow::Result<ProgressBar> {
    if format == OutputFormat::Json {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}
