//! Simulated media element for headless playback
//!
//! Keeps a virtual playhead that advances on a tokio interval and reports
//! lifecycle events back into the controller queue, tagged with the attach
//! token it was given.

use cineteca_core::{
    Event, EventSender, MediaSink, SessionToken, SinkEvent, StreamPlan, StreamingSession,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

const TICK: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct Playhead {
    token: SessionToken,
    position: f64,
    paused: bool,
    rate: f64,
    ended: bool,
}

fn lock(playhead: &Mutex<Playhead>) -> MutexGuard<'_, Playhead> {
    playhead.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct HeadlessSink {
    events: EventSender,
    playhead: Arc<Mutex<Playhead>>,
    clock: Option<JoinHandle<()>>,
    duration: f64,
    adaptive: bool,
}

impl HeadlessSink {
    pub fn new(events: EventSender, duration: f64, adaptive: bool) -> Self {
        Self {
            events,
            playhead: Arc::new(Mutex::new(Playhead {
                token: SessionToken::default(),
                position: 0.0,
                paused: true,
                rate: 1.0,
                ended: false,
            })),
            clock: None,
            duration,
            adaptive,
        }
    }

    fn emit(&self, event: SinkEvent) {
        let token = lock(&self.playhead).token;
        let _ = self.events.send(Event::Sink { token, event });
    }

    fn start_clock(&mut self, token: SessionToken) {
        self.stop_clock();
        {
            let mut playhead = lock(&self.playhead);
            playhead.token = token;
            playhead.position = 0.0;
            playhead.paused = true;
            playhead.ended = false;
        }

        let events = self.events.clone();
        let playhead = Arc::clone(&self.playhead);
        let duration = self.duration;
        self.clock = Some(tokio::spawn(async move {
            let send = |event| events.send(Event::Sink { token, event }).is_ok();

            tokio::time::sleep(TICK).await;
            if !send(SinkEvent::LoadedMetadata {
                duration: Some(duration),
            }) || !send(SinkEvent::CanPlay)
            {
                return;
            }

            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                let (position, ended) = {
                    let mut p = lock(&playhead);
                    if p.paused || p.ended {
                        continue;
                    }
                    p.position = (p.position + TICK.as_secs_f64() * p.rate).min(duration);
                    p.ended = p.position >= duration;
                    if p.ended {
                        p.paused = true;
                    }
                    (p.position, p.ended)
                };

                if !send(SinkEvent::TimeUpdate { position }) {
                    return;
                }
                if ended {
                    send(SinkEvent::Ended);
                    return;
                }
            }
        }));
    }

    fn stop_clock(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.abort();
        }
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        self.stop_clock();
    }
}

impl MediaSink for HeadlessSink {
    fn supports_adaptive(&self) -> bool {
        self.adaptive
    }

    fn attach_direct(&mut self, url: &Url, token: SessionToken) -> cineteca_core::Result<()> {
        debug!(%url, %token, "Headless sink attached");
        self.start_clock(token);
        Ok(())
    }

    fn attach_stream(
        &mut self,
        plan: &StreamPlan,
        token: SessionToken,
    ) -> cineteca_core::Result<Box<dyn StreamingSession>> {
        debug!(
            url = %plan.manifest_url,
            rendition = %plan.initial_rendition.label(),
            %token,
            "Headless streaming session opened"
        );
        self.start_clock(token);
        Ok(Box::new(HeadlessStream))
    }

    fn detach(&mut self) {
        self.stop_clock();
        lock(&self.playhead).paused = true;
    }

    fn play(&mut self) {
        let was_paused = {
            let mut p = lock(&self.playhead);
            let was_paused = p.paused && !p.ended;
            p.paused = p.ended;
            was_paused
        };
        if was_paused {
            self.emit(SinkEvent::Playing);
        }
    }

    fn pause(&mut self) {
        let was_playing = {
            let mut p = lock(&self.playhead);
            !std::mem::replace(&mut p.paused, true)
        };
        if was_playing {
            self.emit(SinkEvent::Pause);
        }
    }

    fn seek(&mut self, position: f64) {
        let mut p = lock(&self.playhead);
        p.position = position.clamp(0.0, self.duration);
    }

    fn set_volume(&mut self, volume: f64) {
        debug!(volume, "Volume");
    }

    fn set_muted(&mut self, muted: bool) {
        debug!(muted, "Muted");
    }

    fn set_playback_rate(&mut self, rate: f64) {
        lock(&self.playhead).rate = rate;
    }

    fn current_time(&self) -> f64 {
        lock(&self.playhead).position
    }

    fn is_paused(&self) -> bool {
        lock(&self.playhead).paused
    }
}

/// The headless sink buffers nothing, so recovery is a no-op
struct HeadlessStream;

impl StreamingSession for HeadlessStream {
    fn start_load(&mut self) {
        debug!("Manifest reload requested");
    }

    fn recover_media_error(&mut self) {
        debug!("Media recovery requested");
    }

    fn release(&mut self) {
        debug!("Streaming session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cineteca_core::event_channel;

    #[tokio::test(start_paused = true)]
    async fn test_reports_metadata_then_plays_to_end() {
        let (tx, mut rx) = event_channel();
        let mut sink = HeadlessSink::new(tx, 1.0, false);
        let token = SessionToken::default().next();
        let url = Url::parse("https://cdn.example.com/clip.mp4").unwrap();

        sink.attach_direct(&url, token).unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            Event::Sink { token: t, event: SinkEvent::LoadedMetadata { duration: Some(d) } } if t == token && d == 1.0
        ));

        sink.play();
        let mut saw_ended = false;
        while let Some(event) = rx.recv().await {
            if let Event::Sink { event: SinkEvent::Ended, .. } = event {
                saw_ended = true;
                break;
            }
        }
        assert!(saw_ended);
        assert_eq!(sink.current_time(), 1.0);
        assert!(sink.is_paused());
    }
}
