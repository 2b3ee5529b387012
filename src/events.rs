//! Worker-to-foreground event channel.
//!
//! The sync worker emits ordered [`SyncEvent`]s; the foreground thread
//! renders them and answers prompts. Progress only ever moves forward.

use colored::Colorize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::prompt::{EditRequest, PromptRequest, Prompter};
use crate::sync::SyncOutcome;

/// Something the worker wants the foreground to show or answer.
#[derive(Debug)]
pub enum SyncEvent {
    Log {
        message: String,
        progress: Option<u8>,
    },
    Prompt(PromptRequest),
    Edit(EditRequest),
    Finished(SyncOutcome),
}

/// Cloneable, thread-safe handle for emitting events.
///
/// Every log line is mirrored to the `log` facade. A detached sink only logs.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<SyncEvent>>,
    progress: Arc<AtomicU8>,
}

impl EventSink {
    pub fn channel() -> (Self, Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                tx: Some(tx),
                progress: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// A sink with no listener.
    pub fn detached() -> Self {
        Self {
            tx: None,
            progress: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Deliver an event. False when nobody is listening.
    pub fn send(&self, event: SyncEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.send(SyncEvent::Log {
            message,
            progress: None,
        });
    }

    /// Log with a progress percentage. Values below the current progress
    /// are raised to it; values above 100 are capped.
    pub fn progress(&self, message: impl Into<String>, percent: u8) {
        let message = message.into();
        let percent = percent.min(100);
        let previous = self.progress.fetch_max(percent, Ordering::SeqCst);
        let current = previous.max(percent);
        log::info!("[{:>3}%] {}", current, message);
        self.send(SyncEvent::Log {
            message,
            progress: Some(current),
        });
    }

    pub fn current_progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn finish(&self, outcome: SyncOutcome) {
        self.send(SyncEvent::Finished(outcome));
    }
}

/// Render events on the foreground thread until the worker finishes.
///
/// Prompts are answered with `prompter`. A worker that disappears without
/// reporting counts as a failure.
pub fn render_events(rx: Receiver<SyncEvent>, prompter: &mut dyn Prompter) -> SyncOutcome {
    for event in rx {
        match event {
            SyncEvent::Log { message, progress } => match progress {
                Some(p) => println!("{} {}", format!("[{:>3}%]", p).dimmed(), message),
                None => println!("      {}", message),
            },
            SyncEvent::Prompt(request) => {
                let choice = prompter.choose(&request.title, &request.message, &request.options);
                request.respond(choice);
            }
            SyncEvent::Edit(request) => {
                let content = prompter.edit_merge(&request.request);
                request.respond(content);
            }
            SyncEvent::Finished(outcome) => {
                match &outcome {
                    SyncOutcome::Completed => println!("{} {}", "✓".green(), "Sync complete".green()),
                    SyncOutcome::Cancelled => {
                        println!("{} {}", "!".yellow(), "Sync cancelled".yellow())
                    }
                    SyncOutcome::Failed(msg) => println!("{} {}", "✗".red(), msg.red()),
                }
                return outcome;
            }
        }
    }
    SyncOutcome::Failed("Sync worker stopped without reporting a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ChannelPrompter, ScriptedPrompter};

    #[test]
    fn test_progress_is_monotonic() {
        let (sink, rx) = EventSink::channel();
        sink.progress("start", 10);
        sink.progress("later", 50);
        sink.progress("stale", 30);
        sink.progress("overflow", 250);

        let seen: Vec<Option<u8>> = rx
            .try_iter()
            .map(|event| match event {
                SyncEvent::Log { progress, .. } => progress,
                _ => None,
            })
            .collect();
        assert_eq!(seen, vec![Some(10), Some(50), Some(50), Some(100)]);
        assert_eq!(sink.current_progress(), 100);
    }

    #[test]
    fn test_events_arrive_in_order_across_clones() {
        let (sink, rx) = EventSink::channel();
        let clone = sink.clone();
        sink.log("one");
        clone.log("two");
        sink.log("three");

        let messages: Vec<String> = rx
            .try_iter()
            .filter_map(|event| match event {
                SyncEvent::Log { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_detached_sink_does_not_fail() {
        let sink = EventSink::detached();
        sink.log("nobody listening");
        assert!(!sink.send(SyncEvent::Finished(SyncOutcome::Completed)));
    }

    #[test]
    fn test_render_answers_prompts_and_returns_outcome() {
        let (sink, rx) = EventSink::channel();
        let worker = std::thread::spawn(move || {
            let mut prompter = ChannelPrompter::new(sink.clone());
            let choice = prompter.choose("Strategy", "", &["A".to_string(), "B".to_string()]);
            sink.finish(SyncOutcome::Completed);
            choice
        });

        let mut scripted = ScriptedPrompter::new().choose_index(1);
        let outcome = render_events(rx, &mut scripted);
        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(worker.join().unwrap(), Some(1));
    }

    #[test]
    fn test_render_reports_vanished_worker() {
        let (sink, rx) = EventSink::channel();
        drop(sink);
        let mut scripted = ScriptedPrompter::new();
        assert!(matches!(
            render_events(rx, &mut scripted),
            SyncOutcome::Failed(_)
        ));
    }
}
