//! User decisions requested by the resolvers.
//!
//! Resolution code never talks to a terminal directly. It asks a
//! [`Prompter`], which may be the terminal, the foreground thread (through
//! the event channel), a script (tests) or nobody at all.

use colored::Colorize;
use inquire::{Editor, Select};
use std::collections::VecDeque;
use std::sync::mpsc;

use crate::events::{EventSink, SyncEvent};

/// Content offered to the user for a manual merge of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub file_path: String,
    pub ours: String,
    pub theirs: String,
    pub base: Option<String>,
}

impl MergeRequest {
    /// Starting text for an editor: both sides delimited with git-style markers.
    pub fn template(&self) -> String {
        let mut text = String::new();
        text.push_str("<<<<<<< LOCAL\n");
        text.push_str(&self.ours);
        if !self.ours.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("=======\n");
        text.push_str(&self.theirs);
        if !self.theirs.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(">>>>>>> REMOTE\n");
        text
    }
}

/// Source of user decisions. `None` always means the user cancelled.
pub trait Prompter: Send {
    /// Pick one of `options`, returning its index.
    fn choose(&mut self, title: &str, message: &str, options: &[String]) -> Option<usize>;

    /// Produce the final content of a conflicted file.
    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String>;
}

/// Check if we're running in an interactive terminal
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn choose(&mut self, title: &str, message: &str, options: &[String]) -> Option<usize> {
        println!("\n{}", title.yellow().bold());
        if !message.is_empty() {
            println!("{}", message);
        }

        let labelled: Vec<String> = options.to_vec();
        match Select::new("Choose an option:", labelled)
            .with_help_message("Use arrow keys to navigate, Enter to select, Esc to cancel")
            .raw_prompt()
        {
            Ok(choice) => Some(choice.index),
            Err(e) => {
                log::debug!("Prompt ended without a choice: {}", e);
                None
            }
        }
    }

    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String> {
        let prompt = format!(
            "Edit {} (remove every conflict marker, then save and close)",
            request.file_path
        );
        let template = request.template();
        match Editor::new(&prompt)
            .with_predefined_text(&template)
            .with_file_extension(".md")
            .prompt()
        {
            Ok(content) => Some(content),
            Err(e) => {
                log::debug!("Manual merge ended without content: {}", e);
                None
            }
        }
    }
}

/// Cancels every decision. Used when nobody can answer.
#[derive(Debug, Default)]
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn choose(&mut self, title: &str, _message: &str, _options: &[String]) -> Option<usize> {
        log::warn!("'{}' needs a decision but no user is available", title);
        None
    }

    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String> {
        log::warn!(
            "{} needs a manual merge but no user is available",
            request.file_path
        );
        None
    }
}

/// Forwards decisions to the foreground thread and blocks until it answers.
pub struct ChannelPrompter {
    events: EventSink,
}

impl ChannelPrompter {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }
}

impl Prompter for ChannelPrompter {
    fn choose(&mut self, title: &str, message: &str, options: &[String]) -> Option<usize> {
        let (reply, answer) = mpsc::channel();
        let request = PromptRequest {
            title: title.to_string(),
            message: message.to_string(),
            options: options.to_vec(),
            reply,
        };
        if !self.events.send(SyncEvent::Prompt(request)) {
            return None;
        }
        // A dropped reply sender reads as cancellation
        answer.recv().ok().flatten()
    }

    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String> {
        let (reply, answer) = mpsc::channel();
        let request = EditRequest {
            request: request.clone(),
            reply,
        };
        if !self.events.send(SyncEvent::Edit(request)) {
            return None;
        }
        answer.recv().ok().flatten()
    }
}

/// A choice request travelling from the worker to the foreground.
#[derive(Debug)]
pub struct PromptRequest {
    pub title: String,
    pub message: String,
    pub options: Vec<String>,
    reply: mpsc::Sender<Option<usize>>,
}

impl PromptRequest {
    pub fn respond(self, choice: Option<usize>) {
        let choice = choice.filter(|idx| *idx < self.options.len());
        let _ = self.reply.send(choice);
    }
}

/// A manual-merge request travelling from the worker to the foreground.
#[derive(Debug)]
pub struct EditRequest {
    pub request: MergeRequest,
    reply: mpsc::Sender<Option<String>>,
}

impl EditRequest {
    pub fn respond(self, content: Option<String>) {
        let _ = self.reply.send(content);
    }
}

/// How a scripted prompt is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedChoice {
    Index(usize),
    /// First option whose label contains the text
    Containing(String),
    Cancel,
}

/// Answers prompts from a prepared script, in order. An exhausted script
/// cancels. Every prompt title is recorded.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    choices: VecDeque<ScriptedChoice>,
    edits: VecDeque<Option<String>>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose_containing(mut self, label: &str) -> Self {
        self.choices
            .push_back(ScriptedChoice::Containing(label.to_string()));
        self
    }

    pub fn choose_index(mut self, index: usize) -> Self {
        self.choices.push_back(ScriptedChoice::Index(index));
        self
    }

    pub fn cancel(mut self) -> Self {
        self.choices.push_back(ScriptedChoice::Cancel);
        self
    }

    pub fn edit_with(mut self, content: &str) -> Self {
        self.edits.push_back(Some(content.to_string()));
        self
    }

    pub fn cancel_edit(mut self) -> Self {
        self.edits.push_back(None);
        self
    }

    /// Titles of every prompt shown so far.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn choose(&mut self, title: &str, _message: &str, options: &[String]) -> Option<usize> {
        self.asked.push(title.to_string());
        match self.choices.pop_front()? {
            ScriptedChoice::Index(idx) => (idx < options.len()).then_some(idx),
            ScriptedChoice::Containing(label) => options.iter().position(|o| o.contains(&label)),
            ScriptedChoice::Cancel => None,
        }
    }

    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String> {
        self.asked.push(format!("edit {}", request.file_path));
        self.edits.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec![
            "Smart Merge".to_string(),
            "Keep Local Only".to_string(),
            "Keep Remote Only".to_string(),
        ]
    }

    #[test]
    fn test_scripted_prompter_answers_in_order() {
        let mut prompter = ScriptedPrompter::new()
            .choose_containing("Remote")
            .choose_index(0)
            .cancel();
        assert_eq!(prompter.choose("a", "", &options()), Some(2));
        assert_eq!(prompter.choose("b", "", &options()), Some(0));
        assert_eq!(prompter.choose("c", "", &options()), None);
        // Exhausted
        assert_eq!(prompter.choose("d", "", &options()), None);
        assert_eq!(prompter.asked(), &["a", "b", "c", "d"]);
    }

    #[test]
    fn test_scripted_out_of_range_index_cancels() {
        let mut prompter = ScriptedPrompter::new().choose_index(7);
        assert_eq!(prompter.choose("a", "", &options()), None);
    }

    #[test]
    fn test_channel_prompter_round_trip() {
        let (sink, rx) = EventSink::channel();
        let worker = std::thread::spawn(move || {
            let mut prompter = ChannelPrompter::new(sink);
            prompter.choose("Pick", "", &options())
        });

        match rx.recv().unwrap() {
            SyncEvent::Prompt(request) => {
                assert_eq!(request.title, "Pick");
                request.respond(Some(1));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(worker.join().unwrap(), Some(1));
    }

    #[test]
    fn test_channel_prompter_cancels_when_foreground_gone() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        let mut prompter = ChannelPrompter::new(sink);
        assert_eq!(prompter.choose("Pick", "", &options()), None);
    }

    #[test]
    fn test_template_contains_both_sides() {
        let request = MergeRequest {
            file_path: "Note.md".to_string(),
            ours: "local".to_string(),
            theirs: "remote\n".to_string(),
            base: None,
        };
        let text = request.template();
        assert!(text.starts_with("<<<<<<< LOCAL\nlocal\n=======\nremote\n>>>>>>> REMOTE"));
    }
}
